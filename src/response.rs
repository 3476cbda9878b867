//! Settled call results.
//!
//! A successful call yields a [`Response`], which wraps the parsed body along
//! with the headers, status, latency and number of attempts. [`CallOutcome`]
//! is the flattened, serializable form of a settled call.

use crate::{error::ErrorPayload, Error};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// A successful call result.
///
/// # Type Parameters
///
/// * `T` - The type of the deserialized response data
///
/// # Examples
///
/// ```no_run
/// use resilient_fetch::{resilient_fetch, FetchOptions, RequestMetadata};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Item {
///     id: u64,
/// }
///
/// # async fn example() -> Result<(), resilient_fetch::Error> {
/// let (pending, _cancel) = resilient_fetch::<Item>(
///     "https://api.example.com/data",
///     RequestMetadata::default(),
///     FetchOptions::default(),
/// )?;
///
/// let response = pending.await?;
/// println!("Item: {}", response.data.id);
/// println!("Took {:?} over {} attempt(s)", response.latency, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body as a string.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the start of the first attempt until this response was parsed.
    pub latency: Duration,

    /// The number of attempts made, `1` if the first attempt succeeded.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type, preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use resilient_fetch::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// Tag of a settled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// The call produced parsed data.
    Success,
    /// The call failed.
    Error,
}

/// Serializable shape of a settled call.
///
/// Exactly one of `data` and `error` is present, matching `status`.
/// `loading` is always `false` because only settled calls are represented.
///
/// # Examples
///
/// ```
/// use resilient_fetch::{CallOutcome, CallStatus, Error};
///
/// let outcome = CallOutcome::<()>::from_result(Err(Error::Timeout));
/// assert_eq!(outcome.status, CallStatus::Error);
/// assert_eq!(outcome.error.unwrap().status, 408);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CallOutcome<T> {
    /// Always `false`.
    pub loading: bool,
    /// `"success"` or `"error"`.
    pub status: CallStatus,
    /// Parsed data, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Response headers, present on success.
    ///
    /// Repeated headers are joined with `", "`. Values that are not valid
    /// UTF-8 are left out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Error payload, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T> CallOutcome<T> {
    /// Flattens a settled call result.
    pub fn from_result(result: Result<Response<T>, Error>) -> Self {
        match result {
            Ok(response) => {
                let headers = flatten_headers(&response.headers);
                Self {
                    loading: false,
                    status: CallStatus::Success,
                    data: Some(response.data),
                    headers: Some(headers),
                    error: None,
                }
            }
            Err(error) => Self {
                loading: false,
                status: CallStatus::Error,
                data: None,
                headers: None,
                error: Some(error.payload()),
            },
        }
    }
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            if values.is_empty() {
                None
            } else {
                Some((name.to_string(), values.join(", ")))
            }
        })
        .collect()
}

impl<T> From<Result<Response<T>, Error>> for CallOutcome<T> {
    fn from(result: Result<Response<T>, Error>) -> Self {
        Self::from_result(result)
    }
}
