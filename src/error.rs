//! Error types for resilient calls.
//!
//! Every failure a call can settle with is one [`Error`] variant. Regardless of
//! variant, an error can always be flattened into the `{ status, message }`
//! shape via [`Error::status`], [`Error::message`] and [`Error::payload`].

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// Status reported for failures that never produced an HTTP status.
pub const NO_STATUS: u16 = 0;

/// Status reported when the timeout clock wins the race.
pub const TIMEOUT_STATUS: u16 = 408;

/// Status reported for cancelled attempts (nginx's "client closed request").
pub const CANCELLED_STATUS: u16 = 499;

/// The error type for resilient calls.
///
/// # Examples
///
/// ```no_run
/// use resilient_fetch::{resilient_fetch, Error, FetchOptions, RequestMetadata};
///
/// # async fn example() -> Result<(), Error> {
/// let (pending, _cancel) = resilient_fetch::<serde_json::Value>(
///     "https://api.example.com/data",
///     RequestMetadata::default(),
///     FetchOptions::default(),
/// )?;
///
/// match pending.await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Timeout) => eprintln!("Gave up waiting"),
///     Err(Error::HttpError { status, status_text, .. }) => {
///         eprintln!("HTTP error {}: {}", status, status_text);
///     }
///     Err(e) => eprintln!("Failed with {}: {}", e.status(), e.message()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection refused, DNS failure, etc.).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The call did not settle before the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The call's cancellation handle was triggered.
    ///
    /// Transports return this when the signal fires mid-request, and the
    /// retry loop returns it for attempts that would start after cancellation.
    #[error("Request cancelled")]
    Cancelled,

    /// The server returned a non-2xx HTTP status code.
    #[error("HTTP error {status}: {status_text}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The reason phrase reported with the status
        status_text: String,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// A 2xx response body could not be parsed into the expected type.
    ///
    /// The raw body is kept so the payload can be inspected when debugging.
    #[error("Failed to parse response body (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The `on_response` callback reported a failure.
    #[error("Response callback failed: {0}")]
    Callback(String),

    /// `retry_attempts` was zero, so the transport was never invoked.
    #[error("No attempts were made: retry_attempts is 0")]
    NoAttempts,

    /// The background task running the call stopped without settling,
    /// typically because a callback panicked.
    #[error("Call task failed: {0}")]
    TaskFailed(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the numeric status of the `{ status, message }` shape.
    ///
    /// HTTP errors report the response status, timeouts `408` and
    /// cancellations `499`. Failures without any HTTP status report `0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_fetch::Error;
    ///
    /// assert_eq!(Error::Timeout.status(), 408);
    /// assert_eq!(Error::Cancelled.status(), 499);
    /// assert_eq!(Error::NoAttempts.status(), 0);
    /// ```
    pub fn status(&self) -> u16 {
        match self {
            Error::Timeout => TIMEOUT_STATUS,
            Error::Cancelled => CANCELLED_STATUS,
            Error::HttpError { status, .. } => status.as_u16(),
            Error::Network(e) => e.status().map(|s| s.as_u16()).unwrap_or(NO_STATUS),
            Error::DeserializationFailed { .. }
            | Error::Callback(_)
            | Error::NoAttempts
            | Error::TaskFailed(_)
            | Error::ConfigurationError(_)
            | Error::InvalidUrl(_) => NO_STATUS,
        }
    }

    /// Returns the human readable message of the `{ status, message }` shape.
    ///
    /// For HTTP errors this is the response's status text; for every other
    /// variant it is the error's display text.
    pub fn message(&self) -> String {
        match self {
            Error::HttpError { status_text, .. } => status_text.clone(),
            other => other.to_string(),
        }
    }

    /// Flattens this error into its serializable `{ status, message }` payload.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            status: self.status(),
            message: self.message(),
        }
    }

    /// Returns `true` if this error was caused by cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns `true` if this error was caused by the timeout clock.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// The `{ status, message }` shape of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// HTTP-like status code, `0` when none applies.
    pub status: u16,
    /// Human readable description.
    pub message: String,
}

/// A specialized `Result` type for resilient calls.
pub type Result<T> = std::result::Result<T, Error>;
