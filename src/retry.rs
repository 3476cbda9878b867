//! The retry loop and the predicates deciding whether a failure is retried.
//!
//! Attempts run strictly one after another and the next attempt starts
//! immediately after a failure: there is no backoff delay. The overall time
//! budget is enforced by the timeout race in [`crate::fetch`], not here.

use crate::{
    cancel::CancelSignal,
    metadata::RequestMetadata,
    options::FetchOptions,
    transport::Transport,
    Error, Response, Result,
};
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use url::Url;

/// Decides whether a failed attempt may be followed by another one.
///
/// The loop consults the predicate only while attempts remain; once
/// `retry_attempts` is reached the call fails regardless.
///
/// # Examples
///
/// ```
/// use resilient_fetch::{Error, RetryPredicate};
///
/// struct RetryOnServerErrors;
///
/// impl RetryPredicate for RetryOnServerErrors {
///     fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
///         matches!(
///             error,
///             Error::HttpError { status, .. } if status.is_server_error()
///         )
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the loop should make another attempt after `error`.
    ///
    /// `attempt` is the 1-indexed number of the attempt that just failed.
    fn should_retry(&self, error: &Error, attempt: usize) -> bool;
}

/// Retries every failure except cancellation.
///
/// A cancelled signal fails every later attempt as well, so the loop gives up
/// right away and reports [`Error::Cancelled`]. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryUnlessCancelled;

impl RetryPredicate for RetryUnlessCancelled {
    fn should_retry(&self, error: &Error, _attempt: usize) -> bool {
        !error.is_cancellation()
    }
}

/// Retries every failure, cancellation included, until attempts run out.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAlways;

impl RetryPredicate for RetryAlways {
    fn should_retry(&self, _error: &Error, _attempt: usize) -> bool {
        true
    }
}

/// Runs up to `options.retry_attempts` attempts and settles with the first
/// success or the last failure. `on_error` fires once on final failure.
pub(crate) async fn run_attempts<T>(
    transport: &dyn Transport,
    url: &Url,
    request: &RequestMetadata,
    options: &FetchOptions,
    signal: &CancelSignal,
) -> Result<Response<T>>
where
    T: DeserializeOwned,
{
    if options.retry_attempts == 0 {
        tracing::error!(url = %url, "retry_attempts is 0, no request was made");
        return Err(give_up(options, Error::NoAttempts));
    }

    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match attempt_once(transport, url, request, options, signal, attempt, start_time).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    method = %request.method,
                    url = %url,
                    "Attempt failed"
                );

                if attempt >= options.retry_attempts {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        url = %url,
                        "Retry attempts exhausted"
                    );
                    return Err(give_up(options, e));
                }

                if !options.retry_predicate.should_retry(&e, attempt) {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        url = %url,
                        "Failure is not retryable"
                    );
                    return Err(give_up(options, e));
                }

                tracing::debug!(attempt = attempt, "Retrying request immediately");
            }
        }
    }
}

fn give_up(options: &FetchOptions, error: Error) -> Error {
    if let Some(on_error) = &options.on_error {
        on_error(&error);
    }
    error
}

/// Executes a single attempt: send, `on_response`, classify, parse.
async fn attempt_once<T>(
    transport: &dyn Transport,
    url: &Url,
    request: &RequestMetadata,
    options: &FetchOptions,
    signal: &CancelSignal,
    attempt: usize,
    start_time: Instant,
) -> Result<Response<T>>
where
    T: DeserializeOwned,
{
    if signal.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tracing::debug!(
        method = %request.method,
        url = %url,
        attempt = attempt,
        "Executing HTTP request"
    );

    let response = transport.send(url, request, signal).await?;

    if let Some(on_response) = &options.on_response {
        on_response(response.head())
            .await
            .map_err(|e| Error::Callback(e.to_string()))?;
    }

    let latency = start_time.elapsed();
    tracing::info!(
        status = response.status.as_u16(),
        latency_ms = latency.as_millis(),
        attempt = attempt,
        "Received HTTP response"
    );

    if !response.is_success() {
        if response.status.is_client_error() {
            tracing::warn!(status = response.status.as_u16(), "Client error (4xx)");
        } else if response.status.is_server_error() {
            tracing::warn!(status = response.status.as_u16(), "Server error (5xx)");
        }

        return Err(Error::HttpError {
            status: response.status,
            status_text: response.status_text,
            raw_response: response.body,
            headers: response.headers,
        });
    }

    match serde_json::from_str::<T>(&response.body) {
        Ok(data) => Ok(Response::new(
            data,
            response.body,
            response.status,
            response.headers,
            latency,
            attempt,
        )),
        Err(e) => {
            tracing::error!(
                error = %e,
                raw_response = %response.body,
                "Failed to deserialize response"
            );

            Err(Error::DeserializationFailed {
                raw_response: response.body,
                serde_error: e.to_string(),
                status: response.status,
            })
        }
    }
}
