//! Resilience options for a call: timeout, attempts, callbacks and retry policy.

use crate::{
    retry::{RetryPredicate, RetryUnlessCancelled},
    transport::ResponseHead,
    Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default time the whole call may take before settling as a timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Shortest timeout a call accepts; zero is raised to this.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Default number of attempts made against the transport.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Error type returned by an `on_response` callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type CallbackFuture = Pin<Box<dyn Future<Output = std::result::Result<(), CallbackError>> + Send>>;

pub(crate) type ResponseCallback = Arc<dyn Fn(ResponseHead) -> CallbackFuture + Send + Sync>;

pub(crate) type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Per-call resilience options.
///
/// Build with [`FetchOptions::builder`]; [`FetchOptions::default`] gives a
/// 5 second timeout, 3 attempts, no callbacks and the
/// [`RetryUnlessCancelled`] predicate.
///
/// # Examples
///
/// ```
/// use resilient_fetch::{CallbackError, FetchOptions};
/// use std::time::Duration;
///
/// let options = FetchOptions::builder()
///     .timeout(Duration::from_secs(2))
///     .retry_attempts(5)
///     .on_response(|head| async move {
///         println!("got {}", head.status);
///         Ok::<(), CallbackError>(())
///     })
///     .on_error(|error| eprintln!("call failed: {}", error))
///     .build();
///
/// assert_eq!(options.retry_attempts(), 5);
/// ```
#[derive(Clone)]
pub struct FetchOptions {
    pub(crate) timeout: Duration,
    pub(crate) retry_attempts: usize,
    pub(crate) on_response: Option<ResponseCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) retry_predicate: Arc<dyn RetryPredicate>,
}

impl FetchOptions {
    /// Creates a new `FetchOptionsBuilder` starting from the defaults.
    pub fn builder() -> FetchOptionsBuilder {
        FetchOptionsBuilder::new()
    }

    /// The time the call may take before settling as a timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The maximum number of transport attempts.
    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            on_response: None,
            on_error: None,
            retry_predicate: Arc::new(RetryUnlessCancelled),
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`FetchOptions`].
pub struct FetchOptionsBuilder {
    options: FetchOptions,
}

impl FetchOptionsBuilder {
    /// Creates a builder holding the default options.
    pub fn new() -> Self {
        Self {
            options: FetchOptions::default(),
        }
    }

    /// Sets how long the call may take, across all attempts, before it
    /// settles as [`Error::Timeout`].
    ///
    /// The timeout must be positive: `Duration::ZERO` is raised to
    /// [`MIN_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout.max(MIN_TIMEOUT);
        self
    }

    /// Sets the maximum number of transport attempts.
    ///
    /// Zero is allowed and makes the call settle with [`Error::NoAttempts`]
    /// without touching the network.
    pub fn retry_attempts(mut self, attempts: usize) -> Self {
        self.options.retry_attempts = attempts;
        self
    }

    /// Registers a callback run on every received response, before it is
    /// classified as success or failure.
    ///
    /// The retry loop awaits the returned future. An `Err` fails the attempt
    /// with [`Error::Callback`].
    pub fn on_response<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ResponseHead) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), CallbackError>> + Send + 'static,
    {
        self.options.on_response = Some(Arc::new(move |head| -> CallbackFuture {
            Box::pin(callback(head))
        }));
        self
    }

    /// Registers a callback run once with the final error when the retry loop
    /// gives up.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.options.on_error = Some(Arc::new(callback));
        self
    }

    /// Sets the predicate deciding whether a failed attempt may be retried.
    ///
    /// By default every failure except cancellation is retried.
    pub fn retry_predicate(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.options.retry_predicate = Arc::new(predicate);
        self
    }

    /// Builds the configured `FetchOptions`.
    pub fn build(self) -> FetchOptions {
        self.options
    }
}

impl Default for FetchOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of the numeric resilience options.
///
/// Missing fields fall back to the defaults, so `{}` is a valid config.
///
/// # Examples
///
/// ```
/// use resilient_fetch::ResilienceConfig;
///
/// let config: ResilienceConfig = serde_json::from_str(r#"{ "timeout_ms": 250 }"#).unwrap();
/// let options = config.into_options();
///
/// assert_eq!(options.timeout().as_millis(), 250);
/// assert_eq!(options.retry_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Timeout for the whole call in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of transport attempts.
    pub retry_attempts: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl ResilienceConfig {
    /// Converts this config into a builder, so callbacks can still be added.
    ///
    /// A `timeout_ms` of zero is raised to [`MIN_TIMEOUT`], the same as
    /// [`FetchOptionsBuilder::timeout`] does.
    pub fn into_builder(self) -> FetchOptionsBuilder {
        FetchOptions::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .retry_attempts(self.retry_attempts)
    }

    /// Converts this config into `FetchOptions` without callbacks.
    pub fn into_options(self) -> FetchOptions {
        self.into_builder().build()
    }
}
