//! The call orchestrator: races the retry loop against the timeout clock.
//!
//! [`Fetcher::fetch`] and [`resilient_fetch`] return right away with a
//! [`PendingCall`] and a [`CancelHandle`]. The call itself runs on a spawned
//! tokio task, so it makes progress whether or not the caller is polling yet.

use crate::{
    cancel::CancelHandle,
    metadata::RequestMetadata,
    options::FetchOptions,
    retry,
    transport::{ReqwestTransport, Transport},
    Error, Response, Result,
};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use url::Url;

/// Entry point for resilient calls over a shared [`Transport`].
///
/// # Examples
///
/// ```no_run
/// use resilient_fetch::{Fetcher, FetchOptions, RequestMetadata};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), resilient_fetch::Error> {
/// let fetcher = Fetcher::reqwest()?;
///
/// let options = FetchOptions::builder()
///     .timeout(Duration::from_secs(2))
///     .retry_attempts(3)
///     .build();
///
/// let (pending, cancel) = fetcher.fetch::<serde_json::Value>(
///     "https://api.example.com/data",
///     RequestMetadata::default(),
///     options,
/// )?;
///
/// // Hand `cancel` to whoever may need to abort the call.
/// let _ = cancel;
///
/// let response = pending.await?;
/// println!("{:?}", response.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    /// Creates a fetcher over the given transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Creates a fetcher over an already shared transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Creates a fetcher backed by [`ReqwestTransport`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn reqwest() -> Result<Self> {
        Ok(Self::new(ReqwestTransport::new()?))
    }

    /// Starts a resilient call and returns its pending result and cancel handle.
    ///
    /// The call runs up to `options.retry_attempts` sequential attempts,
    /// raced against `options.timeout`. Whichever settles first is the result:
    /// a timeout settles as [`Error::Timeout`] and drops the in-flight attempt.
    ///
    /// Cancelling through the returned handle does not settle the call by
    /// itself. The in-flight or next attempt fails with [`Error::Cancelled`]
    /// and that failure goes through the normal retry policy.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error only if `url` is invalid. Every failure after that
    /// settles the returned [`PendingCall`].
    pub fn fetch<T>(
        &self,
        url: impl AsRef<str>,
        request: RequestMetadata,
        options: FetchOptions,
    ) -> Result<(PendingCall<T>, CancelHandle)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let url = Url::parse(url.as_ref())?;
        let cancel = CancelHandle::new();
        let call_handle = cancel.child();
        let transport = self.transport.clone();

        let task = tokio::spawn(async move {
            let signal = call_handle.signal();
            let timeout = options.timeout;

            tokio::select! {
                result = retry::run_attempts::<T>(
                    transport.as_ref(),
                    &url,
                    &request,
                    &options,
                    &signal,
                ) => result,
                _ = tokio::time::sleep(timeout) => {
                    tracing::warn!(
                        url = %url,
                        timeout_ms = timeout.as_millis(),
                        "Request timed out"
                    );
                    call_handle.cancel();
                    Err(Error::Timeout)
                }
            }
        });

        Ok((PendingCall { task }, cancel))
    }
}

impl Default for Fetcher {
    /// A fetcher backed by a default [`ReqwestTransport`].
    fn default() -> Self {
        Self::new(ReqwestTransport::default())
    }
}

/// Starts a resilient call with a fresh [`ReqwestTransport`].
///
/// See [`Fetcher::fetch`] for the semantics.
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
/// let (pending, cancel) = resilient_fetch::<Item>(
///     "https://api.example.com/data",
///     RequestMetadata::default(),
///     FetchOptions::default(),
/// )?;
///
/// tokio::spawn(async move {
///     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
///     cancel.cancel();
/// });
///
/// match pending.await {
///     Ok(item) => println!("Got item {}", item.data.id),
///     Err(e) => eprintln!("Failed with {}: {}", e.status(), e.message()),
/// }
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if `url` is invalid or the HTTP client cannot be built.
pub fn resilient_fetch<T>(
    url: impl AsRef<str>,
    request: RequestMetadata,
    options: FetchOptions,
) -> Result<(PendingCall<T>, CancelHandle)>
where
    T: DeserializeOwned + Send + 'static,
{
    Fetcher::reqwest()?.fetch(url, request, options)
}

/// The deferred result of a resilient call.
///
/// Resolves to the first of: the retry loop's outcome, or
/// [`Error::Timeout`]. Dropping it aborts the call.
#[must_use = "dropping a PendingCall aborts the call"]
pub struct PendingCall<T> {
    task: JoinHandle<Result<Response<T>>>,
}

impl<T> PendingCall<T> {
    /// Returns `true` once the call has settled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Future for PendingCall<T> {
    type Output = Result<Response<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => {
                tracing::error!(error = %e, "Call task failed");
                Poll::Ready(Err(Error::TaskFailed(e.to_string())))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for PendingCall<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
