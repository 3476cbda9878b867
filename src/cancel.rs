//! Cooperative cancellation for a single call.
//!
//! A [`CancelHandle`] is handed to the caller; the matching [`CancelSignal`]
//! travels with every attempt into the transport. Cancelling never settles the
//! call directly: the transport (or the retry loop, between attempts) observes
//! the signal and fails the attempt with [`Error::Cancelled`](crate::Error::Cancelled).

use tokio_util::sync::CancellationToken;

/// Caller-side handle that aborts a call's in-flight and future attempts.
///
/// Cancelling is idempotent: calling [`cancel`](CancelHandle::cancel) more
/// than once has the same effect as calling it once.
///
/// # Examples
///
/// ```
/// use resilient_fetch::CancelHandle;
///
/// let handle = CancelHandle::new();
/// let signal = handle.signal();
///
/// handle.cancel();
/// handle.cancel();
///
/// assert!(signal.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Creates a fresh, uncancelled handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns the read-only signal consumed by transports.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            token: self.token.clone(),
        }
    }

    /// Requests cancellation. Does not wait for in-flight work to stop.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!("Cancellation requested");
        }
        self.token.cancel();
    }

    /// Returns `true` once [`cancel`](CancelHandle::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns a handle that is cancelled whenever this one is, but can also
    /// be cancelled on its own without affecting this handle.
    pub(crate) fn child(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.child_token(),
        }
    }
}

/// Read-only view of a call's cancellation state.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Returns `true` if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once cancellation is requested.
    ///
    /// Transports race their request against this future and fail with
    /// [`Error::Cancelled`](crate::Error::Cancelled) when it wins.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
