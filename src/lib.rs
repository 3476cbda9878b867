//! # resilient-fetch - one HTTP call, made resilient
//!
//! `resilient-fetch` wraps a single HTTP call with a timeout, bounded retries,
//! response/error callbacks and cooperative cancellation. Starting a call
//! returns immediately with two values: a [`PendingCall`] future that settles
//! with the result, and a [`CancelHandle`] that aborts in-flight attempts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use resilient_fetch::{resilient_fetch, CallbackError, FetchOptions, RequestMetadata};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Item {
//!     id: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), resilient_fetch::Error> {
//!     let options = FetchOptions::builder()
//!         .timeout(Duration::from_secs(5))
//!         .retry_attempts(3)
//!         .on_response(|head| async move {
//!             println!("attempt answered with {}", head.status);
//!             Ok::<(), CallbackError>(())
//!         })
//!         .on_error(|error| eprintln!("giving up: {}", error))
//!         .build();
//!
//!     let (pending, _cancel) = resilient_fetch::<Item>(
//!         "https://api.example.com/data",
//!         RequestMetadata::default(),
//!         options,
//!     )?;
//!
//!     let item = pending.await?;
//!     println!("Item {} after {} attempt(s)", item.data.id, item.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## How a call settles
//!
//! - The retry loop makes up to `retry_attempts` attempts, one after another
//!   and with no delay in between. Transport errors, non-2xx responses,
//!   unparsable bodies and failing `on_response` callbacks all count as a
//!   failed attempt.
//! - A timer runs alongside the loop. If it fires first, the call settles
//!   with [`Error::Timeout`] (status 408) and the loop is dropped.
//! - Once the loop gives up, `on_error` is called once with the final error.
//! - Cancelling fails the current or next attempt with [`Error::Cancelled`].
//!   By default that ends the loop; see [`retry::RetryAlways`] to keep
//!   spending attempts instead.
//! - With `retry_attempts` set to 0 the call settles right away with
//!   [`Error::NoAttempts`].
//!
//! Every failure can be flattened into a `{ status, message }` shape with
//! [`Error::payload`], and a settled result into the tagged
//! [`CallOutcome`] shape.

pub mod cancel;
mod error;
mod fetch;
pub mod metadata;
mod options;
mod response;
pub mod retry;
pub mod transport;

pub use cancel::{CancelHandle, CancelSignal};
pub use error::{Error, ErrorPayload, Result};
pub use fetch::{resilient_fetch, Fetcher, PendingCall};
pub use metadata::RequestMetadata;
pub use options::{
    CallbackError, FetchOptions, FetchOptionsBuilder, ResilienceConfig, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_TIMEOUT, MIN_TIMEOUT,
};
pub use response::{CallOutcome, CallStatus, Response};
pub use retry::RetryPredicate;
pub use transport::{ReqwestTransport, ResponseHead, Transport, TransportResponse};
