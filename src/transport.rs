//! The network collaborator behind every attempt.
//!
//! The retry loop only knows the [`Transport`] trait. [`ReqwestTransport`] is
//! the default implementation; tests and embedders can plug in their own.

use crate::{cancel::CancelSignal, metadata::RequestMetadata, Error, Result};
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use url::Url;

/// Performs a single HTTP request.
///
/// Implementations must fail with [`Error::Cancelled`] promptly once `signal`
/// is cancelled, whether the request is in flight or not yet started.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` to `url` and returns the fully buffered response.
    async fn send(
        &self,
        url: &Url,
        request: &RequestMetadata,
        signal: &CancelSignal,
    ) -> Result<TransportResponse>;
}

/// A buffered response returned by a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The reason phrase accompanying the status.
    pub status_text: String,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body as text.
    pub body: String,
}

impl TransportResponse {
    /// Creates a response with the canonical reason phrase for `status`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the status line and headers, without the body.
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// Status and headers of a received response, as seen by `on_response`.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The reason phrase accompanying the status.
    pub status_text: String,
    /// The response headers.
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { http_client })
    }

    /// Wraps an already configured `reqwest::Client`.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn execute(&self, url: &Url, request: &RequestMetadata) -> Result<TransportResponse> {
        let mut url = url.clone();
        for (key, value) in &request.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        let mut builder = self.http_client.request(request.method.clone(), url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(TransportResponse::new(status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        url: &Url,
        request: &RequestMetadata,
        signal: &CancelSignal,
    ) -> Result<TransportResponse> {
        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                tracing::debug!(url = %url, "Request aborted by cancellation");
                Err(Error::Cancelled)
            }
            result = self.execute(url, request) => result,
        }
    }
}
