//! Pass-through request options handed to the transport.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::collections::HashMap;

/// Transport options for one call: method, headers, query parameters and body.
///
/// The resilience layer never interprets these; every attempt hands the same
/// metadata to the [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// Headers sent with every attempt.
    pub headers: HeaderMap,

    /// Query parameters appended to the URL.
    pub query_params: HashMap<String, String>,

    /// The request body, if any.
    pub body: Option<Vec<u8>>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and no body.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query_params: HashMap::new(),
            body: None,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Sets a raw request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and sets the `content-type` header.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn with_json_body<B: Serialize>(mut self, body: &B) -> Result<Self, crate::Error> {
        let bytes = serde_json::to_vec(body).map_err(|e| {
            crate::Error::ConfigurationError(format!("Failed to serialize request body: {}", e))
        })?;
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.body = Some(bytes);
        Ok(self)
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}
