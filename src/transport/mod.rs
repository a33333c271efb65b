pub mod fallback;
pub mod http;

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::HeaderMap, Method, Version};

pub use fallback::FallbackTransport;
pub use http::{build_transport, HttpTransport, HttpVersion};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// One fully rendered request. Borrows the trial's method and headers; URL and body are
/// freshly substituted for every attempt.
#[derive(Debug)]
pub struct RenderedRequest<'a> {
    pub method: &'a Method,
    pub url: Cow<'a, str>,
    pub body: Cow<'a, str>,
    pub headers: &'a [(String, String)],
    /// Append `Content-Type: application/json` after the caller's headers.
    pub default_content_type: bool,
}

impl RenderedRequest<'_> {
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let default = (self.default_content_type && !self.body.is_empty())
            .then_some(("Content-Type", DEFAULT_CONTENT_TYPE));
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .chain(default)
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// No response was obtained. Counted against the trial, never fatal to it.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Timeout")]
    Timeout,
    #[error("Connection failed - {0}")]
    Connect(String),
    #[error("Invalid request - {0}")]
    InvalidRequest(String),
    #[error("Request failed - {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Executes one request. Shared read-only by every worker of a trial.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &RenderedRequest<'_>,
    ) -> Result<TransportResponse, TransportError>;

    fn label(&self) -> &str {
        "custom"
    }
}
