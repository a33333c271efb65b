use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{FallbackTransport, RenderedRequest, Transport, TransportError, TransportResponse};
use crate::{error::ConfigError, logging::BenchLogger};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpVersion {
    #[default]
    #[serde(rename = "1.1")]
    Http11,
    #[serde(rename = "2")]
    Http2,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http11 => "1.1",
            Self::Http2 => "2",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "1" | "1.1" => Ok(Self::Http11),
            "2" | "2.0" => Ok(Self::Http2),
            other => Err(ConfigError::HttpVersion(other.to_string())),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}", self.as_str())
    }
}

/// `reqwest` backed transport pinned to one protocol version.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    version: HttpVersion,
}

impl HttpTransport {
    pub fn new(version: HttpVersion) -> Result<Self, ConfigError> {
        let builder = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .tcp_nodelay(true);
        let builder = match version {
            HttpVersion::Http11 => builder.http1_only(),
            HttpVersion::Http2 => builder.http2_prior_knowledge(),
        };
        let client = builder.build().map_err(ConfigError::Client)?;
        Ok(Self { client, version })
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &RenderedRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_ref());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone().into_owned());
        }

        let mut response = builder.send().await?;
        let status = response.status().as_u16();
        let version = response.version();
        let headers = std::mem::take(response.headers_mut());
        // A body that fails mid-read still counts as an obtained response.
        let body = response.bytes().await.unwrap_or_default();

        Ok(TransportResponse {
            status,
            version,
            headers,
            body,
        })
    }

    fn label(&self) -> &str {
        match self.version {
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http2 => "HTTP/2",
        }
    }
}

/// HTTP/2 starts on prior-knowledge h2 and degrades to HTTP/1.1 for the rest of the run
/// on its first failure.
pub fn build_transport(version: HttpVersion) -> Result<Arc<dyn Transport>, ConfigError> {
    let transport: Arc<dyn Transport> = match version {
        HttpVersion::Http11 => Arc::new(HttpTransport::new(HttpVersion::Http11)?),
        HttpVersion::Http2 => Arc::new(FallbackTransport::new(
            HttpTransport::new(HttpVersion::Http2)?,
            HttpTransport::new(HttpVersion::Http11)?,
        )),
    };
    BenchLogger::transport_selected(transport.label());
    Ok(transport)
}
