//! HTTP upstream for ICY radio streams

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::traits::StreamConnector;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use pmoicy::IcySplicer;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};
use url::Url;

/// Request header asking the server to interleave metadata
pub const ICY_METADATA_HEADER: &str = "Icy-MetaData";

/// Headers announced by an ICY server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IcyHeaders {
    /// `None` when absent, unparsable or zero: the body is plain audio
    pub metaint: Option<usize>,
    pub name: Option<String>,
    pub genre: Option<String>,
    pub bitrate: Option<u32>,
    pub content_type: Option<String>,
}

impl IcyHeaders {
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        Self {
            metaint: text("icy-metaint")
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0),
            name: text("icy-name"),
            genre: text("icy-genre"),
            bitrate: text("icy-br").and_then(|s| s.parse().ok()),
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }

    /// Fresh splicer for this connection, `None` for passthrough
    pub fn splicer(&self) -> Option<IcySplicer> {
        self.metaint
            .and_then(std::num::NonZeroUsize::new)
            .map(IcySplicer::new)
    }
}

/// An open upstream: announced headers plus the raw body
pub struct UpstreamConnection {
    pub url: String,
    pub headers: IcyHeaders,
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl UpstreamConnection {
    pub fn new(
        url: impl Into<String>,
        headers: IcyHeaders,
        body: BoxStream<'static, Result<Bytes>>,
    ) -> Self {
        Self {
            url: url.into(),
            headers,
            body,
        }
    }
}

impl fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("url", &self.url)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// `StreamConnector` over reqwest
///
/// No overall request timeout is set: a radio body never ends. Stalls are
/// detected by the session instead.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: Client,
}

impl HttpConnector {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client })
    }

    /// Create a connector with a custom reqwest::Client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamConnector for HttpConnector {
    async fn connect(&self, url: &str) -> Result<UpstreamConnection> {
        let parsed = Url::parse(url.trim()).map_err(|e| Error::stream_unavailable(url, e))?;

        debug!(url = %parsed, "Opening upstream");
        let response = self
            .client
            .get(parsed.clone())
            .header(ICY_METADATA_HEADER, "1")
            .send()
            .await
            .map_err(|e| Error::stream_unavailable(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::stream_unavailable(url, format!("HTTP {}", status)));
        }

        let headers = IcyHeaders::from_header_map(response.headers());
        info!(
            url = %parsed,
            metaint = ?headers.metaint,
            name = ?headers.name,
            "Upstream connected"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed();

        Ok(UpstreamConnection::new(url, headers, body))
    }
}
