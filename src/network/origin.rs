//! The network source behind every strategy.
//!
//! [`Origin`] is the single capability strategies use to reach the network.
//! [`HttpOrigin`] implements it with `reqwest`, optionally rewriting request
//! URLs onto an upstream base so the engine can front another server.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cache::entry::StoredResponse;
use crate::intercept::request::Request;

#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network timeout")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A network source that can answer a request.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, NetworkError>;
}

/// Headers that must not be forwarded hop to hop.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// `reqwest`-backed origin.
pub struct HttpOrigin {
    client: reqwest::Client,

    /// Base URL requests are rewritten onto, if any.
    upstream: Option<Url>,
}

impl HttpOrigin {
    pub fn new(upstream: Option<Url>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(Self { client, upstream })
    }

    /// The URL actually fetched for `url`.
    pub fn target_url(&self, url: &Url) -> Url {
        match &self.upstream {
            Some(base) => {
                let mut target = base.clone();
                target.set_path(url.path());
                target.set_query(url.query());
                target
            }
            None => url.clone(),
        }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        let target = self.target_url(&request.url);

        let mut builder = self.client.request(method, target.clone());
        for (name, value) in &request.headers {
            if HOP_BY_HOP.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout
            } else {
                NetworkError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Connect(e.to_string()))?;

        debug!(url = %target, status, size = body.len(), "Fetched from origin");

        Ok(StoredResponse::new(status, headers, body))
    }
}
