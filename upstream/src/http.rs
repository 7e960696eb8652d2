//! HTTP client for the upstream node-data provider.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::source::{NodeSource, PeersOfPeersResponse, UpstreamNode};
use crate::UpstreamError;

/// Default timeout for upstream requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the upstream provider.
///
/// Sends `GET {base_url}/nodes` and `GET {base_url}/nodes/{pubkey}/peers-of-peers`,
/// optionally authenticated with a bearer API key.
#[derive(Clone)]
pub struct HttpNodeSource {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpNodeSource {
    /// Create a client with default timeout settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(UpstreamError::Config(format!(
                "base url must be http(s): {base_url}"
            )));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpstreamError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Authenticate every request with `Authorization: Bearer {api_key}`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// The configured base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn nodes_url(&self) -> String {
        format!("{}/nodes", self.base_url)
    }

    fn peers_of_peers_url(&self, pubkey: &str) -> String {
        format!("{}/nodes/{}/peers-of-peers", self.base_url, pubkey)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
        let mut request = self.http_client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Unreachable(format!("request timed out: {e}"))
            } else if e.is_connect() {
                UpstreamError::Unreachable(format!("connection failed: {e}"))
            } else {
                UpstreamError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(format!("failed to parse {url}: {e}")))
    }
}

#[async_trait]
impl NodeSource for HttpNodeSource {
    async fn get_all_nodes(&self) -> Result<Vec<UpstreamNode>, UpstreamError> {
        let url = self.nodes_url();
        let nodes: Vec<UpstreamNode> = self.get_json(&url).await?;
        tracing::debug!(count = nodes.len(), "fetched upstream node list");
        Ok(nodes)
    }

    async fn get_peers_of_peers(
        &self,
        pubkey: &str,
    ) -> Result<PeersOfPeersResponse, UpstreamError> {
        let url = self.peers_of_peers_url(pubkey);
        self.get_json(&url).await
    }
}
