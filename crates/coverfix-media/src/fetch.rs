//! Remote resource fetching
//!
//! Retrieves the byte payload behind a cover URL with a bounded timeout and
//! classifies the outcome: payload on HTTP 200, [`FetchError::Download`] for
//! any other status, [`FetchError::Network`] for transport failures.
//!
//! No retries happen at this layer; a failure is reported upward and is
//! non-fatal to the run as a whole.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Browser-like client identification sent with every request
///
/// Origin servers hosting the referenced images commonly reject
/// unidentified clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default hard upper bound for a single fetch, connect included
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Hard upper bound for one request, so a single unresponsive host
    /// cannot stall the run indefinitely
    pub timeout: Duration,
    /// User-agent header value
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// Fetch failures, classified per outcome
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Server answered with a non-200 status
    #[error("download failed: HTTP {status}")]
    Download {
        /// The status the server answered with
        status: StatusCode,
    },

    /// Connection, timeout, or transport failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Seam between the orchestrator and the network: anything that can turn a
/// URL into a byte payload
#[async_trait]
pub trait ResourceFetch: Send + Sync {
    /// Fetch the payload behind `url`
    ///
    /// # Errors
    /// - [`FetchError::Download`] on a non-200 response
    /// - [`FetchError::Network`] on connection or timeout failure
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// HTTP fetcher with bounded timeout and browser identification
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
}

impl ResourceFetcher {
    /// Build a fetcher from configuration
    ///
    /// # Errors
    /// Returns [`FetchError::Network`] if the underlying client cannot be
    /// constructed (e.g. no TLS backend available).
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetch for ResourceFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(%url, %status, "non-200 response");
            return Err(FetchError::Download { status });
        }
        Ok(response.bytes().await?)
    }
}
