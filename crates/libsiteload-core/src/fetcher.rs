//! HTTP GET seam used by the scenario runner

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::error::Result;

/// Why a single request produced no HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),
}

impl FetchError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchError::Connect(_) => "connect_error",
            FetchError::Timeout => "timeout",
            FetchError::Request(_) => "request_error",
        }
    }
}

/// Issues one GET and reports the response status.
///
/// Implementations must not retry; the runner records whatever comes back.
pub trait Fetcher: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = std::result::Result<u16, FetchError>> + Send;
}

/// Production fetcher backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with default redirect handling and no extra headers.
    ///
    /// `insecure_skip_tls_verify` accepts self-signed certificates for local
    /// testing.
    pub fn new(request_timeout: Duration, insecure_skip_tls_verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(insecure_skip_tls_verify)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str) -> std::result::Result<u16, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status().as_u16();

        // Drain the body so the connection returns to the pool
        let _ = response.bytes().await;

        Ok(status)
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Connect(err.to_string())
    } else {
        FetchError::Request(err.to_string())
    }
}
