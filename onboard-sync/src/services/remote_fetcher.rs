//! Remote document fetcher
//!
//! Backs the document proxy. Only URLs under the configured public prefix are
//! fetched, and every fetch is aborted after a hard timeout.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Remote fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL not allowed: {0}")]
    NotAllowed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upstream returned {0}")]
    Status(u16),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Fetched document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub struct RemoteFetcher {
    client: Client,
    allowed_prefix: Option<String>,
    timeout: Duration,
}

impl RemoteFetcher {
    /// `allowed_prefix = None` rejects every URL
    pub fn new(allowed_prefix: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            allowed_prefix,
            timeout,
        })
    }

    pub fn is_allowed(&self, url: &str) -> bool {
        match &self.allowed_prefix {
            Some(prefix) => url.starts_with(prefix.as_str()) && !url.contains(".."),
            None => false,
        }
    }

    /// Fetch `url`, aborting once the timeout elapses
    pub async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        if !self.is_allowed(url) {
            return Err(FetchError::NotAllowed(url.to_string()));
        }

        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| FetchError::NetworkError(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::NetworkError(e.to_string()))?;

            Ok(FetchedDocument {
                content_type,
                bytes: bytes.to_vec(),
            })
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.timeout, "Remote fetch aborted");
                Err(FetchError::Timeout(self.timeout))
            }
        }
    }
}
