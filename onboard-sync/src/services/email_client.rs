//! Transactional email provider client
//!
//! `POST {api}/emails` sends one message; `POST {api}/emails/batch` sends up to
//! 100 and reports per-index results. Requests are paced with a token bucket.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

/// Email provider errors
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Email API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// One outbound message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// Per-message result of a batch send: provider message id or error reason
pub type BatchItemResult = Result<String, String>;

/// Email provider operations
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send one message; returns the provider message id
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError>;

    /// Send several messages in one call
    ///
    /// `Err` means the call as a whole failed (transport, auth, rate limit).
    /// `Ok` holds one entry per input message, in input order.
    async fn send_batch(&self, messages: &[EmailMessage])
        -> Result<Vec<BatchItemResult>, EmailError>;
}

#[derive(Debug, Serialize)]
struct OutboundEmail<'a> {
    from: &'a str,
    #[serde(flatten)]
    message: &'a EmailMessage,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    data: Vec<SendResponse>,
    #[serde(default)]
    errors: Vec<BatchItemError>,
}

#[derive(Debug, Deserialize)]
struct BatchItemError {
    index: usize,
    message: String,
}

impl BatchResponse {
    /// Spread ids over the indexes that did not error, in order
    fn into_results(self, count: usize) -> Vec<BatchItemResult> {
        let errors: HashMap<usize, String> =
            self.errors.into_iter().map(|e| (e.index, e.message)).collect();
        let mut ids = self.data.into_iter().map(|d| d.id);

        (0..count)
            .map(|index| match errors.get(&index) {
                Some(message) => Err(message.clone()),
                None => ids
                    .next()
                    .ok_or_else(|| "provider returned no id for message".to_string()),
            })
            .collect()
    }
}

/// HTTP email provider client
pub struct HttpEmailProvider {
    client: Client,
    base_url: String,
    api_key: String,
    from_address: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpEmailProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        from_address: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> Result<Self, EmailError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| EmailError::NetworkError(e.to_string()))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from_address: from_address.to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, EmailError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| EmailError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmailError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::ApiError(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<String, EmailError> {
        let body = OutboundEmail {
            from: &self.from_address,
            message,
        };
        tracing::debug!(to = ?message.to, subject = %message.subject, "Sending email");

        let sent: SendResponse = self
            .post("/emails", &body)
            .await?
            .json()
            .await
            .map_err(|e| EmailError::ParseError(e.to_string()))?;

        Ok(sent.id)
    }

    async fn send_batch(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<BatchItemResult>, EmailError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let body: Vec<OutboundEmail<'_>> = messages
            .iter()
            .map(|message| OutboundEmail {
                from: &self.from_address,
                message,
            })
            .collect();
        tracing::debug!(count = messages.len(), "Sending email batch");

        let response: BatchResponse = self
            .post("/emails/batch", &body)
            .await?
            .json()
            .await
            .map_err(|e| EmailError::ParseError(e.to_string()))?;

        Ok(response.into_results(messages.len()))
    }
}
