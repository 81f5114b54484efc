//! Automation webhook transport
//!
//! One POST per event carrying a flat JSON object. The endpoint does no schema
//! negotiation; a shared secret, when configured, travels in `x-webhook-secret`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Webhook delivery errors
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Webhook endpoint returned {0}: {1}")]
    EndpointError(u16, String),
}

/// Delivers one flattened event body
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn deliver(&self, body: &Map<String, Value>) -> Result<(), WebhookError>;
}

/// reqwest-backed webhook transport
pub struct HttpWebhookTransport {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl HttpWebhookTransport {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> Result<Self, WebhookError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| WebhookError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            secret,
        })
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn deliver(&self, body: &Map<String, Value>) -> Result<(), WebhookError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(secret) = &self.secret {
            request = request.header("x-webhook-secret", secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WebhookError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WebhookError::EndpointError(status.as_u16(), text));
        }

        Ok(())
    }
}
