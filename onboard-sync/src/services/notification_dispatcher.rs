//! Notification dispatcher
//!
//! Sends templated transactional email. Each recipient is attempted on its own:
//! one failure never stops the others, and failures are logged and reported
//! rather than returned as errors. Only the invite path retries
//! (`send_with_retry`); plain `send` relies on the provider alone.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

use super::email_client::{BatchItemResult, EmailError, EmailMessage, EmailProvider};
use super::email_templates::EmailTemplate;
use crate::utils::{retry_linear, RetryPolicy};

/// Delivery result for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailDelivery {
    pub recipient: String,
    pub template: &'static str,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent { message_id: String },
    /// Email not configured
    Skipped,
    Failed { error: String },
}

impl EmailDelivery {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed { .. })
    }
}

pub struct NotificationDispatcher {
    provider: Option<Arc<dyn EmailProvider>>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(provider: Arc<dyn EmailProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider: Some(provider),
            retry,
        }
    }

    /// Dispatcher that reports every send as skipped
    pub fn disabled(retry: RetryPolicy) -> Self {
        Self {
            provider: None,
            retry,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Send `template` to each recipient independently, without retry
    pub async fn send(&self, recipients: &[String], template: &EmailTemplate) -> Vec<EmailDelivery> {
        let Some(provider) = &self.provider else {
            tracing::debug!(template = template.name(), "Email disabled, send skipped");
            return recipients
                .iter()
                .map(|recipient| EmailDelivery {
                    recipient: recipient.clone(),
                    template: template.name(),
                    status: DeliveryStatus::Skipped,
                })
                .collect();
        };

        let sends = recipients.iter().map(|recipient| async move {
            let message = template.to_message(recipient);
            let status = match provider.send(&message).await {
                Ok(message_id) => DeliveryStatus::Sent { message_id },
                Err(e) => {
                    tracing::warn!(
                        recipient = %recipient,
                        template = template.name(),
                        error = %e,
                        "Email send failed"
                    );
                    DeliveryStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            EmailDelivery {
                recipient: recipient.clone(),
                template: template.name(),
                status,
            }
        });

        join_all(sends).await
    }

    /// Send one message with linear-backoff retry
    ///
    /// Returns the provider message id, or the last error after every attempt
    /// failed.
    pub async fn send_with_retry(&self, message: &EmailMessage) -> Result<String, String> {
        let Some(provider) = &self.provider else {
            return Err("email delivery is not configured".to_string());
        };

        retry_linear("email send", &self.retry, |_attempt| provider.send(message))
            .await
            .map(|(message_id, _attempts)| message_id)
            .map_err(|exhausted| exhausted.last_error.to_string())
    }

    /// One grouped provider call for several messages
    ///
    /// `Err` means the whole call failed and nothing is known to be sent.
    pub async fn send_grouped(
        &self,
        messages: &[EmailMessage],
    ) -> Result<Vec<BatchItemResult>, EmailError> {
        let Some(provider) = &self.provider else {
            return Ok(messages
                .iter()
                .map(|_| Err("email delivery is not configured".to_string()))
                .collect());
        };

        provider.send_batch(messages).await
    }
}
