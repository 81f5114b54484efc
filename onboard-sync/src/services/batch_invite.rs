//! Batch invite dispatcher
//!
//! Turns a pile of pasted addresses into invited applications:
//! 1. split on `,` `;` and newlines, trim, lowercase, validate, dedupe
//! 2. addresses that already have an `invited` record are skipped, never mailed
//! 3. the rest go out in fixed-size batches with a pause between batches
//! 4. within a batch every record is created concurrently, then one grouped
//!    send covers the batch; per-index errors fail just those addresses, a
//!    failed grouped call falls back to per-address sends with retry
//! 5. each sent invite publishes a webhook event
//! 6. failures are summarized in one email to the agent
//!
//! The grouped-vs-sequential choice is a strategy flag; `Sequential` skips
//! straight to per-address sends.

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use onboard_common::events::{EventBus, PipelineEvent};
use onboard_common::Result;

use super::email_templates::EmailTemplate;
use super::notification_dispatcher::NotificationDispatcher;
use super::webhook_notifier::{event_names, WebhookNotifier};
use crate::config::{SendStrategy, ServiceConfig};
use crate::db::{self, ApplicationUpsert};
use crate::models::{
    ApplicationFields, ApplicationRecord, ApplicationStatus, BatchInviteResult, InviteFailure,
};

/// Split, trim, lowercase, validate and dedupe raw address inputs
///
/// Order of first appearance is kept. Invalid addresses are dropped silently.
pub fn normalize_invite_inputs(raw_inputs: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw_inputs
        .iter()
        .flat_map(|input| input.split(|c| matches!(c, ',' | ';' | '\n' | '\r')))
        .filter_map(onboard_common::email::parse_email)
        .filter(|email| seen.insert(email.clone()))
        .collect()
}

pub struct BatchInviteDispatcher {
    pool: SqlitePool,
    config: Arc<ServiceConfig>,
    notifications: Arc<NotificationDispatcher>,
    webhook: WebhookNotifier,
    events: EventBus,
}

impl BatchInviteDispatcher {
    pub fn new(
        pool: SqlitePool,
        config: Arc<ServiceConfig>,
        notifications: Arc<NotificationDispatcher>,
        webhook: WebhookNotifier,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            config,
            notifications,
            webhook,
            events,
        }
    }

    /// Invite every address in `raw_inputs` on behalf of `agent_email`
    ///
    /// Only the already-invited lookup can fail the call; everything after it
    /// is accounted per address.
    pub async fn dispatch(
        &self,
        raw_inputs: &[String],
        agent_email: &str,
        strategy: Option<SendStrategy>,
    ) -> Result<BatchInviteResult> {
        let strategy = strategy.unwrap_or(self.config.pipeline.send_strategy);
        let candidates = normalize_invite_inputs(raw_inputs);
        let already_invited = db::find_invited_emails(&self.pool, &candidates).await?;

        let mut result = BatchInviteResult::default();
        let mut pending = Vec::new();
        for email in &candidates {
            if already_invited.contains(email) {
                result.skipped.push(email.clone());
            } else {
                pending.push(email.clone());
            }
        }

        tracing::info!(
            agent = %agent_email,
            requested = candidates.len(),
            skipped = result.skipped.len(),
            strategy = ?strategy,
            "Dispatching invites"
        );

        let batch_size = self.config.pipeline.invite_batch_size.max(1);
        let pacing = Duration::from_millis(self.config.pipeline.invite_batch_pacing_ms);

        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            self.process_batch(batch, agent_email, strategy, &mut result)
                .await;
        }

        if !result.failed.is_empty() {
            self.report_failures(agent_email, &result.failed).await;
        }

        let result = result.finalize(candidates.len());
        self.events.emit_lossy(PipelineEvent::InviteBatchCompleted {
            agent_email: agent_email.to_string(),
            successful: result.totals.successful,
            failed: result.totals.failed,
            skipped: result.totals.skipped,
            timestamp: Utc::now(),
        });

        tracing::info!(
            agent = %agent_email,
            successful = result.totals.successful,
            failed = result.totals.failed,
            skipped = result.totals.skipped,
            "Invite dispatch complete"
        );

        Ok(result)
    }

    async fn process_batch(
        &self,
        batch: &[String],
        agent_email: &str,
        strategy: SendStrategy,
        result: &mut BatchInviteResult,
    ) {
        let creates = join_all(batch.iter().map(|email| self.create_invite(email, agent_email)));

        let mut created: Vec<(String, ApplicationRecord)> = Vec::with_capacity(batch.len());
        for (email, outcome) in batch.iter().zip(creates.await) {
            match outcome {
                Ok(record) => {
                    result.application_ids.insert(email.clone(), record.id);
                    created.push((email.clone(), record));
                }
                Err(e) => {
                    tracing::error!(email = %email, error = %e, "Invite record could not be created");
                    result.failed.push(InviteFailure {
                        email: email.clone(),
                        error: format!("could not create application: {}", e),
                    });
                }
            }
        }

        if created.is_empty() {
            return;
        }

        let messages: Vec<_> = created
            .iter()
            .map(|(email, record)| self.invite_template(record, agent_email).to_message(email))
            .collect();

        let grouped = match strategy {
            SendStrategy::Grouped => match self.notifications.send_grouped(&messages).await {
                Ok(items) if items.len() == messages.len() => Some(items),
                Ok(items) => {
                    tracing::warn!(
                        expected = messages.len(),
                        received = items.len(),
                        "Grouped send returned wrong result count, falling back to sequential"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Grouped send failed, falling back to sequential");
                    None
                }
            },
            SendStrategy::Sequential => None,
        };

        let outcomes: Vec<std::result::Result<(), String>> = match grouped {
            Some(items) => items.into_iter().map(|item| item.map(|_| ())).collect(),
            None => {
                let mut outcomes = Vec::with_capacity(messages.len());
                for message in &messages {
                    outcomes.push(self.notifications.send_with_retry(message).await.map(|_| ()));
                }
                outcomes
            }
        };

        for ((email, record), outcome) in created.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    self.webhook.notify(
                        event_names::DRAFT_CREATED,
                        &json!({
                            "application_id": record.id.to_string(),
                            "merchant_email": email,
                            "agent_email": agent_email,
                            "status": record.status.as_str(),
                            "invite_link": self.config.invite_link(record.id),
                        }),
                    );
                    result.successful.push(email);
                }
                Err(error) => {
                    tracing::warn!(email = %email, error = %error, "Invite send failed");
                    result.failed.push(InviteFailure { email, error });
                }
            }
        }
    }

    async fn create_invite(&self, email: &str, agent_email: &str) -> Result<ApplicationRecord> {
        let fields = ApplicationFields {
            merchant_email: Some(email.to_string()),
            agent_email: Some(agent_email.to_string()),
            ..Default::default()
        };

        db::upsert_application(
            &self.pool,
            ApplicationUpsert {
                id: None,
                status: ApplicationStatus::Invited,
                fields,
                upload_status: None,
            },
        )
        .await
    }

    fn invite_template(&self, record: &ApplicationRecord, agent_email: &str) -> EmailTemplate {
        EmailTemplate::MerchantInvite {
            business_name: record.fields.display_name().map(str::to_string),
            agent_email: Some(agent_email.to_string()),
            link: self.config.invite_link(record.id),
        }
    }

    /// One summary email to the agent; best effort, not retried
    async fn report_failures(&self, agent_email: &str, failures: &[InviteFailure]) {
        let template = EmailTemplate::InviteFailureSummary {
            failures: failures.to_vec(),
        };
        let deliveries = self
            .notifications
            .send(&[agent_email.to_string()], &template)
            .await;

        if deliveries.iter().any(|d| d.is_failed()) {
            tracing::warn!(agent = %agent_email, "Invite failure summary could not be sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_dedupes_case_insensitively() {
        assert_eq!(
            normalize_invite_inputs(&inputs(&["A@x.com", "a@x.com"])),
            vec!["a@x.com".to_string()]
        );
    }

    #[test]
    fn test_normalize_splits_delimited_strings() {
        let normalized = normalize_invite_inputs(&inputs(&[
            "one@x.com, two@x.com;three@x.com\nfour@x.com",
            "  Two@X.com ",
        ]));
        assert_eq!(
            normalized,
            inputs(&["one@x.com", "two@x.com", "three@x.com", "four@x.com"])
        );
    }

    #[test]
    fn test_normalize_drops_invalid() {
        assert_eq!(
            normalize_invite_inputs(&inputs(&["bad-email", "", "ok@x.com", "@x.com"])),
            inputs(&["ok@x.com"])
        );
    }
}
