//! Fire-and-forget webhook notifier
//!
//! `notify` only enqueues: a bounded mpsc queue is drained by one background
//! task that performs the POST and logs the outcome. The caller never awaits
//! the network and never sees a delivery error. No retry; a full queue drops
//! the event with a warning.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use onboard_common::events::{EventBus, PipelineEvent};

use super::webhook_client::WebhookTransport;

/// Event names published to the automation endpoint
pub mod event_names {
    pub const DRAFT_CREATED: &str = "application.draft_created";
    pub const INVITE_SENT: &str = "application.invite_sent";
    pub const SUBMITTED: &str = "application.submitted";
    pub const RESENT: &str = "application.resent";
}

/// What happened to a `notify` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyStatus {
    /// Handed to the background worker
    Queued,
    /// Queue full or worker gone; event discarded
    Dropped,
    /// No webhook endpoint configured
    Disabled,
}

#[derive(Debug)]
struct WebhookJob {
    event: String,
    body: Map<String, Value>,
}

/// Handle for publishing webhook events
///
/// Cloning is cheap; all clones feed the same worker.
#[derive(Clone)]
pub struct WebhookNotifier {
    tx: Option<mpsc::Sender<WebhookJob>>,
}

impl WebhookNotifier {
    /// Start the delivery worker
    ///
    /// The worker exits once every notifier clone has been dropped and the
    /// queue is drained.
    pub fn spawn(
        transport: Arc<dyn WebhookTransport>,
        capacity: usize,
        events: Option<EventBus>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<WebhookJob>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match transport.deliver(&job.body).await {
                    Ok(()) => {
                        tracing::debug!(event = %job.event, "Webhook delivered");
                    }
                    Err(e) => {
                        tracing::warn!(event = %job.event, error = %e, "Webhook delivery failed");
                        if let Some(bus) = &events {
                            bus.emit_lossy(PipelineEvent::SatelliteFailed {
                                application_id: job
                                    .body
                                    .get("application_id")
                                    .and_then(Value::as_str)
                                    .and_then(|s| Uuid::parse_str(s).ok()),
                                satellite: "webhook".to_string(),
                                error: e.to_string(),
                                timestamp: Utc::now(),
                            });
                        }
                    }
                }
            }
            tracing::debug!("Webhook worker stopped");
        });

        (Self { tx: Some(tx) }, handle)
    }

    /// Notifier that discards every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue `event` with a flattened copy of `payload`
    pub fn notify(&self, event: &str, payload: &Value) -> NotifyStatus {
        let Some(tx) = &self.tx else {
            tracing::debug!(event = %event, "Webhook disabled, event skipped");
            return NotifyStatus::Disabled;
        };

        let mut body = Map::new();
        body.insert("event".to_string(), Value::String(event.to_string()));
        body.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
        body.extend(flatten_payload(payload));

        match tx.try_send(WebhookJob {
            event: event.to_string(),
            body,
        }) {
            Ok(()) => NotifyStatus::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(event = %event, "Webhook queue full, event dropped");
                NotifyStatus::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(event = %event, "Webhook worker stopped, event dropped");
                NotifyStatus::Dropped
            }
        }
    }
}

/// Flatten nested objects into one level
///
/// Nested keys are joined with `_` (`{"a":{"b":1}}` → `{"a_b":1}`); arrays
/// become JSON-encoded strings. A non-object input lands under `value`.
pub fn flatten_payload(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                flatten_into(&mut out, key, v);
            }
        }
        Value::Null => {}
        other => flatten_into(&mut out, "value", other),
    }
    out
}

fn flatten_into(out: &mut Map<String, Value>, key: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(out, &format!("{}_{}", key, child_key), child);
            }
        }
        Value::Array(_) => {
            out.insert(key.to_string(), Value::String(value.to_string()));
        }
        other => {
            out.insert(key.to_string(), other.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::webhook_client::WebhookError;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct RecordingTransport {
        bodies: Mutex<Vec<Map<String, Value>>>,
        fail: bool,
    }

    #[async_trait]
    impl WebhookTransport for RecordingTransport {
        async fn deliver(&self, body: &Map<String, Value>) -> Result<(), WebhookError> {
            self.bodies.lock().await.push(body.clone());
            if self.fail {
                Err(WebhookError::EndpointError(500, "boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_flatten_payload() {
        let flat = flatten_payload(&json!({
            "application_id": "abc",
            "fields": {"legal_name": "Acme", "address": {"city": "Austin"}},
            "principals": [{"name": "Jane"}],
            "empty": null
        }));

        assert_eq!(flat["application_id"], json!("abc"));
        assert_eq!(flat["fields_legal_name"], json!("Acme"));
        assert_eq!(flat["fields_address_city"], json!("Austin"));
        assert_eq!(flat["principals"], json!("[{\"name\":\"Jane\"}]"));
        assert!(flat["empty"].is_null());
        assert!(flat.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[tokio::test]
    async fn test_worker_delivers_queued_events() {
        let transport = Arc::new(RecordingTransport {
            bodies: Mutex::new(Vec::new()),
            fail: false,
        });
        let (notifier, handle) = WebhookNotifier::spawn(transport.clone(), 8, None);

        assert_eq!(
            notifier.notify(event_names::SUBMITTED, &json!({"application_id": "x"})),
            NotifyStatus::Queued
        );
        drop(notifier);
        handle.await.unwrap();

        let bodies = transport.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["event"], json!("application.submitted"));
        assert_eq!(bodies[0]["application_id"], json!("x"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported_as_event() {
        let transport = Arc::new(RecordingTransport {
            bodies: Mutex::new(Vec::new()),
            fail: true,
        });
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let (notifier, handle) = WebhookNotifier::spawn(transport, 8, Some(bus));

        let id = Uuid::new_v4();
        notifier.notify(event_names::INVITE_SENT, &json!({"application_id": id.to_string()}));
        drop(notifier);
        handle.await.unwrap();

        match rx.recv().await.unwrap() {
            PipelineEvent::SatelliteFailed {
                application_id,
                satellite,
                ..
            } => {
                assert_eq!(application_id, Some(id));
                assert_eq!(satellite, "webhook");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_disabled_notifier() {
        let notifier = WebhookNotifier::disabled();
        assert!(!notifier.is_enabled());
        assert_eq!(notifier.notify("x", &json!({})), NotifyStatus::Disabled);
    }
}
