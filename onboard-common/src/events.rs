//! Event types for the onboarding event system
//!
//! Provides the pipeline event definitions and the EventBus used to fan them
//! out to SSE clients and log sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Primary record written to the system of record
    ApplicationCommitted {
        application_id: Uuid,
        /// Status after the write (e.g. "submitted")
        status: String,
        /// Upload status when the write carried documents
        upload_status: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Document uploads finished for a submission
    UploadsProcessed {
        application_id: Option<Uuid>,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// A satellite operation failed after the primary commit
    ///
    /// Informational only; the commit stands.
    SatelliteFailed {
        application_id: Option<Uuid>,
        /// "crm_mirror", "email", "webhook"
        satellite: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// A batch invite dispatch finished
    InviteBatchCompleted {
        agent_email: String,
        successful: usize,
        failed: usize,
        skipped: usize,
        timestamp: DateTime<Utc>,
    },

    /// An application was resent as a new record
    ApplicationResent {
        old_application_id: Uuid,
        new_application_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            PipelineEvent::ApplicationCommitted { .. } => "ApplicationCommitted",
            PipelineEvent::UploadsProcessed { .. } => "UploadsProcessed",
            PipelineEvent::SatelliteFailed { .. } => "SatelliteFailed",
            PipelineEvent::InviteBatchCompleted { .. } => "InviteBatchCompleted",
            PipelineEvent::ApplicationResent { .. } => "ApplicationResent",
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped for slow receivers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
