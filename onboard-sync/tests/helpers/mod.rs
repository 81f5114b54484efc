//! Test helper utilities
//!
//! In-memory stand-ins for every external system plus a harness that wires
//! them into a real `AppState` over an in-memory record store.

#![allow(dead_code)]

pub mod mocks;

pub use mocks::{MemoryBlobStore, MockCrm, MockEmail, RecordingWebhook};

use std::sync::Arc;
use std::time::Duration;

use onboard_common::events::EventBus;
use onboard_sync::config::ServiceConfig;
use onboard_sync::models::{ApplicationFields, FilePayload};
use onboard_sync::services::RemoteFetcher;
use onboard_sync::{AppState, Collaborators};
use serde_json::json;

/// Configuration with pacing and backoff zeroed so tests run fast
pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.server.public_base_url = "https://onboard.test".to_string();
    config.pipeline.retry_backoff_ms = 0;
    config.pipeline.file_pacing_ms = 0;
    config.pipeline.invite_batch_pacing_ms = 0;
    config.pipeline.max_upload_bytes = 8 * 1024 * 1024;
    config
}

pub struct TestHarness {
    pub state: AppState,
    pub blob: Arc<MemoryBlobStore>,
    pub crm: Arc<MockCrm>,
    pub email: Arc<MockEmail>,
    pub webhook: Arc<RecordingWebhook>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(fast_config()).await
    }

    pub async fn with_config(config: ServiceConfig) -> Self {
        let pool = onboard_common::db::init_memory_database()
            .await
            .expect("in-memory database");

        let blob = Arc::new(MemoryBlobStore::default());
        let crm = Arc::new(MockCrm::default());
        let email = Arc::new(MockEmail::default());
        let webhook = Arc::new(RecordingWebhook::default());

        let collaborators = Collaborators {
            blob: blob.clone(),
            crm: Some(crm.clone()),
            email: Some(email.clone()),
            webhook: Some(webhook.clone()),
            fetcher: Arc::new(
                RemoteFetcher::new(None, Duration::from_secs(1)).expect("fetcher"),
            ),
        };

        let (state, _worker) = AppState::new(config, pool, EventBus::new(100), collaborators);

        Self {
            state,
            blob,
            crm,
            email,
            webhook,
        }
    }

    pub fn router(&self) -> axum::Router {
        onboard_sync::build_router(self.state.clone())
    }
}

/// Fields that satisfy submission preconditions
pub fn complete_fields(merchant: &str) -> ApplicationFields {
    ApplicationFields::from_raw(&json!({
        "legal_name": "Acme Widgets LLC",
        "dba_name": "Acme",
        "merchant_email": merchant,
        "contact_first_name": "Jane",
        "contact_last_name": "Doe",
        "monthly_volume": 25000,
        "average_ticket": 42.5,
    }))
    .expect("valid fields")
}

pub fn file(document_type: &str, size: usize) -> FilePayload {
    FilePayload {
        document_type: document_type.to_string(),
        file_name: format!("{}.pdf", document_type),
        content_type: Some("application/pdf".to_string()),
        bytes: vec![7u8; size],
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
