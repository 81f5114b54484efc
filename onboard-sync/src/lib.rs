//! onboard-sync library interface
//!
//! Exposes the pipeline, its collaborators and the HTTP router for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use onboard_common::events::EventBus;

use crate::config::{BlobBackend, ServiceConfig};
use crate::services::{
    BatchInviteDispatcher, BlobStore, CrmMirrorApi, CrmMirrorSync, EmailProvider, FsBlobStore,
    HttpBlobStore, HttpCrmMirror, HttpEmailProvider, HttpWebhookTransport, NotificationDispatcher,
    RemoteFetcher, SubmissionPipeline, UploadCoordinator, WebhookNotifier, WebhookTransport,
};
use crate::utils::RetryPolicy;

/// External systems the pipeline talks to
///
/// `None` disables a satellite; its steps then report `skipped`.
#[derive(Clone)]
pub struct Collaborators {
    pub blob: Arc<dyn BlobStore>,
    pub crm: Option<Arc<dyn CrmMirrorApi>>,
    pub email: Option<Arc<dyn EmailProvider>>,
    pub webhook: Option<Arc<dyn WebhookTransport>>,
    pub fetcher: Arc<RemoteFetcher>,
}

impl Collaborators {
    /// Build HTTP clients for every enabled satellite
    pub fn from_config(config: &ServiceConfig) -> onboard_common::Result<Self> {
        use onboard_common::Error;

        let blob: Arc<dyn BlobStore> = match config.blob.backend {
            BlobBackend::Http => {
                let (Some(base_url), Some(key)) =
                    (config.blob.base_url.as_deref(), config.blob.service_key.as_deref())
                else {
                    return Err(Error::Config(
                        "blob.base_url and blob.service_key are required for the http backend"
                            .to_string(),
                    ));
                };
                Arc::new(
                    HttpBlobStore::new(
                        base_url,
                        &config.blob.bucket,
                        key,
                        Duration::from_secs(config.blob.timeout_secs),
                    )
                    .map_err(|e| Error::Config(format!("blob store: {}", e)))?,
                )
            }
            BlobBackend::Fs => Arc::new(FsBlobStore::new(config.blob.resolved_local_root())),
        };

        let crm: Option<Arc<dyn CrmMirrorApi>> = match (
            config.crm.enabled,
            config.crm.base_id.as_deref(),
            config.crm.token.as_deref(),
        ) {
            (true, Some(base_id), Some(token)) => Some(Arc::new(
                HttpCrmMirror::new(
                    &config.crm.base_url,
                    base_id,
                    &config.crm.table,
                    token,
                    Duration::from_secs(config.crm.timeout_secs),
                )
                .map_err(|e| Error::Config(format!("crm: {}", e)))?,
            )),
            _ => None,
        };

        let email: Option<Arc<dyn EmailProvider>> =
            match (config.email.enabled, config.email.api_key.as_deref()) {
                (true, Some(key)) => Some(Arc::new(
                    HttpEmailProvider::new(
                        &config.email.api_base_url,
                        key,
                        &config.email.from_address,
                        config.email.requests_per_second,
                        Duration::from_secs(config.email.timeout_secs),
                    )
                    .map_err(|e| Error::Config(format!("email: {}", e)))?,
                )),
                _ => None,
            };

        let webhook: Option<Arc<dyn WebhookTransport>> =
            match (config.webhook.enabled, config.webhook.url.as_deref()) {
                (true, Some(url)) => Some(Arc::new(
                    HttpWebhookTransport::new(
                        url,
                        config.webhook.secret.clone(),
                        Duration::from_secs(config.webhook.timeout_secs),
                    )
                    .map_err(|e| Error::Config(format!("webhook: {}", e)))?,
                )),
                _ => None,
            };

        let fetcher = RemoteFetcher::new(
            config.blob.public_prefix(),
            Duration::from_secs(config.pipeline.proxy_timeout_secs),
        )
        .map_err(|e| Error::Config(format!("document proxy: {}", e)))?;

        Ok(Self {
            blob,
            crm,
            email,
            webhook,
            fetcher: Arc::new(fetcher),
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Record store pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub pipeline: Arc<SubmissionPipeline>,
    pub invites: Arc<BatchInviteDispatcher>,
    pub fetcher: Arc<RemoteFetcher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the pipeline components
    ///
    /// Must be called inside a tokio runtime: the webhook worker is spawned
    /// here and its handle returned (`None` when webhooks are disabled).
    pub fn new(
        config: ServiceConfig,
        db: SqlitePool,
        event_bus: EventBus,
        collaborators: Collaborators,
    ) -> (Self, Option<JoinHandle<()>>) {
        let config = Arc::new(config);
        let pipeline_config = &config.pipeline;

        let (webhook, worker) = match collaborators.webhook {
            Some(transport) => {
                let (notifier, handle) = WebhookNotifier::spawn(
                    transport,
                    config.webhook.queue_capacity,
                    Some(event_bus.clone()),
                );
                (notifier, Some(handle))
            }
            None => (WebhookNotifier::disabled(), None),
        };

        let mirror = Arc::new(match collaborators.crm {
            Some(api) => CrmMirrorSync::new(api),
            None => CrmMirrorSync::disabled(),
        });

        let send_retry = RetryPolicy::new(
            pipeline_config.send_attempts,
            Duration::from_millis(pipeline_config.retry_backoff_ms),
        );
        let notifications = Arc::new(match collaborators.email {
            Some(provider) => NotificationDispatcher::new(provider, send_retry),
            None => NotificationDispatcher::disabled(send_retry),
        });

        let uploads = UploadCoordinator::from_config(collaborators.blob, pipeline_config);

        let pipeline = Arc::new(SubmissionPipeline::new(
            db.clone(),
            Arc::clone(&config),
            uploads,
            mirror,
            Arc::clone(&notifications),
            webhook.clone(),
            event_bus.clone(),
        ));

        let invites = Arc::new(BatchInviteDispatcher::new(
            db.clone(),
            Arc::clone(&config),
            notifications,
            webhook,
            event_bus.clone(),
        ));

        let state = Self {
            config,
            db,
            event_bus,
            pipeline,
            invites,
            fetcher: collaborators.fetcher,
            startup_time: Utc::now(),
        };
        (state, worker)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let body_limit = state.config.server.max_request_bytes;

    Router::new()
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .merge(api::application_routes())
        .merge(api::submit_routes())
        .merge(api::invite_routes())
        .merge(api::mirror_routes())
        .merge(api::document_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
