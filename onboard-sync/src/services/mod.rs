//! Pipeline components and their external-system clients
//!
//! Clients (one per external system, each behind a trait):
//! - `blob_store`: document object storage
//! - `crm_client`: CRM mirror table API
//! - `email_client`: transactional email provider
//! - `webhook_client`: automation endpoint
//! - `remote_fetcher`: document proxy fetches
//!
//! Components:
//! - `UploadCoordinator`: paced, retried document uploads
//! - `CrmMirrorSync`: search-then-write mirror reconciliation
//! - `WebhookNotifier`: queued fire-and-forget events
//! - `NotificationDispatcher`: per-recipient isolated email
//! - `BatchInviteDispatcher`: bulk invites in paced batches
//! - `SubmissionPipeline`: lifecycle operations tying the above together

pub mod batch_invite;
pub mod blob_store;
pub mod crm_client;
pub mod crm_mapping;
pub mod crm_mirror_sync;
pub mod email_client;
pub mod email_templates;
pub mod notification_dispatcher;
pub mod remote_fetcher;
pub mod submission_pipeline;
pub mod upload_coordinator;
pub mod webhook_client;
pub mod webhook_notifier;

pub use batch_invite::{normalize_invite_inputs, BatchInviteDispatcher};
pub use blob_store::{BlobError, BlobStore, FsBlobStore, HttpBlobStore};
pub use crm_client::{CrmError, CrmMirrorApi, HttpCrmMirror, MirrorRecord};
pub use crm_mirror_sync::{CrmMirrorSync, MirrorSyncOutcome};
pub use email_client::{EmailError, EmailMessage, EmailProvider, HttpEmailProvider};
pub use email_templates::EmailTemplate;
pub use notification_dispatcher::{DeliveryStatus, EmailDelivery, NotificationDispatcher};
pub use remote_fetcher::{FetchError, FetchedDocument, RemoteFetcher};
pub use submission_pipeline::{
    ApplicationDetail, LifecycleResponse, ResendResponse, SatelliteReport, SubmissionPipeline,
    SubmitRequest, SubmitResponse,
};
pub use upload_coordinator::UploadCoordinator;
pub use webhook_client::{HttpWebhookTransport, WebhookError, WebhookTransport};
pub use webhook_notifier::{NotifyStatus, WebhookNotifier};
