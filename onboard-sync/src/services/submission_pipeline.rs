//! Submission synchronization pipeline
//!
//! Every lifecycle operation follows the same shape:
//! 1. preconditions (required fields, allowed status transition)
//! 2. primary commit to the record store; failure here aborts the request
//!    before any satellite is touched
//! 3. satellites (CRM mirror, webhook, email, stale document cleanup) run
//!    after the commit, concurrently where they can, and their failures are
//!    folded into the response instead of failing it
//!
//! There is no compensation: once the record store write succeeds the
//! operation is committed whatever the satellites do.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use onboard_common::events::{EventBus, PipelineEvent};
use onboard_common::{Error, Result};

use super::crm_mirror_sync::{CrmMirrorSync, MirrorSyncOutcome};
use super::email_templates::EmailTemplate;
use super::notification_dispatcher::{EmailDelivery, NotificationDispatcher};
use super::upload_coordinator::UploadCoordinator;
use super::webhook_notifier::{event_names, NotifyStatus, WebhookNotifier};
use crate::config::ServiceConfig;
use crate::db::{self, ApplicationFilter, ApplicationUpsert};
use crate::models::{
    ApplicationFields, ApplicationRecord, ApplicationStatus, FilePayload, SyncAction,
    UploadRecord, UploadStatus, UploadSummary,
};

/// Input to `submit`
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Existing application being submitted; `None` creates one
    pub application_id: Option<Uuid>,
    pub fields: ApplicationFields,
    pub files: Vec<FilePayload>,
}

/// Itemized account of the satellite effects of one operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SatelliteReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crm_mirror: Option<MirrorSyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<NotifyStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<EmailDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_cleanup: Option<DocumentCleanup>,
}

impl SatelliteReport {
    /// True when any satellite reported a failure
    pub fn has_failures(&self) -> bool {
        self.crm_mirror.as_ref().map(|m| !m.is_ok()).unwrap_or(false)
            || self.webhook == Some(NotifyStatus::Dropped)
            || self.emails.iter().any(|e| e.is_failed())
            || self
                .document_cleanup
                .as_ref()
                .map(|c| !c.errors.is_empty())
                .unwrap_or(false)
    }
}

/// Removal of blob objects no longer referenced after a resubmission
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentCleanup {
    pub removed: usize,
    pub errors: Vec<String>,
}

/// Response to `submit`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub application_id: Uuid,
    pub status: ApplicationStatus,
    pub upload_status: UploadStatus,
    pub upload_summary: UploadSummary,
    /// Primary write succeeded but at least one satellite did not
    pub partial_failure: bool,
    pub satellites: SatelliteReport,
}

/// Response to draft / prefill / opened
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleResponse {
    pub success: bool,
    pub application: ApplicationRecord,
    /// False when the call left the record as it was
    pub changed: bool,
    pub partial_failure: bool,
    pub satellites: SatelliteReport,
}

/// Response to `resend`
#[derive(Debug, Clone, Serialize)]
pub struct ResendResponse {
    pub success: bool,
    pub previous_application_id: Uuid,
    pub application: ApplicationRecord,
    pub partial_failure: bool,
    pub satellites: SatelliteReport,
}

/// One application with its documents
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetail {
    pub application: ApplicationRecord,
    pub uploads: Vec<UploadRecord>,
}

pub struct SubmissionPipeline {
    pool: SqlitePool,
    config: Arc<ServiceConfig>,
    uploads: UploadCoordinator,
    mirror: Arc<CrmMirrorSync>,
    notifications: Arc<NotificationDispatcher>,
    webhook: WebhookNotifier,
    events: EventBus,
}

impl SubmissionPipeline {
    pub fn new(
        pool: SqlitePool,
        config: Arc<ServiceConfig>,
        uploads: UploadCoordinator,
        mirror: Arc<CrmMirrorSync>,
        notifications: Arc<NotificationDispatcher>,
        webhook: WebhookNotifier,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            config,
            uploads,
            mirror,
            notifications,
            webhook,
            events,
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Upload documents, commit the application and its document rows, then
    /// run the satellites
    ///
    /// `actor` namespaces blob paths; the merchant email stands in when absent.
    pub async fn submit(&self, actor: Option<&str>, request: SubmitRequest) -> Result<SubmitResponse> {
        let missing = request.fields.missing_for_submission();
        if !missing.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let existing = match request.application_id {
            Some(id) => db::get_application(&self.pool, id).await?,
            None => None,
        };
        if let Some(record) = &existing {
            if !record.status.can_transition_to(ApplicationStatus::Submitted) {
                return Err(Error::Conflict(format!(
                    "Application {} in status {} cannot be submitted",
                    record.id, record.status
                )));
            }
        }

        let namespace = actor
            .or(request.fields.merchant_email.as_deref())
            .unwrap_or("anonymous")
            .to_string();
        let summary = self.uploads.upload_all(&namespace, request.files).await;
        self.events.emit_lossy(PipelineEvent::UploadsProcessed {
            application_id: request.application_id,
            succeeded: summary.successful,
            failed: summary.failed.len(),
            skipped: summary.skipped.len(),
            timestamp: Utc::now(),
        });

        let previous_uploads = match &existing {
            Some(record) => db::list_uploads(&self.pool, record.id).await?,
            None => Vec::new(),
        };

        // Primary commit
        let upload_status = summary.upload_status();
        let record = db::upsert_application(
            &self.pool,
            ApplicationUpsert {
                id: request.application_id,
                status: ApplicationStatus::Submitted,
                fields: request.fields,
                upload_status: Some(upload_status),
            },
        )
        .await?;
        let fresh_uploads = summary.to_upload_records(record.id);
        db::replace_children(&self.pool, record.id, &fresh_uploads).await?;

        tracing::info!(
            application_id = %record.id,
            upload_status = upload_status.as_str(),
            documents = fresh_uploads.len(),
            "Application submitted"
        );
        self.emit_committed(&record);

        // Satellites
        let fresh_urls: HashSet<&str> = fresh_uploads.iter().map(|u| u.url.as_str()).collect();
        let stale_urls: Vec<String> = previous_uploads
            .iter()
            .filter(|u| !fresh_urls.contains(u.url.as_str()))
            .map(|u| u.url.clone())
            .collect();

        let webhook = self.webhook.notify(
            event_names::SUBMITTED,
            &json!({
                "application_id": record.id.to_string(),
                "status": record.status.as_str(),
                "upload_status": upload_status.as_str(),
                "fields": record.fields,
                "documents": summary.urls,
                "documents_skipped": summary.skipped,
                "documents_failed": summary
                    .failed
                    .iter()
                    .map(|f| f.document_type.clone())
                    .collect::<Vec<_>>(),
            }),
        );

        let (crm_mirror, emails, document_cleanup) = tokio::join!(
            self.mirror
                .sync(record.id, SyncAction::ApplicationSubmitted, &record.fields),
            self.send_submission_emails(&record, &summary),
            self.remove_stale_documents(record.id, &stale_urls),
        );

        let satellites = SatelliteReport {
            crm_mirror: Some(crm_mirror),
            webhook: Some(webhook),
            emails,
            document_cleanup,
        };
        self.report_satellite_failures(record.id, &satellites);

        Ok(SubmitResponse {
            success: true,
            application_id: record.id,
            status: record.status,
            upload_status,
            upload_summary: summary,
            partial_failure: satellites.has_failures(),
            satellites,
        })
    }

    async fn send_submission_emails(
        &self,
        record: &ApplicationRecord,
        summary: &UploadSummary,
    ) -> Vec<EmailDelivery> {
        let legal_name = record
            .fields
            .legal_name
            .clone()
            .unwrap_or_else(|| "your business".to_string());

        let merchant_notice = async {
            match &record.merchant_email {
                Some(merchant) => {
                    self.notifications
                        .send(
                            std::slice::from_ref(merchant),
                            &EmailTemplate::SubmissionReceived {
                                legal_name: legal_name.clone(),
                            },
                        )
                        .await
                }
                None => Vec::new(),
            }
        };

        let agent_notice = async {
            match &record.agent_email {
                Some(agent) => {
                    self.notifications
                        .send(
                            std::slice::from_ref(agent),
                            &EmailTemplate::AgentSubmissionNotice {
                                legal_name: legal_name.clone(),
                                application_id: record.id,
                                upload_status: summary.upload_status(),
                                skipped: summary.skipped.clone(),
                                failed: summary
                                    .failed
                                    .iter()
                                    .map(|f| f.document_type.clone())
                                    .collect(),
                            },
                        )
                        .await
                }
                None => Vec::new(),
            }
        };

        let (mut merchant, agent) = tokio::join!(merchant_notice, agent_notice);
        merchant.extend(agent);
        merchant
    }

    async fn remove_stale_documents(
        &self,
        application_id: Uuid,
        stale_urls: &[String],
    ) -> Option<DocumentCleanup> {
        if stale_urls.is_empty() {
            return None;
        }

        let store = self.uploads.store();
        let mut cleanup = DocumentCleanup::default();
        for url in stale_urls {
            let Some(path) = store.object_path(url) else {
                tracing::debug!(url = %url, "Stale document not in this store, left in place");
                continue;
            };
            match store.delete_by_prefix(&path).await {
                Ok(removed) => cleanup.removed += removed,
                Err(e) => {
                    tracing::warn!(
                        application_id = %application_id,
                        path = %path,
                        error = %e,
                        "Stale document cleanup failed"
                    );
                    cleanup.errors.push(format!("{}: {}", path, e));
                }
            }
        }

        Some(cleanup)
    }

    // ========================================================================
    // Drafts, invites, opens, resends
    // ========================================================================

    /// Save fields without submitting
    ///
    /// New records and drafts are stored as `draft`; an invited or opened
    /// application keeps its status so a merchant can save progress.
    pub async fn save_draft(
        &self,
        application_id: Option<Uuid>,
        fields: ApplicationFields,
    ) -> Result<LifecycleResponse> {
        let existing = match application_id {
            Some(id) => db::get_application(&self.pool, id).await?,
            None => None,
        };
        let status = match existing.as_ref().map(|r| r.status) {
            Some(status @ (ApplicationStatus::Invited | ApplicationStatus::Opened)) => status,
            _ => ApplicationStatus::Draft,
        };

        let record = db::upsert_application(
            &self.pool,
            ApplicationUpsert {
                id: application_id,
                status,
                fields,
                upload_status: None,
            },
        )
        .await?;
        tracing::info!(application_id = %record.id, status = %record.status, "Draft saved");
        self.emit_committed(&record);

        let webhook = self.webhook.notify(
            event_names::DRAFT_CREATED,
            &json!({
                "application_id": record.id.to_string(),
                "status": record.status.as_str(),
                "fields": record.fields,
            }),
        );
        let crm_mirror = self
            .mirror
            .sync(record.id, sync_action_for(record.status), &record.fields)
            .await;

        Ok(self.lifecycle_response(
            record,
            true,
            SatelliteReport {
                crm_mirror: Some(crm_mirror),
                webhook: Some(webhook),
                ..Default::default()
            },
        ))
    }

    /// Store agent-entered fields and invite the merchant to finish
    pub async fn prefill_and_send(
        &self,
        actor: &str,
        application_id: Option<Uuid>,
        mut fields: ApplicationFields,
    ) -> Result<LifecycleResponse> {
        let merchant = match fields.merchant_email.as_deref() {
            Some(email) if onboard_common::email::is_valid_email(email) => email.to_string(),
            _ => {
                return Err(Error::InvalidInput(
                    "A valid merchant email is required to send an invite".to_string(),
                ))
            }
        };
        if fields.agent_email.is_none() {
            fields.agent_email = Some(actor.to_string());
        }

        let record = db::upsert_application(
            &self.pool,
            ApplicationUpsert {
                id: application_id,
                status: ApplicationStatus::Invited,
                fields,
                upload_status: None,
            },
        )
        .await?;
        tracing::info!(application_id = %record.id, actor = %actor, "Application prefilled");
        self.emit_committed(&record);

        let template = self.invite_template(&record);
        let webhook = self.webhook.notify(
            event_names::INVITE_SENT,
            &json!({
                "application_id": record.id.to_string(),
                "status": record.status.as_str(),
                "invite_link": self.config.invite_link(record.id),
                "fields": record.fields,
            }),
        );
        let recipients = [merchant];
        let (crm_mirror, emails) = tokio::join!(
            self.mirror.sync(record.id, SyncAction::InviteSent, &record.fields),
            self.notifications.send(&recipients, &template),
        );

        Ok(self.lifecycle_response(
            record,
            true,
            SatelliteReport {
                crm_mirror: Some(crm_mirror),
                webhook: Some(webhook),
                emails,
                document_cleanup: None,
            },
        ))
    }

    /// Record that the merchant opened their invite
    ///
    /// Only `invited` (or a bare `draft`) moves to `opened`; later statuses
    /// are left untouched and nothing is synced.
    pub async fn mark_opened(&self, application_id: Uuid) -> Result<LifecycleResponse> {
        let record = db::require_application(&self.pool, application_id).await?;

        if !matches!(
            record.status,
            ApplicationStatus::Invited | ApplicationStatus::Draft
        ) {
            return Ok(self.lifecycle_response(record, false, SatelliteReport::default()));
        }

        let record = db::update_status(&self.pool, application_id, ApplicationStatus::Opened).await?;
        tracing::info!(application_id = %record.id, "Invite opened");
        self.emit_committed(&record);

        let crm_mirror = self
            .mirror
            .sync(record.id, SyncAction::InviteOpened, &record.fields)
            .await;

        Ok(self.lifecycle_response(
            record,
            true,
            SatelliteReport {
                crm_mirror: Some(crm_mirror),
                ..Default::default()
            },
        ))
    }

    /// Retire an application and continue it as a fresh invited copy
    pub async fn resend(&self, actor: &str, application_id: Uuid) -> Result<ResendResponse> {
        let original = db::require_application(&self.pool, application_id).await?;
        let record = db::insert_resend(&self.pool, &original).await?;

        tracing::info!(
            previous_application_id = %original.id,
            application_id = %record.id,
            actor = %actor,
            "Application resent"
        );
        self.events.emit_lossy(PipelineEvent::ApplicationResent {
            old_application_id: original.id,
            new_application_id: record.id,
            timestamp: Utc::now(),
        });
        self.emit_committed(&record);

        let template = self.invite_template(&record);
        let webhook = self.webhook.notify(
            event_names::RESENT,
            &json!({
                "application_id": record.id.to_string(),
                "previous_application_id": original.id.to_string(),
                "status": record.status.as_str(),
                "invite_link": self.config.invite_link(record.id),
                "resent_by": actor,
            }),
        );
        let recipients: Vec<String> = record.merchant_email.iter().cloned().collect();
        let (crm_mirror, emails) = tokio::join!(
            self.mirror.sync(record.id, SyncAction::InviteSent, &record.fields),
            self.notifications.send(&recipients, &template),
        );

        let satellites = SatelliteReport {
            crm_mirror: Some(crm_mirror),
            webhook: Some(webhook),
            emails,
            document_cleanup: None,
        };
        self.report_satellite_failures(record.id, &satellites);

        Ok(ResendResponse {
            success: true,
            previous_application_id: original.id,
            partial_failure: satellites.has_failures(),
            application: record,
            satellites,
        })
    }

    // ========================================================================
    // Reads and on-demand mirror sync
    // ========================================================================

    pub async fn get(&self, application_id: Uuid) -> Result<ApplicationDetail> {
        let application = db::require_application(&self.pool, application_id).await?;
        let uploads = db::list_uploads(&self.pool, application_id).await?;
        Ok(ApplicationDetail {
            application,
            uploads,
        })
    }

    pub async fn list(&self, filter: &ApplicationFilter) -> Result<Vec<ApplicationRecord>> {
        db::list_applications(&self.pool, filter).await
    }

    /// Reconcile the mirror for one application
    ///
    /// Uses `fields` when given, otherwise the stored record's fields.
    pub async fn sync_mirror(
        &self,
        application_id: Uuid,
        action: SyncAction,
        fields: Option<ApplicationFields>,
    ) -> Result<MirrorSyncOutcome> {
        let fields = match fields {
            Some(fields) => fields,
            None => db::require_application(&self.pool, application_id).await?.fields,
        };

        let outcome = self.mirror.sync(application_id, action, &fields).await;
        if let MirrorSyncOutcome::Failed { error } = &outcome {
            self.emit_satellite_failure(application_id, "crm_mirror", error);
        }
        Ok(outcome)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn invite_template(&self, record: &ApplicationRecord) -> EmailTemplate {
        EmailTemplate::MerchantInvite {
            business_name: record.fields.display_name().map(str::to_string),
            agent_email: record.agent_email.clone(),
            link: self.config.invite_link(record.id),
        }
    }

    fn lifecycle_response(
        &self,
        application: ApplicationRecord,
        changed: bool,
        satellites: SatelliteReport,
    ) -> LifecycleResponse {
        self.report_satellite_failures(application.id, &satellites);
        LifecycleResponse {
            success: true,
            partial_failure: satellites.has_failures(),
            application,
            changed,
            satellites,
        }
    }

    fn emit_committed(&self, record: &ApplicationRecord) {
        self.events.emit_lossy(PipelineEvent::ApplicationCommitted {
            application_id: record.id,
            status: record.status.as_str().to_string(),
            upload_status: record.upload_status.map(|s| s.as_str().to_string()),
            timestamp: Utc::now(),
        });
    }

    fn report_satellite_failures(&self, application_id: Uuid, report: &SatelliteReport) {
        if let Some(MirrorSyncOutcome::Failed { error }) = &report.crm_mirror {
            self.emit_satellite_failure(application_id, "crm_mirror", error);
        }
        if report.webhook == Some(NotifyStatus::Dropped) {
            self.emit_satellite_failure(application_id, "webhook", "event dropped");
        }
        for delivery in report.emails.iter().filter(|d| d.is_failed()) {
            self.emit_satellite_failure(
                application_id,
                "email",
                &format!("{} to {}", delivery.template, delivery.recipient),
            );
        }
        if let Some(cleanup) = &report.document_cleanup {
            for error in &cleanup.errors {
                self.emit_satellite_failure(application_id, "blob_cleanup", error);
            }
        }
    }

    fn emit_satellite_failure(&self, application_id: Uuid, satellite: &str, error: &str) {
        self.events.emit_lossy(PipelineEvent::SatelliteFailed {
            application_id: Some(application_id),
            satellite: satellite.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Mirror action describing a record's current status
pub fn sync_action_for(status: ApplicationStatus) -> SyncAction {
    match status {
        ApplicationStatus::Draft => SyncAction::DraftCreated,
        ApplicationStatus::Invited => SyncAction::InviteSent,
        ApplicationStatus::Opened => SyncAction::InviteOpened,
        ApplicationStatus::Submitted => SyncAction::ApplicationSubmitted,
        ApplicationStatus::Resent => SyncAction::ApplicationResent,
        ApplicationStatus::Approved => SyncAction::ApplicationApproved,
        ApplicationStatus::Rejected => SyncAction::ApplicationRejected,
        ApplicationStatus::OnHold => SyncAction::ApplicationOnHold,
    }
}
