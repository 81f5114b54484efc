//! Upload coordinator
//!
//! Uploads a submission's documents one at a time:
//! - files above the size ceiling are skipped without touching the store
//! - each upload gets a bounded number of attempts with linear backoff
//! - a fixed pause separates consecutive uploads (not retries) to stay under
//!   the storage provider's rate limits
//!
//! Files are processed sequentially on purpose; the pacing only holds if they
//! are.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::blob_store::BlobStore;
use crate::config::PipelineConfig;
use crate::models::{FilePayload, UploadOutcome, UploadOutcomeStatus, UploadSummary};
use crate::utils::object_path::document_object_path;
use crate::utils::{retry_linear, RetryPolicy};

pub struct UploadCoordinator {
    store: Arc<dyn BlobStore>,
    max_bytes: u64,
    retry: RetryPolicy,
    pacing: Duration,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        max_bytes: u64,
        retry: RetryPolicy,
        pacing: Duration,
    ) -> Self {
        Self {
            store,
            max_bytes,
            retry,
            pacing,
        }
    }

    pub fn from_config(store: Arc<dyn BlobStore>, config: &PipelineConfig) -> Self {
        Self::new(
            store,
            config.max_upload_bytes,
            RetryPolicy::new(
                config.upload_attempts,
                Duration::from_millis(config.retry_backoff_ms),
            ),
            Duration::from_millis(config.file_pacing_ms),
        )
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Upload every file in order and summarize the outcomes
    ///
    /// `actor` namespaces the object paths. Never fails: exhausted retries
    /// become `failed` entries.
    pub async fn upload_all(&self, actor: &str, files: Vec<FilePayload>) -> UploadSummary {
        let mut outcomes = Vec::with_capacity(files.len());
        let mut uploaded_any = false;

        for file in files {
            if file.size_bytes() > self.max_bytes {
                tracing::warn!(
                    document_type = %file.document_type,
                    size_bytes = file.size_bytes(),
                    max_bytes = self.max_bytes,
                    "File exceeds upload ceiling, skipped"
                );
                outcomes.push(outcome(&file, UploadOutcomeStatus::SkippedTooLarge, None, None, 0));
                continue;
            }

            if uploaded_any && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            uploaded_any = true;

            outcomes.push(self.upload_one(actor, &file).await);
        }

        let summary = UploadSummary::from_outcomes(outcomes);
        tracing::info!(
            successful = summary.successful,
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Document uploads processed"
        );
        summary
    }

    async fn upload_one(&self, actor: &str, file: &FilePayload) -> UploadOutcome {
        let path = document_object_path(actor, &file.document_type, &file.file_name, Utc::now());

        let result = retry_linear("document upload", &self.retry, |_attempt| async {
            self.store
                .put(&path, &file.bytes, file.content_type.as_deref())
                .await?;
            self.store.public_url(&path).await
        })
        .await;

        match result {
            Ok((url, attempts)) => {
                tracing::debug!(
                    document_type = %file.document_type,
                    path = %path,
                    attempts,
                    "Document uploaded"
                );
                outcome(file, UploadOutcomeStatus::Succeeded, Some(url), None, attempts)
            }
            Err(exhausted) => {
                let message = exhausted.last_error.to_string();
                tracing::error!(
                    document_type = %file.document_type,
                    attempts = exhausted.attempts,
                    error = %message,
                    "Document upload failed"
                );
                outcome(
                    file,
                    UploadOutcomeStatus::Failed,
                    None,
                    Some(message),
                    exhausted.attempts,
                )
            }
        }
    }
}

fn outcome(
    file: &FilePayload,
    status: UploadOutcomeStatus,
    url: Option<String>,
    error: Option<String>,
    attempts: u32,
) -> UploadOutcome {
    UploadOutcome {
        document_type: file.document_type.clone(),
        file_name: file.file_name.clone(),
        content_type: file.content_type.clone(),
        size_bytes: file.size_bytes(),
        status,
        url,
        error,
        attempts,
    }
}
