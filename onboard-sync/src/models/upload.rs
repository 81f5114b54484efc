//! Document upload payloads, per-file outcomes and stored child rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::application::UploadStatus;

/// One named file received with a submission
#[derive(Clone)]
pub struct FilePayload {
    /// Business document type, e.g. "voided_check"; one file per type
    pub document_type: String,
    /// Original client file name
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FilePayload {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("document_type", &self.document_type)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// Per-file result status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcomeStatus {
    Succeeded,
    SkippedTooLarge,
    Failed,
}

/// Per-file upload outcome (ephemeral)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub document_type: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub status: UploadOutcomeStatus,
    /// Publicly resolvable URL when succeeded
    pub url: Option<String>,
    pub error: Option<String>,
    /// Upload attempts made (0 when skipped)
    pub attempts: u32,
}

/// A file that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUpload {
    pub document_type: String,
    pub file_name: String,
    pub error: String,
}

/// Aggregated upload results for one submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Number of files stored
    pub successful: usize,
    /// document_type → public URL, for succeeded files
    pub urls: BTreeMap<String, String>,
    /// In processing order
    pub failed: Vec<FailedUpload>,
    /// Document types skipped for exceeding the size ceiling, in processing order
    pub skipped: Vec<String>,
    #[serde(skip)]
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadSummary {
    /// Build the summary from per-file outcomes, preserving their order
    pub fn from_outcomes(outcomes: Vec<UploadOutcome>) -> Self {
        let mut summary = Self::default();

        for outcome in &outcomes {
            match outcome.status {
                UploadOutcomeStatus::Succeeded => {
                    summary.successful += 1;
                    if let Some(url) = &outcome.url {
                        summary.urls.insert(outcome.document_type.clone(), url.clone());
                    }
                }
                UploadOutcomeStatus::SkippedTooLarge => {
                    summary.skipped.push(outcome.document_type.clone());
                }
                UploadOutcomeStatus::Failed => summary.failed.push(FailedUpload {
                    document_type: outcome.document_type.clone(),
                    file_name: outcome.file_name.clone(),
                    error: outcome.error.clone().unwrap_or_else(|| "upload failed".to_string()),
                }),
            }
        }

        summary.outcomes = outcomes;
        summary
    }

    /// `partial` if anything failed or was skipped, else `complete`
    pub fn upload_status(&self) -> UploadStatus {
        if self.failed.is_empty() && self.skipped.is_empty() {
            UploadStatus::Complete
        } else {
            UploadStatus::Partial
        }
    }

    /// Child rows for the succeeded files
    pub fn to_upload_records(&self, application_id: Uuid) -> Vec<UploadRecord> {
        let now = Utc::now();
        self.outcomes
            .iter()
            .filter(|o| o.status == UploadOutcomeStatus::Succeeded)
            .filter_map(|o| {
                o.url.as_ref().map(|url| UploadRecord {
                    id: Uuid::new_v4(),
                    application_id,
                    document_type: o.document_type.clone(),
                    file_name: o.file_name.clone(),
                    content_type: o.content_type.clone(),
                    size_bytes: o.size_bytes as i64,
                    url: url.clone(),
                    uploaded_at: now,
                })
            })
            .collect()
    }
}

/// Stored child row, keyed by (application_id, document_type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: Uuid,
    pub application_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(doc: &str, status: UploadOutcomeStatus) -> UploadOutcome {
        UploadOutcome {
            document_type: doc.to_string(),
            file_name: format!("{}.pdf", doc),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 10,
            status,
            url: (status == UploadOutcomeStatus::Succeeded).then(|| format!("https://cdn/{}", doc)),
            error: (status == UploadOutcomeStatus::Failed).then(|| "boom".to_string()),
            attempts: 1,
        }
    }

    #[test]
    fn test_summary_complete() {
        let summary = UploadSummary::from_outcomes(vec![
            outcome("voided_check", UploadOutcomeStatus::Succeeded),
            outcome("drivers_license", UploadOutcomeStatus::Succeeded),
        ]);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.upload_status(), UploadStatus::Complete);
        assert_eq!(summary.urls["voided_check"], "https://cdn/voided_check");
    }

    #[test]
    fn test_summary_partial_and_ordered() {
        let summary = UploadSummary::from_outcomes(vec![
            outcome("a", UploadOutcomeStatus::SkippedTooLarge),
            outcome("b", UploadOutcomeStatus::Failed),
            outcome("c", UploadOutcomeStatus::SkippedTooLarge),
            outcome("d", UploadOutcomeStatus::Succeeded),
        ]);
        assert_eq!(summary.skipped, vec!["a", "c"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].error, "boom");
        assert_eq!(summary.upload_status(), UploadStatus::Partial);

        let records = summary.to_upload_records(Uuid::new_v4());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_type, "d");
    }

    #[test]
    fn test_empty_summary_is_complete() {
        assert_eq!(UploadSummary::default().upload_status(), UploadStatus::Complete);
    }
}
