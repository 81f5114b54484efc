//! Data models for onboard-sync
//!
//! - `ApplicationRecord` and its status state machine
//! - `ApplicationFields`, the canonical typed field set (ingress boundary)
//! - Upload payloads, outcomes and child rows
//! - Batch invite results and mirror sync actions

pub mod application;
pub mod fields;
pub mod invite;
pub mod sync_action;
pub mod upload;

pub use application::{ApplicationRecord, ApplicationStatus, UploadStatus};
pub use fields::{ApplicationFields, Principal, Terminal};
pub use invite::{BatchInviteResult, InviteFailure, InviteTotals};
pub use sync_action::SyncAction;
pub use upload::{
    FailedUpload, FilePayload, UploadOutcome, UploadOutcomeStatus, UploadRecord, UploadSummary,
};
