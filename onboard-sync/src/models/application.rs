//! Application record and status state machine
//!
//! Status path: DRAFT → INVITED → OPENED → SUBMITTED, with RESENT as a side
//! branch (the old record is retired, a new one carries on) and the
//! administrative outcomes APPROVED / REJECTED / ON_HOLD after submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::fields::ApplicationFields;

/// Application lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Invited,
    Opened,
    Submitted,
    Resent,
    Approved,
    Rejected,
    OnHold,
}

impl ApplicationStatus {
    /// Storage / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Invited => "invited",
            ApplicationStatus::Opened => "opened",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Resent => "resent",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::OnHold => "on_hold",
        }
    }

    /// Whether a record in `self` may move to `next`
    ///
    /// Re-entering the current status is allowed on the main path (re-saving a
    /// draft, resubmitting). Resent, approved and rejected records are final.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        match (self, next) {
            (Draft, Draft | Invited | Opened | Submitted) => true,
            (Invited, Invited | Opened | Submitted | Resent) => true,
            (Opened, Opened | Submitted | Resent) => true,
            (Submitted, Submitted | Resent | Approved | Rejected | OnHold) => true,
            (OnHold, OnHold | Approved | Rejected) => true,
            _ => false,
        }
    }

    /// Statuses a resend may start from
    pub fn is_resendable(&self) -> bool {
        self.can_transition_to(ApplicationStatus::Resent)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(ApplicationStatus::Draft),
            "invited" => Ok(ApplicationStatus::Invited),
            "opened" => Ok(ApplicationStatus::Opened),
            "submitted" => Ok(ApplicationStatus::Submitted),
            "resent" => Ok(ApplicationStatus::Resent),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            "on_hold" | "on-hold" | "onhold" => Ok(ApplicationStatus::OnHold),
            other => Err(format!("Unknown application status: {}", other)),
        }
    }
}

/// Derived document completeness of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Complete,
    Partial,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Complete => "complete",
            UploadStatus::Partial => "partial",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(UploadStatus::Complete),
            "partial" => Ok(UploadStatus::Partial),
            other => Err(format!("Unknown upload status: {}", other)),
        }
    }
}

/// The canonical application entity (system of record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Assigned at first creation, never reassigned
    pub id: Uuid,
    pub status: ApplicationStatus,
    pub agent_email: Option<String>,
    pub merchant_email: Option<String>,
    pub upload_status: Option<UploadStatus>,
    /// Record this one was resent from
    pub parent_application_id: Option<Uuid>,
    pub fields: ApplicationFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ApplicationRecord {
    /// New record with a fresh id
    pub fn new(status: ApplicationStatus, fields: ApplicationFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status,
            agent_email: fields.agent_email.clone(),
            merchant_email: fields.merchant_email.clone(),
            upload_status: None,
            parent_application_id: None,
            fields,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        }
    }

    /// Copy for a resend: new id, INVITED, linked to `self`, no upload state
    pub fn resend_copy(&self) -> Self {
        let mut copy = Self::new(ApplicationStatus::Invited, self.fields.clone());
        copy.agent_email = self.agent_email.clone();
        copy.merchant_email = self.merchant_email.clone();
        copy.parent_application_id = Some(self.id);
        copy
    }
}
