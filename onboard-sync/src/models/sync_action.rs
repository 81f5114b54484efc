//! Mirror sync actions and their pipeline-stage vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Business event driving a CRM mirror sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    DraftCreated,
    InviteCreated,
    InviteSent,
    InviteOpened,
    ApplicationSubmitted,
    ApplicationResent,
    ApplicationApproved,
    ApplicationRejected,
    ApplicationOnHold,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::DraftCreated => "draft_created",
            SyncAction::InviteCreated => "invite_created",
            SyncAction::InviteSent => "invite_sent",
            SyncAction::InviteOpened => "invite_opened",
            SyncAction::ApplicationSubmitted => "application_submitted",
            SyncAction::ApplicationResent => "application_resent",
            SyncAction::ApplicationApproved => "application_approved",
            SyncAction::ApplicationRejected => "application_rejected",
            SyncAction::ApplicationOnHold => "application_on_hold",
        }
    }

    /// CRM-facing pipeline-stage label
    pub fn pipeline_stage(&self) -> &'static str {
        match self {
            SyncAction::DraftCreated => "Draft",
            SyncAction::InviteCreated => "Pending",
            SyncAction::InviteSent => "Pending Signature",
            SyncAction::InviteOpened => "Opened",
            SyncAction::ApplicationSubmitted => "Underwriting",
            SyncAction::ApplicationResent => "Pending Signature",
            SyncAction::ApplicationApproved => "Approved",
            SyncAction::ApplicationRejected => "Declined",
            SyncAction::ApplicationOnHold => "On Hold",
        }
    }

    /// Submission retires the mirror record instead of writing it
    pub fn retires_mirror(&self) -> bool {
        matches!(self, SyncAction::ApplicationSubmitted)
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft_created" | "draft" => Ok(SyncAction::DraftCreated),
            "invite_created" => Ok(SyncAction::InviteCreated),
            "invite_sent" | "invited" => Ok(SyncAction::InviteSent),
            "invite_opened" | "opened" => Ok(SyncAction::InviteOpened),
            "application_submitted" | "submitted" => Ok(SyncAction::ApplicationSubmitted),
            "application_resent" | "resent" => Ok(SyncAction::ApplicationResent),
            "application_approved" | "approved" => Ok(SyncAction::ApplicationApproved),
            "application_rejected" | "rejected" => Ok(SyncAction::ApplicationRejected),
            "application_on_hold" | "on_hold" => Ok(SyncAction::ApplicationOnHold),
            other => Err(format!("Unknown sync action: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(SyncAction::InviteCreated.pipeline_stage(), "Pending");
        assert_eq!(SyncAction::InviteSent.pipeline_stage(), "Pending Signature");
        assert_eq!(SyncAction::ApplicationSubmitted.pipeline_stage(), "Underwriting");
    }

    #[test]
    fn test_submitted_aliases_retire_mirror() {
        for raw in ["submitted", "application_submitted", " Submitted "] {
            let action: SyncAction = raw.parse().unwrap();
            assert!(action.retires_mirror());
        }
        assert!(!SyncAction::InviteSent.retires_mirror());
        assert!("teleported".parse::<SyncAction>().is_err());
    }
}
