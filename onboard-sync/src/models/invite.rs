//! Batch invite results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One address that could not be invited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteFailure {
    pub email: String,
    pub error: String,
}

/// Counts over one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteTotals {
    /// Valid, unique addresses after normalization
    pub requested: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of one batch invite dispatch (ephemeral)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchInviteResult {
    pub successful: Vec<String>,
    pub failed: Vec<InviteFailure>,
    /// Already invited; never contacted
    pub skipped: Vec<String>,
    pub totals: InviteTotals,
    /// Record created for each address, including ones whose send failed
    pub application_ids: BTreeMap<String, Uuid>,
}

impl BatchInviteResult {
    /// Recompute `totals` from the lists
    pub fn finalize(mut self, requested: usize) -> Self {
        self.totals = InviteTotals {
            requested,
            successful: self.successful.len(),
            failed: self.failed.len(),
            skipped: self.skipped.len(),
        };
        self
    }
}
