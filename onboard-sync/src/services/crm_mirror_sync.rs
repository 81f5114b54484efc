//! CRM mirror reconciliation
//!
//! Brings the mirror record of one application in line with its current state:
//! 1. search the mirror by the embedded application id (one round trip)
//! 2. on submission, delete what was found (no record is a successful no-op)
//! 3. otherwise PATCH the found record or POST a new one
//!
//! Syncs for the same application are serialized in-process so concurrent
//! calls cannot both miss on search and both create. Should duplicates exist
//! anyway (created elsewhere), the first is updated and the rest deleted.
//!
//! `sync` never returns an error; failures are logged and reported in the
//! outcome.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::crm_client::{CrmError, CrmMirrorApi};
use super::crm_mapping::map_to_mirror_fields;
use crate::models::{ApplicationFields, SyncAction};

/// Result of one mirror sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MirrorSyncOutcome {
    Created { record_id: String },
    Updated { record_id: String, duplicates_removed: usize },
    Deleted { removed: usize },
    /// Submission with no mirror record to retire
    NoOp,
    /// Mirror not configured
    Skipped,
    Failed { error: String },
}

impl MirrorSyncOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, MirrorSyncOutcome::Failed { .. })
    }
}

pub struct CrmMirrorSync {
    api: Option<Arc<dyn CrmMirrorApi>>,
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl CrmMirrorSync {
    pub fn new(api: Arc<dyn CrmMirrorApi>) -> Self {
        Self {
            api: Some(api),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sync that reports `Skipped` for every call
    pub fn disabled() -> Self {
        Self {
            api: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api.is_some()
    }

    pub async fn sync(
        &self,
        application_id: Uuid,
        action: SyncAction,
        fields: &ApplicationFields,
    ) -> MirrorSyncOutcome {
        let Some(api) = &self.api else {
            tracing::debug!(application_id = %application_id, "CRM mirror disabled, sync skipped");
            return MirrorSyncOutcome::Skipped;
        };

        let outcome = {
            let entry = self.lock_for(application_id);
            let _guard = entry.lock.lock().await;
            reconcile(api.as_ref(), application_id, action, fields).await
        };

        match outcome {
            Ok(result) => {
                tracing::info!(
                    application_id = %application_id,
                    action = %action,
                    result = ?result,
                    "CRM mirror synced"
                );
                result
            }
            Err(e) => {
                tracing::warn!(
                    application_id = %application_id,
                    action = %action,
                    error = %e,
                    "CRM mirror sync failed"
                );
                MirrorSyncOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn lock_for(&self, application_id: Uuid) -> LockEntry<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        let lock = locks.entry(application_id).or_default().clone();
        LockEntry {
            locks: &self.locks,
            application_id,
            lock,
        }
    }
}

/// Per-application lock handle; drops the map entry once no one else holds it
struct LockEntry<'a> {
    locks: &'a Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    application_id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map and this handle still hold it
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.application_id);
        }
    }
}

async fn reconcile(
    api: &dyn CrmMirrorApi,
    application_id: Uuid,
    action: SyncAction,
    fields: &ApplicationFields,
) -> Result<MirrorSyncOutcome, CrmError> {
    let id = application_id.to_string();
    let found = api.search_by_application_id(&id).await?;

    if action.retires_mirror() {
        if found.is_empty() {
            return Ok(MirrorSyncOutcome::NoOp);
        }
        for record in &found {
            api.delete(&record.id).await?;
        }
        return Ok(MirrorSyncOutcome::Deleted {
            removed: found.len(),
        });
    }

    let mirror_fields = map_to_mirror_fields(application_id, action, fields);

    match found.split_first() {
        Some((primary, extras)) => {
            api.update(&primary.id, &mirror_fields).await?;
            for extra in extras {
                tracing::warn!(
                    application_id = %application_id,
                    record_id = %extra.id,
                    "Removing duplicate CRM mirror record"
                );
                api.delete(&extra.id).await?;
            }
            Ok(MirrorSyncOutcome::Updated {
                record_id: primary.id.clone(),
                duplicates_removed: extras.len(),
            })
        }
        None => {
            let created = api.create(&mirror_fields).await?;
            Ok(MirrorSyncOutcome::Created {
                record_id: created.id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::crm_client::MirrorRecord;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::time::Duration;

    struct StalledCrm;

    #[async_trait]
    impl CrmMirrorApi for StalledCrm {
        async fn search_by_application_id(&self, _: &str) -> Result<Vec<MirrorRecord>, CrmError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn create(&self, _: &Map<String, Value>) -> Result<MirrorRecord, CrmError> {
            Ok(MirrorRecord {
                id: "rec1".to_string(),
                fields: Map::new(),
            })
        }

        async fn update(&self, _: &str, _: &Map<String, Value>) -> Result<(), CrmError> {
            Ok(())
        }

        async fn delete(&self, _: &str) -> Result<(), CrmError> {
            Ok(())
        }
    }

    fn lock_count(sync: &CrmMirrorSync) -> usize {
        sync.locks.lock().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_sync_releases_lock_entry() {
        let sync = CrmMirrorSync::new(Arc::new(StalledCrm));
        let fields = ApplicationFields::default();

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            sync.sync(Uuid::new_v4(), SyncAction::DraftCreated, &fields),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(lock_count(&sync), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_entry_kept_while_another_sync_waits() {
        let sync = CrmMirrorSync::new(Arc::new(StalledCrm));
        let id = Uuid::new_v4();

        let first = sync.lock_for(id);
        let second = sync.lock_for(id);
        drop(first);
        assert_eq!(lock_count(&sync), 1);

        drop(second);
        assert_eq!(lock_count(&sync), 0);
    }
}
