//! CRM mirror reconciliation tests

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use helpers::{complete_fields, MockCrm};
use onboard_sync::models::SyncAction;
use onboard_sync::services::{CrmMirrorSync, MirrorSyncOutcome};
use uuid::Uuid;

fn mirror() -> (Arc<MockCrm>, CrmMirrorSync) {
    let crm = Arc::new(MockCrm::default());
    let sync = CrmMirrorSync::new(crm.clone());
    (crm, sync)
}

#[tokio::test]
async fn test_concurrent_syncs_never_duplicate() {
    let (crm, sync) = mirror();
    let id = Uuid::new_v4();
    let fields = complete_fields("owner@acme.test");

    let outcomes = join_all((0..8).map(|_| sync.sync(id, SyncAction::InviteSent, &fields))).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(crm.records_for(&id.to_string()).len(), 1);
    assert_eq!(crm.creates.load(Ordering::SeqCst), 1);
    assert_eq!(crm.updates.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_concurrent_syncs_across_tasks() {
    let (crm, sync) = mirror();
    let sync = Arc::new(sync);
    let id = Uuid::new_v4();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move {
                sync.sync(id, SyncAction::DraftCreated, &complete_fields("owner@acme.test"))
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(crm.records_for(&id.to_string()).len(), 1);
}

#[tokio::test]
async fn test_existing_duplicates_pruned_on_update() {
    let (crm, sync) = mirror();
    let id = Uuid::new_v4();
    let keep = crm.seed(&id.to_string());
    crm.seed(&id.to_string());

    let outcome = sync
        .sync(id, SyncAction::InviteOpened, &complete_fields("owner@acme.test"))
        .await;

    match outcome {
        MirrorSyncOutcome::Updated {
            record_id,
            duplicates_removed,
        } => {
            assert_eq!(record_id, keep);
            assert_eq!(duplicates_removed, 1);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    let remaining = crm.records_for(&id.to_string());
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].fields["Legal Name"], "Acme Widgets LLC");
}

#[tokio::test]
async fn test_submitted_without_record_writes_nothing() {
    let (crm, sync) = mirror();

    let outcome = sync
        .sync(
            Uuid::new_v4(),
            SyncAction::ApplicationSubmitted,
            &complete_fields("owner@acme.test"),
        )
        .await;

    assert!(matches!(outcome, MirrorSyncOutcome::NoOp));
    assert!(outcome.is_ok());
    assert_eq!(crm.searches.load(Ordering::SeqCst), 1);
    assert_eq!(crm.writes(), 0);
}

#[tokio::test]
async fn test_submitted_deletes_every_match() {
    let (crm, sync) = mirror();
    let id = Uuid::new_v4();
    crm.seed(&id.to_string());
    crm.seed(&id.to_string());
    let other = Uuid::new_v4();
    crm.seed(&other.to_string());

    let outcome = sync
        .sync(id, SyncAction::ApplicationSubmitted, &complete_fields("owner@acme.test"))
        .await;

    assert!(matches!(outcome, MirrorSyncOutcome::Deleted { removed: 2 }));
    assert!(crm.records_for(&id.to_string()).is_empty());
    assert_eq!(crm.records_for(&other.to_string()).len(), 1);
}

#[tokio::test]
async fn test_failure_is_reported_not_raised() {
    let (crm, sync) = mirror();
    crm.fail.store(true, Ordering::SeqCst);

    let outcome = sync
        .sync(Uuid::new_v4(), SyncAction::InviteSent, &complete_fields("owner@acme.test"))
        .await;

    assert!(matches!(outcome, MirrorSyncOutcome::Failed { .. }));
    assert!(!outcome.is_ok());
}

#[tokio::test]
async fn test_disabled_mirror_skips() {
    let sync = CrmMirrorSync::disabled();
    assert!(!sync.is_enabled());

    let outcome = sync
        .sync(Uuid::new_v4(), SyncAction::InviteSent, &complete_fields("owner@acme.test"))
        .await;
    assert!(matches!(outcome, MirrorSyncOutcome::Skipped));
}
