//! Integration tests for `PgStore` against a real database.
//!
//! Exercises the store seams directly:
//! - Nested-interval numbering on insert and compaction on subtree removal
//! - Concurrent roots never share a tree
//! - Status updates with optional comment and moderation stamp
//! - Version uniqueness per revision and record
//! - Reference checks on record saves and reverse lookups
//! - Latest-approved ordering and the deleted / pending listings
//! - Rolled-back transactions leave nothing behind

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use revflow_core::error::CoreError;
use revflow_core::models::{NewRevision, NewVersion, Revision, StatusUpdate};
use revflow_core::registry::{RecordTypeSpec, Registry};
use revflow_core::snapshot::{self, Record, SnapshotFormat};
use revflow_core::status::{ModerationStatus, OpKind};
use revflow_core::store::{RecordStore, RevisionStore};
use revflow_core::tree::validate_forest;
use revflow_core::types::{DbId, RecordKey};
use revflow_db::store::PgStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry() -> Arc<Registry> {
    let registry = Registry::builder()
        .register(RecordTypeSpec::new("airplane").follow_reverse("wing", "airplane"))
        .and_then(|b| b.register(RecordTypeSpec::new("wing").reference("airplane", "airplane")))
        .and_then(|b| b.build())
        .unwrap();
    Arc::new(registry)
}

fn new_revision(parent_id: Option<DbId>, status: ModerationStatus) -> NewRevision {
    NewRevision {
        parent_id,
        created_at: Utc::now(),
        created_by: Some(1),
        moderated_at: None,
        moderated_by: None,
        comment: String::new(),
        status,
        deleted: false,
    }
}

fn new_version(revision_id: DbId, record: &Record) -> NewVersion {
    let encoded = snapshot::encode(record, SnapshotFormat::Json).unwrap();
    NewVersion {
        revision_id,
        record_type: record.record_type.clone(),
        record_id: record.record_id.clone(),
        record_id_int: snapshot::shadow_int_id(&record.record_id),
        format: encoded.format,
        serialized_data: encoded.data,
        object_repr: snapshot::record_repr(record),
        op_kind: OpKind::Change,
    }
}

fn airplane(id: &str, title: &str) -> Record {
    Record::new("airplane", id).with_field("title", title)
}

fn wing(id: &str, airplane_id: &str) -> Record {
    Record::new("wing", id).with_field("airplane", airplane_id)
}

/// root -> (a -> a1), b, committed.
async fn sample_tree(pool: &PgPool) -> [Revision; 4] {
    let mut store = PgStore::begin(pool, registry()).await.unwrap();
    let root = store
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();
    let a = store
        .insert_revision(new_revision(Some(root.id), ModerationStatus::Draft))
        .await
        .unwrap();
    let b = store
        .insert_revision(new_revision(Some(root.id), ModerationStatus::Draft))
        .await
        .unwrap();
    let a1 = store
        .insert_revision(new_revision(Some(a.id), ModerationStatus::NeedAttention))
        .await
        .unwrap();
    store.commit().await.unwrap();
    [root, a, b, a1]
}

// ---------------------------------------------------------------------------
// Test: tree numbering
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_inserts_keep_preorder_numbering(pool: PgPool) {
    let [root, a, b, a1] = sample_tree(&pool).await;
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();

    let all = store.all_revisions().await.unwrap();
    assert_eq!(all.len(), 4);
    validate_forest(&all).unwrap();

    let pos = |id: DbId| all.iter().find(|r| r.id == id).unwrap().position;
    assert_eq!((pos(root.id).lft, pos(root.id).rght), (1, 8));
    assert_eq!((pos(a.id).lft, pos(a.id).rght), (2, 5));
    assert_eq!((pos(a1.id).lft, pos(a1.id).rght), (3, 4));
    assert_eq!((pos(b.id).lft, pos(b.id).rght), (6, 7));
    assert_eq!(pos(a1.id).level, 2);

    assert_eq!(store.child_count(root.id).await.unwrap(), 2);
    assert_eq!(store.child_ids(root.id).await.unwrap(), vec![a.id, b.id]);
    let siblings = store.siblings(a.id).await.unwrap();
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].id, b.id);
    assert!(store.siblings(root.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_each_root_opens_a_new_tree(pool: PgPool) {
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    let first = store
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();
    let second = store
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();

    assert_eq!(first.position.tree_id + 1, second.position.tree_id);
    assert_eq!((second.position.lft, second.position.rght), (1, 2));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_roots_get_distinct_trees(pool: PgPool) {
    // Both transactions are open before either commits.
    let mut first = PgStore::begin(&pool, registry()).await.unwrap();
    let mut second = PgStore::begin(&pool, registry()).await.unwrap();
    let a = first
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();
    let b = second
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();
    first.commit().await.unwrap();
    second.commit().await.unwrap();

    assert_ne!(a.position.tree_id, b.position.tree_id);
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    let all = store.all_revisions().await.unwrap();
    assert_eq!(all.len(), 2);
    validate_forest(&all).unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn test_unknown_parent_is_not_found(pool: PgPool) {
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    let err = store
        .insert_revision(new_revision(Some(9999), ModerationStatus::Draft))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { id: 9999, .. });
}

#[sqlx::test(migrations = "./migrations")]
async fn test_delete_subtree_compacts_intervals(pool: PgPool) {
    let [root, a, b, a1] = sample_tree(&pool).await;
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    store
        .insert_version(new_version(a1.id, &airplane("10", "Mriya")))
        .await
        .unwrap();

    let mut removed = store.delete_subtree(a.id).await.unwrap();
    removed.sort_unstable();
    assert_eq!(removed, vec![a.id, a1.id]);

    let all = store.all_revisions().await.unwrap();
    validate_forest(&all).unwrap();
    let root_now = store.find_revision(root.id).await.unwrap().unwrap();
    let b_now = store.find_revision(b.id).await.unwrap().unwrap();
    assert_eq!(root_now.position.rght, 4);
    assert_eq!(b_now.position.lft, 2);

    // Versions cascade with their revisions.
    assert!(store.versions_of(a1.id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Test: status updates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_update_status_keeps_comment_unless_replaced(pool: PgPool) {
    let [_, a, _, _] = sample_tree(&pool).await;
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();

    let pending = store
        .update_status(
            a.id,
            StatusUpdate {
                status: ModerationStatus::NeedAttention,
                comment: None,
                moderation: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.status, ModerationStatus::NeedAttention);
    assert_eq!(pending.comment, "");
    assert!(pending.moderated_at.is_none());

    let now = Utc::now();
    let rejected = store
        .update_status(
            a.id,
            StatusUpdate {
                status: ModerationStatus::Rejected,
                comment: Some("Needs sources.".to_string()),
                moderation: Some((7, now)),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, ModerationStatus::Rejected);
    assert_eq!(rejected.comment, "Needs sources.");
    assert_eq!(rejected.moderated_by, Some(7));
    assert!(rejected.moderated_at.is_some());

    assert_matches!(
        store
            .update_status(
                9999,
                StatusUpdate {
                    status: ModerationStatus::Draft,
                    comment: None,
                    moderation: None,
                },
            )
            .await,
        Err(CoreError::NotFound { id: 9999, .. })
    );
}

// ---------------------------------------------------------------------------
// Test: versions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_version_in_revision_is_conflict(pool: PgPool) {
    let [root, ..] = sample_tree(&pool).await;
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();

    let version = store
        .insert_version(new_version(root.id, &airplane("10", "Mriya")))
        .await
        .unwrap();
    assert_eq!(version.record_id_int, Some(10));
    assert_eq!(version.op_kind, OpKind::Change);

    let err = store
        .insert_version(new_version(root.id, &airplane("10", "Mriya")))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::Conflict(_));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_latest_approved_orders_by_moderation_time(pool: PgPool) {
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    let now = Utc::now();

    let mut older = new_revision(None, ModerationStatus::Approved);
    older.moderated_at = Some(now - Duration::minutes(5));
    let older = store.insert_revision(older).await.unwrap();

    let mut newer = new_revision(Some(older.id), ModerationStatus::Approved);
    newer.moderated_at = Some(now);
    let newer = store.insert_revision(newer).await.unwrap();

    let mut tied = new_revision(Some(older.id), ModerationStatus::Approved);
    tied.moderated_at = Some(now);
    let tied = store.insert_revision(tied).await.unwrap();

    let draft = store
        .insert_revision(new_revision(Some(tied.id), ModerationStatus::Draft))
        .await
        .unwrap();

    for revision in [&older, &newer, &tied, &draft] {
        store
            .insert_version(new_version(revision.id, &airplane("10", "Mriya")))
            .await
            .unwrap();
    }

    let latest = store
        .latest_approved(&RecordKey::new("airplane", "10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.revision_id, tied.id);
    assert!(store
        .latest_approved(&RecordKey::new("airplane", "11"))
        .await
        .unwrap()
        .is_none());

    let history = store
        .record_versions(&RecordKey::new("airplane", "10"))
        .await
        .unwrap();
    let order: Vec<DbId> = history.iter().map(|(_, r)| r.id).collect();
    assert_eq!(order, vec![older.id, newer.id, tied.id, draft.id]);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_deleted_and_pending_listings(pool: PgPool) {
    let [root, a, _, a1] = sample_tree(&pool).await;
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();

    let mut deleted = new_revision(Some(root.id), ModerationStatus::Approved);
    deleted.deleted = true;
    let deleted = store.insert_revision(deleted).await.unwrap();
    store
        .insert_version(new_version(deleted.id, &airplane("10", "Mriya")))
        .await
        .unwrap();
    store
        .insert_version(new_version(a1.id, &airplane("10", "Pending")))
        .await
        .unwrap();
    store
        .insert_version(new_version(a.id, &airplane("10", "Draft")))
        .await
        .unwrap();

    let recoverable = store.deleted_versions("airplane").await.unwrap();
    assert_eq!(recoverable.len(), 1);
    assert_eq!(recoverable[0].revision_id, deleted.id);
    assert!(store.deleted_versions("wing").await.unwrap().is_empty());

    // Once recovered (has a child) it leaves the list.
    store
        .insert_revision(new_revision(Some(deleted.id), ModerationStatus::Approved))
        .await
        .unwrap();
    assert!(store.deleted_versions("airplane").await.unwrap().is_empty());

    let pending = store.pending_versions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].revision_id, a1.id);
}

// ---------------------------------------------------------------------------
// Test: records
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_record_save_checks_references(pool: PgPool) {
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();

    let err = store.save(&wing("100", "10")).await.unwrap_err();
    assert_matches!(err, CoreError::Integrity(_));

    let err = store
        .save(&Record::new("hangar", "1"))
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::RecordNotFound { .. });

    // Refused saves leave the transaction usable.
    store.save(&airplane("10", "Mriya")).await.unwrap();
    store.save(&wing("100", "10")).await.unwrap();
    store.save(&wing("101", "10")).await.unwrap();

    let fetched = store
        .fetch(&RecordKey::new("airplane", "10"))
        .await
        .unwrap()
        .unwrap();
    assert!(fetched.same_content(&airplane("10", "Mriya")));

    let wings = store.find_referencing("wing", "airplane", "10").await.unwrap();
    let ids: Vec<&str> = wings.iter().map(|w| w.record_id.as_str()).collect();
    assert_eq!(ids, vec!["100", "101"]);

    // Upsert replaces content.
    store.save(&airplane("10", "An-225")).await.unwrap();
    let fetched = store
        .fetch(&RecordKey::new("airplane", "10"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.fields["title"], "An-225");

    assert!(store.delete(&RecordKey::new("wing", "101")).await.unwrap());
    assert!(!store.delete(&RecordKey::new("wing", "101")).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_rollback_discards_everything(pool: PgPool) {
    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    store.save(&airplane("10", "Mriya")).await.unwrap();
    let root = store
        .insert_revision(new_revision(None, ModerationStatus::Approved))
        .await
        .unwrap();
    store.rollback().await.unwrap();

    let mut store = PgStore::begin(&pool, registry()).await.unwrap();
    assert!(store.find_revision(root.id).await.unwrap().is_none());
    assert!(store
        .fetch(&RecordKey::new("airplane", "10"))
        .await
        .unwrap()
        .is_none());
}
