//! Storage seams consumed by the engine.
//!
//! Methods take `&mut self` so a backend can run every call of one operation
//! on a single transaction.

use std::collections::{BTreeSet, VecDeque};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::models::{NewRevision, NewVersion, Revision, StatusUpdate, Version};
use crate::registry::{Follow, Registry};
use crate::snapshot::Record;
use crate::types::{DbId, RecordKey};

/// The live records being versioned.
#[async_trait]
pub trait RecordStore: Send {
    async fn fetch(&mut self, key: &RecordKey) -> Result<Option<Record>, CoreError>;

    /// Insert or replace a record.
    ///
    /// Fails with `Integrity` when a declared reference points at a missing
    /// record and with `RecordNotFound` when the type is not registered.
    async fn save(&mut self, record: &Record) -> Result<(), CoreError>;

    /// Returns whether a record was removed.
    async fn delete(&mut self, key: &RecordKey) -> Result<bool, CoreError>;

    /// Records of `record_type` whose `field` holds `value`.
    async fn find_referencing(
        &mut self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, CoreError>;
}

/// Revisions, versions and the tree index.
#[async_trait]
pub trait RevisionStore: Send {
    /// Insert a revision, numbering it in the tree in the same unit of work.
    async fn insert_revision(&mut self, new: NewRevision) -> Result<Revision, CoreError>;

    async fn find_revision(&mut self, id: DbId) -> Result<Option<Revision>, CoreError>;

    async fn update_status(&mut self, id: DbId, update: StatusUpdate)
        -> Result<Revision, CoreError>;

    /// Fails with `Conflict` when the revision already holds a version of
    /// the same record.
    async fn insert_version(&mut self, new: NewVersion) -> Result<Version, CoreError>;

    async fn find_version(&mut self, id: DbId) -> Result<Option<Version>, CoreError>;

    async fn versions_of(&mut self, revision_id: DbId) -> Result<Vec<Version>, CoreError>;

    /// Version of `key` in the Approved revision with the latest moderation
    /// time, ties broken by the greatest revision id.
    async fn latest_approved(&mut self, key: &RecordKey) -> Result<Option<Version>, CoreError>;

    async fn child_count(&mut self, revision_id: DbId) -> Result<i64, CoreError>;

    /// Direct children in tree order.
    async fn child_ids(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError>;

    /// Other children of the same parent. Empty for roots.
    async fn siblings(&mut self, revision_id: DbId) -> Result<Vec<Revision>, CoreError>;

    /// Versions of `record_type` in deleted revisions that are still leaves.
    async fn deleted_versions(&mut self, record_type: &str) -> Result<Vec<Version>, CoreError>;

    /// Versions in revisions awaiting moderation.
    async fn pending_versions(&mut self) -> Result<Vec<Version>, CoreError>;

    /// Every version of a record with its revision, in tree order.
    async fn record_versions(
        &mut self,
        key: &RecordKey,
    ) -> Result<Vec<(Version, Revision)>, CoreError>;

    /// Remove a revision, its subtree and their versions. Returns removed ids.
    async fn delete_subtree(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError>;

    async fn all_revisions(&mut self) -> Result<Vec<Revision>, CoreError>;
}

/// Everything the engine needs from one backend.
pub trait WorkflowStore: RecordStore + RevisionStore {}

impl<T: RecordStore + RevisionStore> WorkflowStore for T {}

/// `roots` plus every live record reachable through parent links and the
/// registry's follow declarations. Each record appears once, roots first.
pub async fn follow_closure<S>(
    store: &mut S,
    registry: &Registry,
    roots: Vec<Record>,
) -> Result<Vec<Record>, CoreError>
where
    S: RecordStore + ?Sized,
{
    let mut seen: BTreeSet<RecordKey> = BTreeSet::new();
    let mut queue: VecDeque<Record> = roots.into();
    let mut closure = Vec::new();

    while let Some(record) = queue.pop_front() {
        if !seen.insert(record.key()) {
            continue;
        }

        if let Some((parent_type, parent_id)) = registry.parent_key_of(&record) {
            if let Some(parent) = store.fetch(&RecordKey::new(parent_type, parent_id)).await? {
                queue.push_back(parent);
            }
        }

        if let Some(spec) = registry.get(&record.record_type) {
            for follow in &spec.follow {
                match follow {
                    Follow::Field { field } => {
                        let (Some(target), Some(id)) =
                            (spec.reference_target(field), record.reference(field))
                        else {
                            continue;
                        };
                        if let Some(related) = store.fetch(&RecordKey::new(target, id)).await? {
                            queue.push_back(related);
                        }
                    }
                    Follow::Reverse { record_type, field } => {
                        let related = store
                            .find_referencing(record_type, field, &record.record_id)
                            .await?;
                        queue.extend(related);
                    }
                }
            }
        }

        closure.push(record);
    }
    Ok(closure)
}

/// Records that depend on `record` through reverse follows, deepest first.
pub async fn reverse_dependents<S>(
    store: &mut S,
    registry: &Registry,
    record: &Record,
) -> Result<Vec<Record>, CoreError>
where
    S: RecordStore + ?Sized,
{
    let mut seen: BTreeSet<RecordKey> = BTreeSet::from([record.key()]);
    let mut stack = vec![record.clone()];
    let mut found = Vec::new();

    while let Some(current) = stack.pop() {
        let Some(spec) = registry.get(&current.record_type) else {
            continue;
        };
        for follow in &spec.follow {
            if let Follow::Reverse { record_type, field } = follow {
                for related in store
                    .find_referencing(record_type, field, &current.record_id)
                    .await?
                {
                    if seen.insert(related.key()) {
                        stack.push(related.clone());
                        found.push(related);
                    }
                }
            }
        }
    }
    found.reverse();
    Ok(found)
}
