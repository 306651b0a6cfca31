//! In-memory backend: a [`MemoryStore`] implementing every store seam and a
//! [`MemoryWorkflow`] that runs each mutating operation atomically by
//! restoring a checkpoint when it fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::WorkflowConfig;
use crate::diff::FieldChange;
use crate::engine::{IntentRequest, ModerationEngine, RecordSnapshot};
use crate::error::CoreError;
use crate::models::{HistoryEntry, NewRevision, NewVersion, Revision, StatusUpdate, Version};
use crate::moderation::BranchInfo;
use crate::registry::Registry;
use crate::revert::RevertReport;
use crate::roles::{Actor, Authorizer, GroupAuthorizer};
use crate::snapshot::Record;
use crate::status::ModerationStatus;
use crate::store::{RecordStore, RevisionStore};
use crate::tree::RevisionTree;
use crate::types::{DbId, FieldMap, RecordKey};
use crate::version::FieldDictCache;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MemoryStore {
    registry: Arc<Registry>,
    tree: RevisionTree,
    versions: BTreeMap<DbId, Version>,
    last_version_id: DbId,
    records: BTreeMap<RecordKey, Record>,
}

impl MemoryStore {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            tree: RevisionTree::new(),
            versions: BTreeMap::new(),
            last_version_id: 0,
            records: BTreeMap::new(),
        }
    }

    pub fn tree(&self) -> &RevisionTree {
        &self.tree
    }

    pub fn record(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    fn revision_of(&self, version: &Version) -> Option<&Revision> {
        self.tree.get(version.revision_id)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&mut self, key: &RecordKey) -> Result<Option<Record>, CoreError> {
        Ok(self.records.get(key).cloned())
    }

    async fn save(&mut self, record: &Record) -> Result<(), CoreError> {
        let key = record.key();
        let spec = self
            .registry
            .get(&record.record_type)
            .ok_or_else(|| CoreError::record_not_found(&key))?;
        for reference in &spec.references {
            if let Some(id) = record.reference(&reference.field) {
                let target = RecordKey::new(&reference.target, id);
                if !self.records.contains_key(&target) {
                    return Err(CoreError::Integrity(format!(
                        "{key}.{} references missing {target}",
                        reference.field
                    )));
                }
            }
        }
        self.records.insert(key, record.clone());
        Ok(())
    }

    async fn delete(&mut self, key: &RecordKey) -> Result<bool, CoreError> {
        Ok(self.records.remove(key).is_some())
    }

    async fn find_referencing(
        &mut self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, CoreError> {
        Ok(self
            .records
            .values()
            .filter(|r| {
                r.record_type == record_type && r.reference(field).as_deref() == Some(value)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RevisionStore for MemoryStore {
    async fn insert_revision(&mut self, new: NewRevision) -> Result<Revision, CoreError> {
        self.tree.insert(new)
    }

    async fn find_revision(&mut self, id: DbId) -> Result<Option<Revision>, CoreError> {
        Ok(self.tree.get(id).cloned())
    }

    async fn update_status(
        &mut self,
        id: DbId,
        update: StatusUpdate,
    ) -> Result<Revision, CoreError> {
        let revision = self.tree.get_mut(id).ok_or(CoreError::NotFound {
            entity: "revision",
            id,
        })?;
        revision.status = update.status;
        if let Some(comment) = update.comment {
            revision.comment = comment;
        }
        if let Some((moderator, at)) = update.moderation {
            revision.update_moderation(moderator, at);
        }
        Ok(revision.clone())
    }

    async fn insert_version(&mut self, new: NewVersion) -> Result<Version, CoreError> {
        if self.tree.get(new.revision_id).is_none() {
            return Err(CoreError::NotFound {
                entity: "revision",
                id: new.revision_id,
            });
        }
        let duplicate = self.versions.values().any(|v| {
            v.revision_id == new.revision_id
                && v.record_type == new.record_type
                && v.record_id == new.record_id
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "Revision {} already holds a version of {}#{}",
                new.revision_id, new.record_type, new.record_id
            )));
        }

        self.last_version_id += 1;
        let version = Version {
            id: self.last_version_id,
            revision_id: new.revision_id,
            record_type: new.record_type,
            record_id: new.record_id,
            record_id_int: new.record_id_int,
            format: new.format,
            serialized_data: new.serialized_data,
            object_repr: new.object_repr,
            op_kind: new.op_kind,
        };
        self.versions.insert(version.id, version.clone());
        Ok(version)
    }

    async fn find_version(&mut self, id: DbId) -> Result<Option<Version>, CoreError> {
        Ok(self.versions.get(&id).cloned())
    }

    async fn versions_of(&mut self, revision_id: DbId) -> Result<Vec<Version>, CoreError> {
        Ok(self
            .versions
            .values()
            .filter(|v| v.revision_id == revision_id)
            .cloned()
            .collect())
    }

    async fn latest_approved(&mut self, key: &RecordKey) -> Result<Option<Version>, CoreError> {
        Ok(self
            .versions
            .values()
            .filter(|v| v.record_type == key.record_type && v.record_id == key.record_id)
            .filter_map(|v| {
                let revision = self.revision_of(v)?;
                (revision.status == ModerationStatus::Approved)
                    .then_some((revision.moderated_at, revision.id, v))
            })
            .max_by_key(|(moderated_at, revision_id, _)| (*moderated_at, *revision_id))
            .map(|(_, _, v)| v.clone()))
    }

    async fn child_count(&mut self, revision_id: DbId) -> Result<i64, CoreError> {
        Ok(self.tree.child_count(revision_id) as i64)
    }

    async fn child_ids(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError> {
        Ok(self.tree.children(revision_id).iter().map(|r| r.id).collect())
    }

    async fn siblings(&mut self, revision_id: DbId) -> Result<Vec<Revision>, CoreError> {
        Ok(self.tree.siblings(revision_id).into_iter().cloned().collect())
    }

    async fn deleted_versions(&mut self, record_type: &str) -> Result<Vec<Version>, CoreError> {
        Ok(self
            .versions
            .values()
            .filter(|v| v.record_type == record_type)
            .filter(|v| {
                self.revision_of(v)
                    .is_some_and(|r| r.deleted && r.position.is_leaf())
            })
            .cloned()
            .collect())
    }

    async fn pending_versions(&mut self) -> Result<Vec<Version>, CoreError> {
        Ok(self
            .versions
            .values()
            .filter(|v| {
                self.revision_of(v)
                    .is_some_and(|r| r.status == ModerationStatus::NeedAttention)
            })
            .cloned()
            .collect())
    }

    async fn record_versions(
        &mut self,
        key: &RecordKey,
    ) -> Result<Vec<(Version, Revision)>, CoreError> {
        let mut rows: Vec<(Version, Revision)> = self
            .versions
            .values()
            .filter(|v| v.record_type == key.record_type && v.record_id == key.record_id)
            .filter_map(|v| Some((v.clone(), self.revision_of(v)?.clone())))
            .collect();
        rows.sort_by_key(|(_, r)| (r.position.tree_id, r.position.lft));
        Ok(rows)
    }

    async fn delete_subtree(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError> {
        let removed = self.tree.remove_subtree(revision_id)?;
        self.versions.retain(|_, v| !removed.contains(&v.revision_id));
        Ok(removed)
    }

    async fn all_revisions(&mut self) -> Result<Vec<Revision>, CoreError> {
        Ok(self.tree.iter().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Workflow facade
// ---------------------------------------------------------------------------

/// Engine plus store. Every mutating call either completes or leaves the
/// store exactly as it was, except [`revert`](Self::revert) which keeps
/// partial progress.
pub struct MemoryWorkflow<A: Authorizer = GroupAuthorizer> {
    engine: ModerationEngine<A>,
    store: MemoryStore,
}

impl MemoryWorkflow<GroupAuthorizer> {
    pub fn new(registry: Arc<Registry>, config: WorkflowConfig) -> Self {
        let store = MemoryStore::new(Arc::clone(&registry));
        Self {
            engine: ModerationEngine::new(registry, config),
            store,
        }
    }
}

impl<A: Authorizer> MemoryWorkflow<A> {
    pub fn with_engine(engine: ModerationEngine<A>, store: MemoryStore) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &ModerationEngine<A> {
        &self.engine
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Direct store access, outside any checkpoint.
    pub fn store_mut(&mut self) -> &mut MemoryStore {
        &mut self.store
    }

    fn settle<T>(
        &mut self,
        checkpoint: MemoryStore,
        result: Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        if result.is_err() {
            self.store = checkpoint;
        }
        result
    }

    // -- mutations -----------------------------------------------------------

    pub async fn create_revision(
        &mut self,
        snapshots: Vec<RecordSnapshot>,
        parent_id: Option<DbId>,
        actor: &Actor,
        comment: &str,
        status: ModerationStatus,
    ) -> Result<Revision, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .create_revision(&mut self.store, snapshots, parent_id, actor, comment, status)
            .await;
        self.settle(checkpoint, result)
    }

    pub async fn apply_intent(&mut self, request: IntentRequest) -> Result<Revision, CoreError> {
        let checkpoint = self.store.clone();
        let result = self.engine.apply_intent(&mut self.store, request).await;
        self.settle(checkpoint, result)
    }

    pub async fn create_initial_version(
        &mut self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .create_initial_version(&mut self.store, record_type, record_id, actor)
            .await;
        self.settle(checkpoint, result)
    }

    pub async fn ensure_initial_version(
        &mut self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Option<Revision>, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .ensure_initial_version(&mut self.store, record_type, record_id, actor)
            .await;
        self.settle(checkpoint, result)
    }

    pub async fn delete_record(
        &mut self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .delete_record(&mut self.store, record_type, record_id, actor)
            .await;
        self.settle(checkpoint, result)
    }

    pub async fn change_status(
        &mut self,
        version_id: DbId,
        status: ModerationStatus,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .change_status(&mut self.store, version_id, status, actor)
            .await;
        self.settle(checkpoint, result)
    }

    pub async fn delete_revision(
        &mut self,
        revision_id: DbId,
        actor: &Actor,
    ) -> Result<Vec<DbId>, CoreError> {
        let checkpoint = self.store.clone();
        let result = self
            .engine
            .delete_revision(&mut self.store, revision_id, actor)
            .await;
        self.settle(checkpoint, result)
    }

    /// Best effort: records restored before a stall stay restored.
    pub async fn revert(
        &mut self,
        target_id: DbId,
        previous_id: Option<DbId>,
        purge_deleted: bool,
    ) -> Result<RevertReport, CoreError> {
        self.engine
            .revert(&mut self.store, target_id, previous_id, purge_deleted)
            .await
    }

    // -- queries -------------------------------------------------------------

    pub async fn latest_approved(
        &mut self,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<Version>, CoreError> {
        self.engine
            .latest_approved(&mut self.store, record_type, record_id)
            .await
    }

    pub async fn children_info(
        &mut self,
        record_type: &str,
        record_id: &str,
        version: Option<&Version>,
    ) -> Result<BranchInfo, CoreError> {
        self.engine
            .children_info(&mut self.store, record_type, record_id, version)
            .await
    }

    pub async fn history(
        &mut self,
        record_type: &str,
        record_id: &str,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        self.engine
            .history(&mut self.store, record_type, record_id)
            .await
    }

    pub async fn version_changes(
        &mut self,
        version_id: DbId,
    ) -> Result<Vec<FieldChange>, CoreError> {
        self.engine.version_changes(&mut self.store, version_id).await
    }

    pub async fn has_alternative(&mut self, revision_id: DbId) -> Result<bool, CoreError> {
        self.engine.has_alternative(&mut self.store, revision_id).await
    }

    pub async fn deleted_versions(&mut self, record_type: &str) -> Result<Vec<Version>, CoreError> {
        self.engine.deleted_versions(&mut self.store, record_type).await
    }

    pub async fn pending_versions(&mut self) -> Result<Vec<Version>, CoreError> {
        self.engine.pending_versions(&mut self.store).await
    }

    pub async fn field_dict(
        &mut self,
        version_id: DbId,
        cache: &mut FieldDictCache,
    ) -> Result<FieldMap, CoreError> {
        self.engine.field_dict(&mut self.store, version_id, cache).await
    }

    pub async fn check_tree(&mut self) -> Result<usize, CoreError> {
        self.engine.check_tree(&mut self.store).await
    }
}
