//! Transactional facade over [`ModerationEngine`] and [`PgStore`].
//!
//! Every mutating call runs in its own transaction: it commits when the
//! engine succeeds and rolls back otherwise, so a refused or failed
//! operation leaves no partial revision, version or record behind.
//! [`WorkflowService::revert`] is the exception and keeps partial progress.

use std::sync::Arc;

use revflow_core::config::WorkflowConfig;
use revflow_core::diff::FieldChange;
use revflow_core::engine::{IntentRequest, ModerationEngine, RecordSnapshot};
use revflow_core::error::CoreError;
use revflow_core::models::{HistoryEntry, Revision, Version};
use revflow_core::moderation::BranchInfo;
use revflow_core::registry::Registry;
use revflow_core::revert::RevertReport;
use revflow_core::roles::{Actor, Authorizer, GroupAuthorizer};
use revflow_core::status::ModerationStatus;
use revflow_core::types::{DbId, FieldMap};
use revflow_core::version::FieldDictCache;

use crate::store::PgStore;
use crate::DbPool;

pub struct WorkflowService<A: Authorizer = GroupAuthorizer> {
    pool: DbPool,
    engine: ModerationEngine<A>,
}

impl WorkflowService<GroupAuthorizer> {
    pub fn new(pool: DbPool, registry: Arc<Registry>, config: WorkflowConfig) -> Self {
        Self {
            pool,
            engine: ModerationEngine::new(registry, config),
        }
    }
}

impl<A: Authorizer> WorkflowService<A> {
    pub fn with_engine(pool: DbPool, engine: ModerationEngine<A>) -> Self {
        Self { pool, engine }
    }

    pub fn engine(&self) -> &ModerationEngine<A> {
        &self.engine
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn begin(&self) -> Result<PgStore, CoreError> {
        PgStore::begin(&self.pool, Arc::clone(self.engine.registry())).await
    }

    // -- mutations -----------------------------------------------------------

    pub async fn create_revision(
        &self,
        snapshots: Vec<RecordSnapshot>,
        parent_id: Option<DbId>,
        actor: &Actor,
        comment: &str,
        status: ModerationStatus,
    ) -> Result<Revision, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .create_revision(&mut store, snapshots, parent_id, actor, comment, status)
            .await;
        finish(store, result).await
    }

    pub async fn apply_intent(&self, request: IntentRequest) -> Result<Revision, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.apply_intent(&mut store, request).await;
        finish(store, result).await
    }

    pub async fn create_initial_version(
        &self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .create_initial_version(&mut store, record_type, record_id, actor)
            .await;
        finish(store, result).await
    }

    pub async fn ensure_initial_version(
        &self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Option<Revision>, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .ensure_initial_version(&mut store, record_type, record_id, actor)
            .await;
        finish(store, result).await
    }

    pub async fn delete_record(
        &self,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .delete_record(&mut store, record_type, record_id, actor)
            .await;
        finish(store, result).await
    }

    pub async fn change_status(
        &self,
        version_id: DbId,
        status: ModerationStatus,
        actor: &Actor,
    ) -> Result<Revision, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .change_status(&mut store, version_id, status, actor)
            .await;
        finish(store, result).await
    }

    pub async fn delete_revision(
        &self,
        revision_id: DbId,
        actor: &Actor,
    ) -> Result<Vec<DbId>, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .delete_revision(&mut store, revision_id, actor)
            .await;
        finish(store, result).await
    }

    /// Best effort: a stalled revert still commits what it restored.
    pub async fn revert(
        &self,
        target_id: DbId,
        previous_id: Option<DbId>,
        purge_deleted: bool,
    ) -> Result<RevertReport, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .revert(&mut store, target_id, previous_id, purge_deleted)
            .await;
        match result {
            Ok(_) | Err(CoreError::Revert { .. }) => {
                store.commit().await?;
                result
            }
            Err(err) => {
                rollback(store).await;
                Err(err)
            }
        }
    }

    // -- queries -------------------------------------------------------------

    pub async fn latest_approved(
        &self,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<Version>, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .latest_approved(&mut store, record_type, record_id)
            .await;
        finish(store, result).await
    }

    pub async fn children_info(
        &self,
        record_type: &str,
        record_id: &str,
        version: Option<&Version>,
    ) -> Result<BranchInfo, CoreError> {
        let mut store = self.begin().await?;
        let result = self
            .engine
            .children_info(&mut store, record_type, record_id, version)
            .await;
        finish(store, result).await
    }

    pub async fn history(
        &self,
        record_type: &str,
        record_id: &str,
    ) -> Result<Vec<HistoryEntry>, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.history(&mut store, record_type, record_id).await;
        finish(store, result).await
    }

    pub async fn version_changes(&self, version_id: DbId) -> Result<Vec<FieldChange>, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.version_changes(&mut store, version_id).await;
        finish(store, result).await
    }

    pub async fn has_alternative(&self, revision_id: DbId) -> Result<bool, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.has_alternative(&mut store, revision_id).await;
        finish(store, result).await
    }

    pub async fn deleted_versions(&self, record_type: &str) -> Result<Vec<Version>, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.deleted_versions(&mut store, record_type).await;
        finish(store, result).await
    }

    pub async fn pending_versions(&self) -> Result<Vec<Version>, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.pending_versions(&mut store).await;
        finish(store, result).await
    }

    pub async fn field_dict(
        &self,
        version_id: DbId,
        cache: &mut FieldDictCache,
    ) -> Result<FieldMap, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.field_dict(&mut store, version_id, cache).await;
        finish(store, result).await
    }

    /// Validate the stored tree index. Returns the number of revisions.
    pub async fn check_tree(&self) -> Result<usize, CoreError> {
        let mut store = self.begin().await?;
        let result = self.engine.check_tree(&mut store).await;
        finish(store, result).await
    }
}

/// Commit on success, roll back on failure.
async fn finish<T>(store: PgStore, result: Result<T, CoreError>) -> Result<T, CoreError> {
    match result {
        Ok(value) => {
            store.commit().await?;
            Ok(value)
        }
        Err(err) => {
            rollback(store).await;
            Err(err)
        }
    }
}

/// A failed rollback is only logged; the caller sees the operation's error.
async fn rollback(store: PgStore) {
    if let Err(err) = store.rollback().await {
        tracing::warn!(error = %err, "Rollback failed");
    }
}
