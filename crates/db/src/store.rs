//! [`PgStore`]: the core store seams over one Postgres transaction.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Postgres, Transaction};

use revflow_core::error::CoreError;
use revflow_core::models::{NewRevision, NewVersion, Revision, StatusUpdate, Version};
use revflow_core::registry::Registry;
use revflow_core::snapshot::Record;
use revflow_core::status::ModerationStatus;
use revflow_core::store::{RecordStore, RevisionStore};
use revflow_core::tree::TreePosition;
use revflow_core::types::{DbId, RecordKey};

use crate::error::db_error;
use crate::models::record::RecordRow;
use crate::models::revision::into_revisions;
use crate::models::version::into_versions;
use crate::repositories::{RecordRepo, RevisionRepo, VersionRepo};
use crate::DbPool;

/// Every call runs on the wrapped transaction. Nothing is visible to other
/// connections until [`commit`](Self::commit).
pub struct PgStore {
    tx: Transaction<'static, Postgres>,
    registry: Arc<Registry>,
}

impl PgStore {
    pub async fn begin(pool: &DbPool, registry: Arc<Registry>) -> Result<Self, CoreError> {
        let tx = pool.begin().await.map_err(db_error)?;
        Ok(Self { tx, registry })
    }

    pub async fn commit(self) -> Result<(), CoreError> {
        self.tx.commit().await.map_err(db_error)
    }

    pub async fn rollback(self) -> Result<(), CoreError> {
        self.tx.rollback().await.map_err(db_error)
    }

    async fn require_revision_row(&mut self, id: DbId) -> Result<Revision, CoreError> {
        RevisionRepo::find_for_update(&mut self.tx, id)
            .await
            .map_err(db_error)?
            .ok_or(CoreError::NotFound {
                entity: "revision",
                id,
            })?
            .try_into()
    }

    /// Pair versions with their revisions, keeping the order of `versions`.
    async fn with_revisions(
        &mut self,
        versions: Vec<Version>,
    ) -> Result<Vec<(Version, Revision)>, CoreError> {
        let mut ids: Vec<DbId> = versions.iter().map(|v| v.revision_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let revisions = into_revisions(
            RevisionRepo::list_by_ids(&mut self.tx, &ids)
                .await
                .map_err(db_error)?,
        )?;

        versions
            .into_iter()
            .map(|version| {
                let revision = revisions
                    .iter()
                    .find(|r| r.id == version.revision_id)
                    .cloned()
                    .ok_or(CoreError::NotFound {
                        entity: "revision",
                        id: version.revision_id,
                    })?;
                Ok((version, revision))
            })
            .collect()
    }
}

fn into_records(rows: Vec<RecordRow>) -> Result<Vec<Record>, CoreError> {
    rows.into_iter().map(Record::try_from).collect()
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch(&mut self, key: &RecordKey) -> Result<Option<Record>, CoreError> {
        RecordRepo::find(&mut self.tx, &key.record_type, &key.record_id)
            .await
            .map_err(db_error)?
            .map(Record::try_from)
            .transpose()
    }

    async fn save(&mut self, record: &Record) -> Result<(), CoreError> {
        let key = record.key();
        let spec = self
            .registry
            .get(&record.record_type)
            .ok_or_else(|| CoreError::record_not_found(&key))?;

        // The records table is generic, so declared references are checked
        // here. A refused save issues no statement and leaves the
        // transaction usable for the revert retry queue.
        for reference in &spec.references {
            if let Some(id) = record.reference(&reference.field) {
                let present = RecordRepo::exists(&mut self.tx, &reference.target, &id)
                    .await
                    .map_err(db_error)?;
                if !present {
                    return Err(CoreError::Integrity(format!(
                        "{key}.{} references missing {}",
                        reference.field,
                        RecordKey::new(&reference.target, id)
                    )));
                }
            }
        }

        let fields = Value::Object(record.fields.clone());
        let m2m = serde_json::to_value(&record.m2m)
            .map_err(|e| CoreError::Internal(format!("Failed to encode m2m of {key}: {e}")))?;
        RecordRepo::upsert(&mut self.tx, &record.record_type, &record.record_id, &fields, &m2m)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn delete(&mut self, key: &RecordKey) -> Result<bool, CoreError> {
        RecordRepo::delete(&mut self.tx, &key.record_type, &key.record_id)
            .await
            .map_err(db_error)
    }

    async fn find_referencing(
        &mut self,
        record_type: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<Record>, CoreError> {
        into_records(
            RecordRepo::list_referencing(&mut self.tx, record_type, field, value)
                .await
                .map_err(db_error)?,
        )
    }
}

#[async_trait]
impl RevisionStore for PgStore {
    async fn insert_revision(&mut self, new: NewRevision) -> Result<Revision, CoreError> {
        let position = match new.parent_id {
            None => {
                let tree_id = RevisionRepo::next_tree_id(&mut self.tx)
                    .await
                    .map_err(db_error)?;
                TreePosition::root(tree_id)
            }
            Some(parent_id) => {
                let parent = self.require_revision_row(parent_id).await?;
                let (slot, shift) = parent.position.child_slot();
                RevisionRepo::apply_shift(&mut self.tx, shift)
                    .await
                    .map_err(db_error)?;
                slot
            }
        };

        RevisionRepo::insert(&mut self.tx, &new, position)
            .await
            .map_err(db_error)?
            .try_into()
    }

    async fn find_revision(&mut self, id: DbId) -> Result<Option<Revision>, CoreError> {
        RevisionRepo::find_by_id(&mut self.tx, id)
            .await
            .map_err(db_error)?
            .map(Revision::try_from)
            .transpose()
    }

    async fn update_status(
        &mut self,
        id: DbId,
        update: StatusUpdate,
    ) -> Result<Revision, CoreError> {
        RevisionRepo::update_status(
            &mut self.tx,
            id,
            update.status.code(),
            update.comment.as_deref(),
            update.moderation,
        )
        .await
        .map_err(db_error)?
        .ok_or(CoreError::NotFound {
            entity: "revision",
            id,
        })?
        .try_into()
    }

    async fn insert_version(&mut self, new: NewVersion) -> Result<Version, CoreError> {
        VersionRepo::insert(&mut self.tx, &new)
            .await
            .map_err(|e| match db_error(e) {
                CoreError::Integrity(_) => CoreError::NotFound {
                    entity: "revision",
                    id: new.revision_id,
                },
                CoreError::Conflict(_) => CoreError::Conflict(format!(
                    "Revision {} already holds a version of {}#{}",
                    new.revision_id, new.record_type, new.record_id
                )),
                other => other,
            })?
            .try_into()
    }

    async fn find_version(&mut self, id: DbId) -> Result<Option<Version>, CoreError> {
        VersionRepo::find_by_id(&mut self.tx, id)
            .await
            .map_err(db_error)?
            .map(Version::try_from)
            .transpose()
    }

    async fn versions_of(&mut self, revision_id: DbId) -> Result<Vec<Version>, CoreError> {
        into_versions(
            VersionRepo::list_by_revision(&mut self.tx, revision_id)
                .await
                .map_err(db_error)?,
        )
    }

    async fn latest_approved(&mut self, key: &RecordKey) -> Result<Option<Version>, CoreError> {
        VersionRepo::find_latest_approved(&mut self.tx, &key.record_type, &key.record_id)
            .await
            .map_err(db_error)?
            .map(Version::try_from)
            .transpose()
    }

    async fn child_count(&mut self, revision_id: DbId) -> Result<i64, CoreError> {
        RevisionRepo::count_children(&mut self.tx, revision_id)
            .await
            .map_err(db_error)
    }

    async fn child_ids(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError> {
        RevisionRepo::list_child_ids(&mut self.tx, revision_id)
            .await
            .map_err(db_error)
    }

    async fn siblings(&mut self, revision_id: DbId) -> Result<Vec<Revision>, CoreError> {
        into_revisions(
            RevisionRepo::list_siblings(&mut self.tx, revision_id)
                .await
                .map_err(db_error)?,
        )
    }

    async fn deleted_versions(&mut self, record_type: &str) -> Result<Vec<Version>, CoreError> {
        into_versions(
            VersionRepo::list_deleted_leaves(&mut self.tx, record_type)
                .await
                .map_err(db_error)?,
        )
    }

    async fn pending_versions(&mut self) -> Result<Vec<Version>, CoreError> {
        into_versions(
            VersionRepo::list_by_status(&mut self.tx, ModerationStatus::NeedAttention)
                .await
                .map_err(db_error)?,
        )
    }

    async fn record_versions(
        &mut self,
        key: &RecordKey,
    ) -> Result<Vec<(Version, Revision)>, CoreError> {
        let versions = into_versions(
            VersionRepo::list_by_record(&mut self.tx, &key.record_type, &key.record_id)
                .await
                .map_err(db_error)?,
        )?;
        self.with_revisions(versions).await
    }

    async fn delete_subtree(&mut self, revision_id: DbId) -> Result<Vec<DbId>, CoreError> {
        let revision = self.require_revision_row(revision_id).await?;
        let removed = RevisionRepo::delete_interval(&mut self.tx, revision.position)
            .await
            .map_err(db_error)?;
        RevisionRepo::apply_shift(&mut self.tx, revision.position.removal_shift())
            .await
            .map_err(db_error)?;
        Ok(removed)
    }

    async fn all_revisions(&mut self) -> Result<Vec<Revision>, CoreError> {
        into_revisions(RevisionRepo::list_all(&mut self.tx).await.map_err(db_error)?)
    }
}
