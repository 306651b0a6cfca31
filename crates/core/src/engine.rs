//! The moderation engine: drives intents, lifecycle operations and reverts
//! against any [`WorkflowStore`].
//!
//! The engine performs no transaction handling of its own. Callers run each
//! mutating call inside one unit of work and discard it on error (see
//! [`crate::memory::MemoryWorkflow`] and the db crate's `WorkflowService`).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::WorkflowConfig;
use crate::diff::{changes_between, comment_from_changes, FieldChange};
use crate::error::CoreError;
use crate::models::{HistoryEntry, NewRevision, NewVersion, Revision, StatusUpdate, Version};
use crate::moderation::{
    check_branch_limit, plan_transition, BranchInfo, BranchPlan, Intent, Transition,
};
use crate::registry::Registry;
use crate::revert::{self, RevertReport, SaveFailure};
use crate::roles::{Actor, Authorizer, GroupAuthorizer, ModerationRole};
use crate::snapshot::{self, Record};
use crate::status::{ModerationStatus, OpKind};
use crate::store::{follow_closure, reverse_dependents, WorkflowStore};
use crate::types::{DbId, FieldMap, RecordKey};
use crate::version::{self, decode_version, FieldDictCache};

pub const INITIAL_COMMENT: &str = "Initial version.";
pub const DELETE_COMMENT: &str = "Object is deleted.";

/// One record to snapshot into a new revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub record: Record,
    pub op_kind: OpKind,
}

impl RecordSnapshot {
    pub fn new(record: Record, op_kind: OpKind) -> Self {
        Self { record, op_kind }
    }
}

/// Submitted state of a record and its inline related records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    pub record: Record,
    /// Related records added or edited alongside the main record.
    #[serde(default)]
    pub related: Vec<Record>,
    /// Related records removed by the edit.
    #[serde(default)]
    pub removed: Vec<RecordKey>,
}

impl RecordData {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            related: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn with_related(mut self, record: Record) -> Self {
        self.related.push(record);
        self
    }

    pub fn with_removed(mut self, key: RecordKey) -> Self {
        self.removed.push(key);
        self
    }
}

/// A request to apply one moderation intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub intent: Intent,
    pub base_revision_id: DbId,
    pub data: RecordData,
    pub actor: Actor,
    pub comment: String,
}

pub struct ModerationEngine<A: Authorizer = GroupAuthorizer> {
    registry: Arc<Registry>,
    config: WorkflowConfig,
    authorizer: A,
}

impl ModerationEngine<GroupAuthorizer> {
    /// Engine using the group authorizer configured in `config`.
    pub fn new(registry: Arc<Registry>, config: WorkflowConfig) -> Self {
        let authorizer = config.authorizer();
        Self::with_authorizer(registry, config, authorizer)
    }
}

impl<A: Authorizer> ModerationEngine<A> {
    pub fn with_authorizer(registry: Arc<Registry>, config: WorkflowConfig, authorizer: A) -> Self {
        Self {
            registry,
            config,
            authorizer,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn role_of(&self, actor: &Actor) -> ModerationRole {
        self.authorizer.role_of(actor)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn latest_approved<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
    ) -> Result<Option<Version>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        store
            .latest_approved(&RecordKey::new(record_type, record_id))
            .await
    }

    /// Branching state of `version`'s revision, or of the record's latest
    /// approved revision when no version is given.
    pub async fn children_info<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
        version: Option<&Version>,
    ) -> Result<BranchInfo, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let revision_id = match version {
            Some(version) => version.revision_id,
            None => match self.latest_approved(store, record_type, record_id).await? {
                Some(latest) => latest.revision_id,
                None => return Ok(BranchInfo::from_child_count(0, self.config.branch_limit)),
            },
        };
        let count = store.child_count(revision_id).await?;
        Ok(BranchInfo::from_child_count(count, self.config.branch_limit))
    }

    /// Versions of `record_type` that can be recovered.
    pub async fn deleted_versions<S>(
        &self,
        store: &mut S,
        record_type: &str,
    ) -> Result<Vec<Version>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        self.registry.require(record_type)?;
        store.deleted_versions(record_type).await
    }

    /// The moderation queue.
    pub async fn pending_versions<S>(&self, store: &mut S) -> Result<Vec<Version>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        store.pending_versions().await
    }

    pub async fn history<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
    ) -> Result<Vec<HistoryEntry>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let key = RecordKey::new(record_type, record_id);
        let current = store.latest_approved(&key).await?.map(|v| v.id);

        let mut entries = Vec::new();
        for (version, revision) in store.record_versions(&key).await? {
            let children_ids = store.child_ids(revision.id).await?;
            entries.push(HistoryEntry {
                is_current: current == Some(version.id),
                pending: revision.status == ModerationStatus::NeedAttention,
                children_ids,
                version,
                revision,
            });
        }
        Ok(entries)
    }

    /// Field-level changes of a version against the same record in the
    /// parent revision. Empty for roots and for deleted parents.
    pub async fn version_changes<S>(
        &self,
        store: &mut S,
        version_id: DbId,
    ) -> Result<Vec<FieldChange>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let version = require_version(store, version_id).await?;
        let revision = require_revision(store, version.revision_id).await?;
        let Some(parent_id) = revision.parent_id else {
            return Ok(Vec::new());
        };
        let Some(parent) = store.find_revision(parent_id).await? else {
            return Ok(Vec::new());
        };
        if parent.deleted {
            return Ok(Vec::new());
        }

        let current = decode_version(&version)?;
        let key = version.key();
        let before = match store
            .versions_of(parent.id)
            .await?
            .into_iter()
            .find(|v| v.key() == key)
        {
            Some(parent_version) => decode_version(&parent_version)?,
            None => Record::new(&key.record_type, &key.record_id),
        };
        Ok(changes_between(&before, &current))
    }

    /// A non-root revision has alternatives when a sibling is not deleted.
    pub async fn has_alternative<S>(
        &self,
        store: &mut S,
        revision_id: DbId,
    ) -> Result<bool, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        require_revision(store, revision_id).await?;
        Ok(store
            .siblings(revision_id)
            .await?
            .iter()
            .any(|sibling| !sibling.deleted))
    }

    /// Field dictionary of a version, parent-type fields merged in.
    pub async fn field_dict<S>(
        &self,
        store: &mut S,
        version_id: DbId,
        cache: &mut FieldDictCache,
    ) -> Result<FieldMap, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let version = require_version(store, version_id).await?;
        let siblings = store.versions_of(version.revision_id).await?;
        version::field_dict(&version, &siblings, &self.registry, cache)
    }

    /// Check the nested-interval index of every revision tree.
    pub async fn check_tree<S>(&self, store: &mut S) -> Result<usize, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let revisions = store.all_revisions().await?;
        crate::tree::validate_forest(&revisions)?;
        Ok(revisions.len())
    }

    // -----------------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------------

    /// Create a revision holding one version per snapshot.
    ///
    /// The revision is marked deleted when the first snapshot is a delete.
    /// Revisions created as Approved are moderation-stamped by `actor`.
    pub async fn create_revision<S>(
        &self,
        store: &mut S,
        snapshots: Vec<RecordSnapshot>,
        parent_id: Option<DbId>,
        actor: &Actor,
        comment: &str,
        status: ModerationStatus,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let Some(first) = snapshots.first() else {
            return Err(CoreError::Validation(
                "A revision needs at least one record snapshot".to_string(),
            ));
        };
        let deleted = first.op_kind == OpKind::Delete;

        let mut keys = BTreeSet::new();
        for snapshot in &snapshots {
            self.registry.require(&snapshot.record.record_type)?;
            if !keys.insert(snapshot.record.key()) {
                return Err(CoreError::Validation(format!(
                    "Record {} appears twice in one revision",
                    snapshot.record.key()
                )));
            }
        }
        if let Some(parent_id) = parent_id {
            require_revision(store, parent_id).await?;
        }

        let now = Utc::now();
        let stamped = status == ModerationStatus::Approved;
        let revision = store
            .insert_revision(NewRevision {
                parent_id,
                created_at: now,
                created_by: Some(actor.id),
                moderated_at: stamped.then_some(now),
                moderated_by: stamped.then_some(actor.id),
                comment: comment.to_string(),
                status,
                deleted,
            })
            .await?;

        for snapshot in &snapshots {
            let encoded = snapshot::encode(&snapshot.record, self.config.snapshot_format)?;
            store
                .insert_version(NewVersion {
                    revision_id: revision.id,
                    record_type: snapshot.record.record_type.clone(),
                    record_id: snapshot.record.record_id.clone(),
                    record_id_int: snapshot::shadow_int_id(&snapshot.record.record_id),
                    format: encoded.format,
                    serialized_data: encoded.data,
                    object_repr: snapshot::record_repr(&snapshot.record),
                    op_kind: snapshot.op_kind,
                })
                .await?;
        }

        tracing::info!(
            revision_id = revision.id,
            parent_id = ?parent_id,
            record_type = %first.record.record_type,
            record_id = %first.record.record_id,
            status = %status,
            versions = snapshots.len(),
            "Created revision"
        );
        Ok(revision)
    }

    /// Root revision for a record that has never been versioned.
    pub async fn create_initial_version<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        self.registry.require(record_type)?;
        let record = require_record(store, &RecordKey::new(record_type, record_id)).await?;
        let snapshots = follow_closure(&mut *store, &self.registry, vec![record])
            .await?
            .into_iter()
            .map(|r| RecordSnapshot::new(r, OpKind::Add))
            .collect();
        self.create_revision(
            store,
            snapshots,
            None,
            actor,
            INITIAL_COMMENT,
            ModerationStatus::Approved,
        )
        .await
    }

    /// Create the initial version unless the record already has an approved
    /// one. Returns the new revision, if any.
    pub async fn ensure_initial_version<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Option<Revision>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        if self
            .latest_approved(store, record_type, record_id)
            .await?
            .is_some()
        {
            return Ok(None);
        }
        self.create_initial_version(store, record_type, record_id, actor)
            .await
            .map(Some)
    }

    /// Record a delete revision under the latest approved one, then remove
    /// the live record with its dependents.
    pub async fn delete_record<S>(
        &self,
        store: &mut S,
        record_type: &str,
        record_id: &str,
        actor: &Actor,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        if self.role_of(actor) == ModerationRole::Viewer {
            return Err(CoreError::PolicyViolation(
                "Only content managers and admins may delete versioned records".to_string(),
            ));
        }
        self.registry.require(record_type)?;
        let key = RecordKey::new(record_type, record_id);

        let parent_id = match store.latest_approved(&key).await? {
            Some(latest) => {
                let revision = require_revision(store, latest.revision_id).await?;
                if revision.deleted {
                    return Err(CoreError::Conflict(format!("{key} is already deleted")));
                }
                Some(revision.id)
            }
            None => None,
        };

        let record = require_record(store, &key).await?;
        let dependents = reverse_dependents(&mut *store, &self.registry, &record).await?;
        let parent_record = match self.registry.parent_key_of(&record) {
            Some((parent_type, parent_id)) => {
                store.fetch(&RecordKey::new(parent_type, parent_id)).await?
            }
            None => None,
        };

        let snapshots = std::iter::once(record.clone())
            .chain(dependents.iter().cloned())
            .chain(parent_record.iter().cloned())
            .filter(|r| self.registry.is_registered(&r.record_type))
            .map(|r| RecordSnapshot::new(r, OpKind::Delete))
            .collect();
        let revision = self
            .create_revision(
                store,
                snapshots,
                parent_id,
                actor,
                DELETE_COMMENT,
                ModerationStatus::Approved,
            )
            .await?;

        for dependent in &dependents {
            store.delete(&dependent.key()).await?;
        }
        store.delete(&key).await?;
        if let Some(parent_record) = parent_record {
            store.delete(&parent_record.key()).await?;
        }

        tracing::info!(
            revision_id = revision.id,
            record_type,
            record_id,
            dependents = dependents.len(),
            "Deleted versioned record"
        );
        Ok(revision)
    }

    /// Remove a revision with its subtree and their versions.
    pub async fn delete_revision<S>(
        &self,
        store: &mut S,
        revision_id: DbId,
        actor: &Actor,
    ) -> Result<Vec<DbId>, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        if self.role_of(actor) != ModerationRole::ContentAdmin {
            return Err(CoreError::PolicyViolation(
                "Only content admins may delete revisions".to_string(),
            ));
        }
        require_revision(store, revision_id).await?;
        let removed = store.delete_subtree(revision_id).await?;
        tracing::info!(revision_id, removed = removed.len(), "Deleted revision subtree");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Moderation
    // -----------------------------------------------------------------------

    /// Apply one intent to a record, returning the revision that now
    /// represents the edit (a new child, or the base itself).
    pub async fn apply_intent<S>(
        &self,
        store: &mut S,
        request: IntentRequest,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let IntentRequest {
            intent,
            base_revision_id,
            data,
            actor,
            comment,
        } = request;
        let key = data.record.key();
        self.registry.require(&key.record_type)?;

        let base = require_revision(store, base_revision_id).await?;
        let base_versions = store.versions_of(base.id).await?;
        let base_record = base_versions
            .iter()
            .find(|v| v.key() == key)
            .map(decode_version)
            .transpose()?;

        let changed = intent == Intent::Recover
            || detect_changes(&data, base_record.as_ref(), &base_versions)?;
        let role = self.role_of(&actor);
        let transition = plan_transition(intent, base.status, role, changed).inspect_err(|err| {
            tracing::warn!(
                intent = %intent,
                role = role.as_str(),
                revision_id = base.id,
                error = %err,
                "Intent refused"
            );
        })?;

        let latest = store.latest_approved(&key).await?;
        self.guard_deleted(store, intent, &base, latest.as_ref()).await?;

        tracing::debug!(
            intent = %intent,
            revision_id = base.id,
            record = %key,
            changed,
            ?transition,
            "Planned transition"
        );

        match transition {
            Transition::Unchanged => Ok(base),
            Transition::Restatus {
                status,
                stamp,
                replace_comment,
                publish,
            } => {
                let update = StatusUpdate {
                    status,
                    comment: (replace_comment && !comment.is_empty()).then_some(comment),
                    moderation: stamp.then(|| (actor.id, Utc::now())),
                };
                self.restatus(store, &base, update, publish.then_some(latest).flatten(), publish)
                    .await
            }
            Transition::Branch(plan) => {
                let comment = match plan.comment_override {
                    Some(fixed) => fixed.to_string(),
                    None if !comment.is_empty() => comment,
                    None => match &base_record {
                        Some(before) => {
                            comment_from_changes(&changes_between(before, &data.record))
                        }
                        None => String::new(),
                    },
                };
                self.branch(store, &base, &base_versions, plan, data, &actor, &comment, latest)
                    .await
            }
        }
    }

    /// Approve or reject a pending revision from the moderation queue.
    pub async fn change_status<S>(
        &self,
        store: &mut S,
        version_id: DbId,
        status: ModerationStatus,
        actor: &Actor,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let intent = match status {
            ModerationStatus::Approved => Intent::Approve,
            ModerationStatus::Rejected => Intent::Reject,
            other => {
                return Err(CoreError::Validation(format!(
                    "Moderation can only approve or reject, not set {}",
                    other.label()
                )))
            }
        };
        let version = require_version(store, version_id).await?;
        let revision = require_revision(store, version.revision_id).await?;

        match plan_transition(intent, revision.status, self.role_of(actor), false)? {
            Transition::Restatus {
                status,
                stamp,
                publish,
                ..
            } => {
                let latest = if publish {
                    store.latest_approved(&version.key()).await?
                } else {
                    None
                };
                let update = StatusUpdate {
                    status,
                    comment: None,
                    moderation: stamp.then(|| (actor.id, Utc::now())),
                };
                self.restatus(store, &revision, update, latest, publish).await
            }
            other => Err(CoreError::Internal(format!(
                "Unexpected moderation transition {other:?}"
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Revert
    // -----------------------------------------------------------------------

    /// Restore live records to `target_id`'s state.
    pub async fn revert<S>(
        &self,
        store: &mut S,
        target_id: DbId,
        previous_id: Option<DbId>,
        purge_deleted: bool,
    ) -> Result<RevertReport, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let target = require_revision(store, target_id).await?;
        let previous = match previous_id {
            Some(id) => Some(require_revision(store, id).await?),
            None => None,
        };
        revert::revert(store, &self.registry, &target, previous.as_ref(), purge_deleted).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Refuse recovering a record twice, and editing a deleted record.
    async fn guard_deleted<S>(
        &self,
        store: &mut S,
        intent: Intent,
        base: &Revision,
        latest: Option<&Version>,
    ) -> Result<(), CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        if intent == Intent::Recover {
            if !base.deleted {
                return Err(CoreError::Conflict(format!(
                    "Revision {} is not a delete revision",
                    base.id
                )));
            }
            if base.has_children() {
                return Err(CoreError::Conflict(format!(
                    "Revision {} was already recovered",
                    base.id
                )));
            }
            return Ok(());
        }

        if let Some(latest) = latest {
            let latest_revision = require_revision(store, latest.revision_id).await?;
            if latest_revision.deleted {
                return Err(CoreError::Conflict(format!(
                    "{} is deleted; recover it before editing",
                    latest.key()
                )));
            }
        }
        Ok(())
    }

    async fn restatus<S>(
        &self,
        store: &mut S,
        base: &Revision,
        update: StatusUpdate,
        latest: Option<Version>,
        publish: bool,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        let previous = match &latest {
            Some(latest) if latest.revision_id != base.id => {
                Some(require_revision(store, latest.revision_id).await?)
            }
            _ => None,
        };
        let status = update.status;
        let updated = store.update_status(base.id, update).await?;
        if publish {
            revert::revert(store, &self.registry, &updated, previous.as_ref(), false).await?;
        }
        tracing::info!(
            revision_id = updated.id,
            status = %status,
            publish,
            "Updated revision status"
        );
        Ok(updated)
    }

    #[allow(clippy::too_many_arguments)]
    async fn branch<S>(
        &self,
        store: &mut S,
        base: &Revision,
        base_versions: &[Version],
        plan: BranchPlan,
        data: RecordData,
        actor: &Actor,
        comment: &str,
        latest: Option<Version>,
    ) -> Result<Revision, CoreError>
    where
        S: WorkflowStore + ?Sized,
    {
        if plan.enforce_branch_limit {
            let count = store.child_count(base.id).await?;
            if let Err(err) = check_branch_limit(count, self.config.branch_limit) {
                tracing::warn!(revision_id = base.id, count, "Branch limit reached");
                return Err(err);
            }
        }

        if plan.demote_base {
            store
                .update_status(
                    base.id,
                    StatusUpdate {
                        status: ModerationStatus::Draft,
                        comment: None,
                        moderation: Some((actor.id, Utc::now())),
                    },
                )
                .await?;
        }

        for key in &data.removed {
            store.delete(key).await?;
        }
        // Parent-type and referenced records may arrive after the records
        // pointing at them.
        let records = std::iter::once(data.record.clone())
            .chain(data.related.iter().cloned())
            .collect();
        match revert::save_deferring(&mut *store, records, &mut Vec::new()).await {
            Ok(_) => {}
            Err(SaveFailure::Store(err)) => return Err(err),
            Err(SaveFailure::Stalled { unresolved, cause }) => {
                tracing::warn!(
                    revision_id = base.id,
                    unresolved = unresolved.len(),
                    error = %cause,
                    "Submitted records reference missing records"
                );
                return Err(cause);
            }
        }

        let main_key = data.record.key();
        let persisted = require_record(store, &main_key).await?;
        let mut roots = vec![persisted];
        for related in &data.related {
            if let Some(record) = store.fetch(&related.key()).await? {
                roots.push(record);
            }
        }
        let in_base: BTreeSet<RecordKey> = base_versions.iter().map(Version::key).collect();
        let snapshots = follow_closure(&mut *store, &self.registry, roots)
            .await?
            .into_iter()
            .filter(|r| self.registry.is_registered(&r.record_type))
            .map(|r| {
                let op_kind = if r.key() == main_key || in_base.contains(&r.key()) {
                    plan.op_kind
                } else {
                    OpKind::Add
                };
                RecordSnapshot::new(r, op_kind)
            })
            .collect();

        let child = self
            .create_revision(store, snapshots, Some(base.id), actor, comment, plan.status)
            .await?;

        if plan.restore_published {
            if let Some(latest) = latest {
                let published = require_revision(store, latest.revision_id).await?;
                revert::revert(store, &self.registry, &published, Some(&child), false).await?;
            }
        }
        Ok(child)
    }
}

/// Submitted data differs from the base snapshot, or related records were
/// added, changed or removed.
fn detect_changes(
    data: &RecordData,
    base_record: Option<&Record>,
    base_versions: &[Version],
) -> Result<bool, CoreError> {
    match base_record {
        Some(before) if before.same_content(&data.record) => {}
        _ => return Ok(true),
    }
    if !data.removed.is_empty() {
        return Ok(true);
    }
    for related in &data.related {
        let key = related.key();
        let Some(version) = base_versions.iter().find(|v| v.key() == key) else {
            return Ok(true);
        };
        if !decode_version(version)?.same_content(related) {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn require_revision<S>(store: &mut S, id: DbId) -> Result<Revision, CoreError>
where
    S: WorkflowStore + ?Sized,
{
    store.find_revision(id).await?.ok_or(CoreError::NotFound {
        entity: "revision",
        id,
    })
}

async fn require_version<S>(store: &mut S, id: DbId) -> Result<Version, CoreError>
where
    S: WorkflowStore + ?Sized,
{
    store.find_version(id).await?.ok_or(CoreError::NotFound {
        entity: "version",
        id,
    })
}

async fn require_record<S>(store: &mut S, key: &RecordKey) -> Result<Record, CoreError>
where
    S: WorkflowStore + ?Sized,
{
    store
        .fetch(key)
        .await?
        .ok_or_else(|| CoreError::record_not_found(key))
}
