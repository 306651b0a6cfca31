//! Restores live records to the state captured by a revision.
//!
//! Restores run through a work queue. A save that fails because a record it
//! references is not restored yet (or its type is gone) is deferred to the
//! next pass. Every pass must restore at least one deferred version; a pass
//! that restores nothing stops the revert with [`CoreError::Revert`].
//! Progress made before the stall stays in the store.

use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::error::CoreError;
use crate::models::{Revision, Version};
use crate::registry::Registry;
use crate::snapshot::Record;
use crate::status::OpKind;
use crate::store::{follow_closure, WorkflowStore};
use crate::types::RecordKey;
use crate::version::decode_version;

/// Outcome of a successful revert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevertReport {
    pub deleted: Vec<RecordKey>,
    pub restored: Vec<RecordKey>,
    /// Restore passes run, at least one when anything was restored.
    pub passes: usize,
}

/// Bring live records in line with `target`.
///
/// With `previous`, records versioned there but absent from `target` are
/// deleted first. With `purge_deleted`, live records reachable from the
/// target's records but not part of it, or deleted in it, are removed.
pub async fn revert<S>(
    store: &mut S,
    registry: &Registry,
    target: &Revision,
    previous: Option<&Revision>,
    purge_deleted: bool,
) -> Result<RevertReport, CoreError>
where
    S: WorkflowStore + ?Sized,
{
    let versions = store.versions_of(target.id).await?;
    let by_key: BTreeMap<RecordKey, &Version> = versions.iter().map(|v| (v.key(), v)).collect();
    let mut report = RevertReport::default();

    if let Some(previous) = previous {
        for version in store.versions_of(previous.id).await? {
            let key = version.key();
            if !by_key.contains_key(&key) && store.delete(&key).await? {
                report.deleted.push(key);
            }
        }
    }

    if purge_deleted {
        let mut live = Vec::new();
        for key in by_key.keys() {
            if let Some(record) = store.fetch(key).await? {
                live.push(record);
            }
        }
        for record in follow_closure(&mut *store, registry, live).await? {
            let key = record.key();
            let purge = match by_key.get(&key) {
                None => true,
                Some(version) => version.op_kind == OpKind::Delete,
            };
            if purge && store.delete(&key).await? {
                report.deleted.push(key);
            }
        }
    }

    let mut records = Vec::new();
    for version in versions.iter().filter(|v| v.op_kind != OpKind::Delete) {
        records.push(decode_version(version)?);
    }

    match save_deferring(store, records, &mut report.restored).await {
        Ok(passes) => report.passes = passes,
        Err(SaveFailure::Store(err)) => return Err(err),
        Err(SaveFailure::Stalled { unresolved, .. }) => {
            tracing::error!(
                revision_id = target.id,
                unresolved = unresolved.len(),
                restored = report.restored.len(),
                "Revert stalled, history may be inconsistent"
            );
            return Err(CoreError::Revert {
                revision_id: target.id,
                unresolved,
            });
        }
    }

    tracing::debug!(
        revision_id = target.id,
        restored = report.restored.len(),
        deleted = report.deleted.len(),
        passes = report.passes,
        "Reverted revision"
    );
    Ok(report)
}

/// Why [`save_deferring`] gave up.
#[derive(Debug)]
pub(crate) enum SaveFailure {
    /// A pass saved nothing. `cause` is the last deferral error.
    Stalled {
        unresolved: Vec<RecordKey>,
        cause: CoreError,
    },
    Store(CoreError),
}

/// Save `records` in passes, deferring any whose references are not saved
/// yet. Keys of saved records are appended to `saved`. Returns the number of
/// passes run.
pub(crate) async fn save_deferring<S>(
    store: &mut S,
    records: Vec<Record>,
    saved: &mut Vec<RecordKey>,
) -> Result<usize, SaveFailure>
where
    S: WorkflowStore + ?Sized,
{
    let mut queue: VecDeque<Record> = records.into();
    let mut passes = 0;

    while !queue.is_empty() {
        passes += 1;
        let attempted = queue.len();
        let mut deferred = VecDeque::new();
        let mut cause = None;

        while let Some(record) = queue.pop_front() {
            match store.save(&record).await {
                Ok(()) => saved.push(record.key()),
                Err(err) if err.is_deferrable() => {
                    tracing::warn!(record = %record.key(), error = %err, "Deferring save");
                    cause = Some(err);
                    deferred.push_back(record);
                }
                Err(err) => return Err(SaveFailure::Store(err)),
            }
        }

        if deferred.len() == attempted {
            if let Some(cause) = cause {
                return Err(SaveFailure::Stalled {
                    unresolved: deferred.iter().map(Record::key).collect(),
                    cause,
                });
            }
        }
        queue = deferred;
    }
    Ok(passes)
}
