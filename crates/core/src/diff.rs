//! Field-level comparison of record snapshots.
//!
//! Used to decide whether submitted data actually changed anything and to
//! show what a version changed relative to its parent revision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::Record;

/// The status of an item in a diff comparison.
///
/// - `Added`     -- present only in the new side.
/// - `Removed`   -- present only in the old side.
/// - `Changed`   -- present in both sides but with different values.
/// - `Unchanged` -- present in both sides with identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

impl DiffStatus {
    /// String representation for display and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field difference between two snapshots of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub status: DiffStatus,
}

/// Compare two snapshots field by field (m2m relations included), sorted by
/// field name. Unchanged fields are omitted.
pub fn changes_between(old: &Record, new: &Record) -> Vec<FieldChange> {
    let mut keys: Vec<&String> = old
        .fields
        .keys()
        .chain(new.fields.keys())
        .chain(old.m2m.keys())
        .chain(new.m2m.keys())
        .collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter_map(|key| {
            let before = lookup(old, key);
            let after = lookup(new, key);
            let status = match (&before, &after) {
                (Some(a), Some(b)) if a == b => DiffStatus::Unchanged,
                (Some(_), Some(_)) => DiffStatus::Changed,
                (Some(_), None) => DiffStatus::Removed,
                (None, Some(_)) => DiffStatus::Added,
                (None, None) => return None,
            };
            (status != DiffStatus::Unchanged).then(|| FieldChange {
                field: key.clone(),
                old: before,
                new: after,
                status,
            })
        })
        .collect()
}

/// True when any field or relation differs.
pub fn has_changes(old: &Record, new: &Record) -> bool {
    !old.same_content(new)
}

/// Short comment describing a set of changes, e.g. `Changed span, title.`
pub fn comment_from_changes(changes: &[FieldChange]) -> String {
    if changes.is_empty() {
        return "No fields changed.".to_string();
    }
    let names: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    format!("Changed {}.", names.join(", "))
}

fn lookup(record: &Record, key: &str) -> Option<Value> {
    if let Some(value) = record.fields.get(key) {
        return Some(value.clone());
    }
    record.m2m.get(key).map(|ids| Value::Array(ids.clone()))
}
