//! Revision and version entities shared by every storage backend.

use serde::{Deserialize, Serialize};

use crate::status::{ModerationStatus, OpKind};
use crate::tree::TreePosition;
use crate::types::{DbId, RecordKey, Timestamp};

/// One node of the moderation tree: a changeset grouping versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: DbId,
    pub parent_id: Option<DbId>,
    pub created_at: Timestamp,
    pub created_by: Option<DbId>,
    pub moderated_at: Option<Timestamp>,
    pub moderated_by: Option<DbId>,
    pub comment: String,
    pub status: ModerationStatus,
    pub deleted: bool,
    pub position: TreePosition,
}

impl Revision {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_children(&self) -> bool {
        self.position.has_children()
    }

    /// Stamp the moderator and moderation time.
    pub fn update_moderation(&mut self, moderator: DbId, at: Timestamp) {
        self.moderated_at = Some(at);
        self.moderated_by = Some(moderator);
    }
}

/// Input for inserting a revision. Tree position is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub parent_id: Option<DbId>,
    pub created_at: Timestamp,
    pub created_by: Option<DbId>,
    pub moderated_at: Option<Timestamp>,
    pub moderated_by: Option<DbId>,
    pub comment: String,
    pub status: ModerationStatus,
    pub deleted: bool,
}

/// Status change applied to an existing revision.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: ModerationStatus,
    /// Replacement comment; `None` keeps the current one.
    pub comment: Option<String>,
    /// Moderator and time to stamp; `None` leaves moderation fields alone.
    pub moderation: Option<(DbId, Timestamp)>,
}

/// Immutable snapshot of one record, owned by one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: DbId,
    pub revision_id: DbId,
    pub record_type: String,
    pub record_id: String,
    pub record_id_int: Option<i64>,
    pub format: String,
    pub serialized_data: String,
    pub object_repr: String,
    pub op_kind: OpKind,
}

impl Version {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.record_type, &self.record_id)
    }
}

/// Input for inserting a version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub revision_id: DbId,
    pub record_type: String,
    pub record_id: String,
    pub record_id_int: Option<i64>,
    pub format: String,
    pub serialized_data: String,
    pub object_repr: String,
    pub op_kind: OpKind,
}

/// One row of a record's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub version: Version,
    pub revision: Revision,
    /// This version is the record's latest approved one.
    pub is_current: bool,
    pub pending: bool,
    pub children_ids: Vec<DbId>,
}
