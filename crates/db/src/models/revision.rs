//! Revision rows from the `revisions` table.

use serde::Serialize;
use sqlx::FromRow;

use revflow_core::error::CoreError;
use revflow_core::models::Revision;
use revflow_core::status::ModerationStatus;
use revflow_core::tree::TreePosition;
use revflow_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A revision row from the `revisions` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RevisionRow {
    pub id: DbId,
    pub parent_id: Option<DbId>,
    pub created_at: Timestamp,
    pub created_by_id: Option<DbId>,
    pub moderated_at: Option<Timestamp>,
    pub moderated_by_id: Option<DbId>,
    pub comment: String,
    pub status: String,
    pub deleted: bool,
    pub lft: i32,
    pub rght: i32,
    pub tree_id: i32,
    pub level: i32,
}

impl RevisionRow {
    pub fn position(&self) -> TreePosition {
        TreePosition {
            tree_id: self.tree_id,
            lft: self.lft,
            rght: self.rght,
            level: self.level,
        }
    }
}

impl TryFrom<RevisionRow> for Revision {
    type Error = CoreError;

    fn try_from(row: RevisionRow) -> Result<Self, Self::Error> {
        Ok(Revision {
            position: row.position(),
            id: row.id,
            parent_id: row.parent_id,
            created_at: row.created_at,
            created_by: row.created_by_id,
            moderated_at: row.moderated_at,
            moderated_by: row.moderated_by_id,
            comment: row.comment,
            status: ModerationStatus::from_code(&row.status)?,
            deleted: row.deleted,
        })
    }
}

/// Convert a batch of rows, failing on the first unknown status code.
pub fn into_revisions(rows: Vec<RevisionRow>) -> Result<Vec<Revision>, CoreError> {
    rows.into_iter().map(Revision::try_from).collect()
}
