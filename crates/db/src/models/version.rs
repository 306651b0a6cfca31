//! Version rows from the `versions` table.

use serde::Serialize;
use sqlx::FromRow;

use revflow_core::error::CoreError;
use revflow_core::models::Version;
use revflow_core::status::OpKind;
use revflow_core::types::DbId;

/// A version row from the `versions` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VersionRow {
    pub id: DbId,
    pub revision_id: DbId,
    pub record_type: String,
    pub record_id: String,
    pub record_id_int: Option<i64>,
    pub format: String,
    pub serialized_data: String,
    pub object_repr: String,
    pub op_kind: String,
}

impl TryFrom<VersionRow> for Version {
    type Error = CoreError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        Ok(Version {
            op_kind: OpKind::from_code(&row.op_kind)?,
            id: row.id,
            revision_id: row.revision_id,
            record_type: row.record_type,
            record_id: row.record_id,
            record_id_int: row.record_id_int,
            format: row.format,
            serialized_data: row.serialized_data,
            object_repr: row.object_repr,
        })
    }
}

pub fn into_versions(rows: Vec<VersionRow>) -> Result<Vec<Version>, CoreError> {
    rows.into_iter().map(Version::try_from).collect()
}
