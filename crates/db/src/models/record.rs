//! Live record rows from the generic `records` table.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use revflow_core::error::CoreError;
use revflow_core::snapshot::Record;
use revflow_core::types::{FieldMap, Timestamp};

/// A row from the `records` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecordRow {
    pub record_type: String,
    pub record_id: String,
    pub fields: Value,
    pub m2m: Value,
    pub updated_at: Timestamp,
}

impl TryFrom<RecordRow> for Record {
    type Error = CoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let fields: FieldMap = match row.fields {
            Value::Object(map) => map,
            Value::Null => FieldMap::new(),
            other => {
                return Err(CoreError::Validation(format!(
                    "Stored fields of {}#{} are not an object: {other}",
                    row.record_type, row.record_id
                )))
            }
        };
        let m2m: BTreeMap<String, Vec<Value>> = match row.m2m {
            Value::Null => BTreeMap::new(),
            value => serde_json::from_value(value).map_err(|e| {
                CoreError::Validation(format!(
                    "Stored m2m of {}#{} is malformed: {e}",
                    row.record_type, row.record_id
                ))
            })?,
        };
        Ok(Record {
            record_type: row.record_type,
            record_id: row.record_id,
            fields,
            m2m,
        })
    }
}
