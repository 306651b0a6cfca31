//! Snapshot codec: turns a record's full field state into an opaque,
//! format-tagged blob and back. No policy lives here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::types::{FieldMap, RecordKey};

/// Fields checked, in order, when building a human-readable representation.
const REPR_FIELDS: &[&str] = &["title", "name", "label"];

/// A live record as held by a record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    pub record_id: String,
    #[serde(default)]
    pub fields: FieldMap,
    /// Many-to-many relations: field name to related primary keys.
    #[serde(default)]
    pub m2m: BTreeMap<String, Vec<Value>>,
}

impl Record {
    pub fn new(record_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            record_id: record_id.into(),
            fields: FieldMap::new(),
            m2m: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn with_m2m(mut self, name: &str, ids: Vec<Value>) -> Self {
        self.m2m.insert(name.to_string(), ids);
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.record_type, &self.record_id)
    }

    /// Value of a field rendered as a primary key, `None` for null or missing.
    pub fn reference(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Same content as `other`, ignoring identity.
    pub fn same_content(&self, other: &Record) -> bool {
        self.fields == other.fields && self.m2m == other.m2m
    }
}

/// Serialization formats understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotFormat {
    Json,
}

impl SnapshotFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Json => "json",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, CoreError> {
        match tag {
            "json" => Ok(Self::Json),
            other => Err(CoreError::Validation(format!(
                "Unsupported snapshot format '{other}'"
            ))),
        }
    }
}

/// An encoded record plus its format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub format: String,
    pub data: String,
}

/// Encode a record in the given format.
pub fn encode(record: &Record, format: SnapshotFormat) -> Result<Snapshot, CoreError> {
    let data = match format {
        SnapshotFormat::Json => {
            let doc = json!({
                "model": record.record_type,
                "pk": record.record_id,
                "fields": record.fields,
                "m2m": record.m2m,
            });
            serde_json::to_string(&doc)
                .map_err(|e| CoreError::Internal(format!("Failed to encode snapshot: {e}")))?
        }
    };
    Ok(Snapshot {
        format: format.tag().to_string(),
        data,
    })
}

/// Decode a snapshot produced by [`encode`].
pub fn decode(format: &str, data: &str) -> Result<Record, CoreError> {
    match SnapshotFormat::from_tag(format)? {
        SnapshotFormat::Json => decode_json(data),
    }
}

fn decode_json(data: &str) -> Result<Record, CoreError> {
    let doc: Value = serde_json::from_str(data)
        .map_err(|e| CoreError::Validation(format!("Malformed snapshot: {e}")))?;
    let obj = doc
        .as_object()
        .ok_or_else(|| CoreError::Validation("Snapshot must be a JSON object".to_string()))?;

    let record_type = obj
        .get("model")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Validation("Snapshot is missing 'model'".to_string()))?;

    let record_id = match obj.get("pk") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(CoreError::Validation("Snapshot is missing 'pk'".to_string())),
    };

    let fields = match obj.get("fields") {
        Some(Value::Object(map)) => map.clone(),
        None | Some(Value::Null) => FieldMap::new(),
        Some(_) => {
            return Err(CoreError::Validation(
                "Snapshot 'fields' must be an object".to_string(),
            ))
        }
    };

    let m2m = match obj.get("m2m") {
        Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())
            .map_err(|e| CoreError::Validation(format!("Snapshot 'm2m' is malformed: {e}")))?,
        _ => BTreeMap::new(),
    };

    Ok(Record {
        record_type: record_type.to_string(),
        record_id,
        fields,
        m2m,
    })
}

/// Human-readable representation stored alongside each version.
pub fn record_repr(record: &Record) -> String {
    REPR_FIELDS
        .iter()
        .find_map(|name| record.fields.get(*name).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", record.record_type, record.record_id))
}

/// Indexed integer shadow of a textual primary key.
pub fn shadow_int_id(record_id: &str) -> Option<i64> {
    record_id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airplane() -> Record {
        Record::new("airplane", "12")
            .with_field("title", "Mriya")
            .with_field("airplane_type", "3")
            .with_m2m("pilots", vec![json!(1), json!(2)])
    }

    #[test]
    fn encode_tags_format_and_decodes_back() {
        let snapshot = encode(&airplane(), SnapshotFormat::Json).unwrap();
        assert_eq!(snapshot.format, "json");
        let decoded = decode(&snapshot.format, &snapshot.data).unwrap();
        assert_eq!(decoded, airplane());
    }

    #[test]
    fn numeric_pk_is_accepted() {
        let record = decode("json", r#"{"model":"wing","pk":5,"fields":{"span":30}}"#).unwrap();
        assert_eq!(record.record_id, "5");
        assert_eq!(record.fields["span"], json!(30));
        assert!(record.m2m.is_empty());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = decode("xml", "<object/>").unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(decode("json", "not json").is_err());
        assert!(decode("json", "[]").is_err());
        assert!(decode("json", r#"{"pk":"1"}"#).is_err());
        assert!(decode("json", r#"{"model":"a","pk":"1","fields":3}"#).is_err());
    }

    #[test]
    fn repr_prefers_title_then_falls_back_to_identity() {
        assert_eq!(record_repr(&airplane()), "Mriya");
        assert_eq!(record_repr(&Record::new("wing", "9")), "wing 9");
    }

    #[test]
    fn reference_renders_keys_and_skips_null() {
        let record = Record::new("wing", "1")
            .with_field("airplane", 12)
            .with_field("spare", Value::Null);
        assert_eq!(record.reference("airplane").as_deref(), Some("12"));
        assert_eq!(record.reference("spare"), None);
        assert_eq!(record.reference("missing"), None);
    }

    #[test]
    fn shadow_key_only_for_integers() {
        assert_eq!(shadow_int_id("42"), Some(42));
        assert_eq!(shadow_int_id("slug-42"), None);
    }
}
