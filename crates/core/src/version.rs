//! Reconstruction of a version's field dictionary.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::CoreError;
use crate::models::Version;
use crate::registry::Registry;
use crate::snapshot::{self, Record};
use crate::types::{DbId, FieldMap};

/// Decode the record stored in a version.
pub fn decode_version(version: &Version) -> Result<Record, CoreError> {
    snapshot::decode(&version.format, &version.serialized_data)
}

/// Per-operation memo of decoded field dictionaries, keyed by version id.
/// Never persisted; drop it when the operation ends.
#[derive(Debug, Default)]
pub struct FieldDictCache {
    entries: HashMap<DbId, FieldMap>,
}

impl FieldDictCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Field name to value mapping for `version`, including many-to-many data
/// and, for derived record types, the fields of the parent-type version
/// stored in the same revision.
///
/// `revision_versions` must hold the versions of `version`'s revision.
pub fn field_dict(
    version: &Version,
    revision_versions: &[Version],
    registry: &Registry,
    cache: &mut FieldDictCache,
) -> Result<FieldMap, CoreError> {
    if let Some(cached) = cache.entries.get(&version.id) {
        return Ok(cached.clone());
    }

    let record = decode_version(version)?;
    let mut result = record.fields.clone();
    for (name, ids) in &record.m2m {
        result.insert(name.clone(), Value::Array(ids.clone()));
    }

    if let Some((parent_type, parent_id)) = registry.parent_key_of(&record) {
        let parent_version = revision_versions.iter().find(|v| {
            v.revision_id == version.revision_id
                && v.record_type == parent_type
                && v.record_id == parent_id
        });
        if let Some(parent_version) = parent_version {
            let parent_fields = field_dict(parent_version, revision_versions, registry, cache)?;
            result.extend(parent_fields);
        }
    }

    cache.entries.insert(version.id, result.clone());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecordTypeSpec;
    use crate::snapshot::{encode, SnapshotFormat};
    use crate::status::OpKind;
    use serde_json::json;

    fn version_of(id: DbId, revision_id: DbId, record: &Record) -> Version {
        let snap = encode(record, SnapshotFormat::Json).unwrap();
        Version {
            id,
            revision_id,
            record_type: record.record_type.clone(),
            record_id: record.record_id.clone(),
            record_id_int: snapshot::shadow_int_id(&record.record_id),
            format: snap.format,
            serialized_data: snap.data,
            object_repr: snapshot::record_repr(record),
            op_kind: OpKind::Change,
        }
    }

    fn jet_registry() -> Registry {
        Registry::builder()
            .register(RecordTypeSpec::new("jet").parent("airplane", Some("airplane_ptr")))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn includes_fields_and_m2m() {
        let record = Record::new("airplane", "1")
            .with_field("title", "An-124")
            .with_m2m("pilots", vec![json!(3)]);
        let version = version_of(10, 1, &record);
        let registry = Registry::default();
        let mut cache = FieldDictCache::new();

        let dict = field_dict(&version, &[version.clone()], &registry, &mut cache).unwrap();
        assert_eq!(dict["title"], json!("An-124"));
        assert_eq!(dict["pilots"], json!([3]));
    }

    #[test]
    fn merges_parent_version_from_same_revision() {
        let registry = jet_registry();
        let parent = Record::new("airplane", "4").with_field("title", "Jet base");
        let child = Record::new("jet", "j1")
            .with_field("airplane_ptr", "4")
            .with_field("thrust", 120);
        let other_revision_parent =
            version_of(30, 2, &Record::new("airplane", "4").with_field("title", "stale"));
        let versions = vec![
            version_of(20, 1, &child),
            version_of(21, 1, &parent),
            other_revision_parent,
        ];
        let mut cache = FieldDictCache::new();

        let dict = field_dict(&versions[0], &versions, &registry, &mut cache).unwrap();
        assert_eq!(dict["thrust"], json!(120));
        assert_eq!(dict["title"], json!("Jet base"));
        // Child and parent both memoized.
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn missing_parent_version_is_tolerated() {
        let registry = jet_registry();
        let child = Record::new("jet", "j1").with_field("airplane_ptr", "4");
        let versions = vec![version_of(20, 1, &child)];
        let mut cache = FieldDictCache::new();
        let dict = field_dict(&versions[0], &versions, &registry, &mut cache).unwrap();
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn memoized_result_is_reused() {
        let record = Record::new("airplane", "1").with_field("title", "A");
        let mut version = version_of(10, 1, &record);
        let registry = Registry::default();
        let mut cache = FieldDictCache::new();
        field_dict(&version, &[], &registry, &mut cache).unwrap();

        // Corrupt the payload: the cached dictionary is still served.
        version.serialized_data = "garbage".to_string();
        let dict = field_dict(&version, &[], &registry, &mut cache).unwrap();
        assert_eq!(dict["title"], json!("A"));
        assert!(field_dict(&version, &[], &registry, &mut FieldDictCache::new()).is_err());
    }
}
