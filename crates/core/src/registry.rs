//! Static registration table of versioned record types.
//!
//! Built once at startup. Each entry declares the foreign keys a record
//! carries, the relationships that travel with it into a revision ("follow"),
//! and an optional parent type for base/derived record hierarchies.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::snapshot::Record;

/// A foreign-key field pointing at a record of another registered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub field: String,
    pub target: String,
}

/// A relationship included when a record is snapshotted or reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Follow {
    /// Follow a foreign key declared in `references`.
    Field { field: String },
    /// Follow records of `record_type` whose `field` points at this record.
    Reverse { record_type: String, field: String },
}

/// Link from a derived record type to its parent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub record_type: String,
    /// Field holding the parent's key. `None` means the same primary key.
    #[serde(default)]
    pub link_field: Option<String>,
}

/// Registration entry for one record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeSpec {
    pub name: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub follow: Vec<Follow>,
    #[serde(default)]
    pub parent: Option<ParentLink>,
    /// Set for proxy types, which cannot be versioned on their own.
    #[serde(default)]
    pub proxy_of: Option<String>,
}

impl RecordTypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
            follow: Vec::new(),
            parent: None,
            proxy_of: None,
        }
    }

    pub fn reference(mut self, field: &str, target: &str) -> Self {
        self.references.push(Reference {
            field: field.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn follow_field(mut self, field: &str) -> Self {
        self.follow.push(Follow::Field {
            field: field.to_string(),
        });
        self
    }

    pub fn follow_reverse(mut self, record_type: &str, field: &str) -> Self {
        self.follow.push(Follow::Reverse {
            record_type: record_type.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn parent(mut self, record_type: &str, link_field: Option<&str>) -> Self {
        self.parent = Some(ParentLink {
            record_type: record_type.to_string(),
            link_field: link_field.map(str::to_string),
        });
        self
    }

    pub fn proxy_of(mut self, record_type: &str) -> Self {
        self.proxy_of = Some(record_type.to_string());
        self
    }

    /// Target type of a declared foreign-key field.
    pub fn reference_target(&self, field: &str) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.target.as_str())
    }
}

/// Collects registrations and validates them into a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    specs: BTreeMap<String, RecordTypeSpec>,
    explicit: BTreeSet<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type. Parent types are registered implicitly.
    pub fn register(mut self, spec: RecordTypeSpec) -> Result<Self, CoreError> {
        if let Some(base) = &spec.proxy_of {
            return Err(CoreError::Registration(format!(
                "Proxy type '{}' cannot be versioned, register '{base}' instead",
                spec.name
            )));
        }
        if self.explicit.contains(&spec.name) {
            return Err(CoreError::Registration(format!(
                "Record type '{}' is already registered",
                spec.name
            )));
        }

        let mut spec = spec;
        if let Some(parent) = spec.parent.clone() {
            if parent.record_type == spec.name {
                return Err(CoreError::Registration(format!(
                    "Record type '{}' cannot be its own parent",
                    spec.name
                )));
            }
            self.specs
                .entry(parent.record_type.clone())
                .or_insert_with(|| RecordTypeSpec::new(parent.record_type.clone()));
            if let Some(link) = &parent.link_field {
                if spec.reference_target(link).is_none() {
                    spec = spec.reference(link, &parent.record_type);
                }
            }
        }

        self.explicit.insert(spec.name.clone());
        self.specs.insert(spec.name.clone(), spec);
        Ok(self)
    }

    /// Validate cross references and freeze the table.
    pub fn build(self) -> Result<Registry, CoreError> {
        for spec in self.specs.values() {
            self.check_parent_chain(spec)?;
            for reference in &spec.references {
                if !self.specs.contains_key(&reference.target) {
                    return Err(CoreError::Registration(format!(
                        "'{}.{}' references unregistered type '{}'",
                        spec.name, reference.field, reference.target
                    )));
                }
            }
            for follow in &spec.follow {
                match follow {
                    Follow::Field { field } => {
                        if spec.reference_target(field).is_none() {
                            return Err(CoreError::Registration(format!(
                                "'{}' follows '{field}' which is not a declared reference",
                                spec.name
                            )));
                        }
                    }
                    Follow::Reverse { record_type, field } => {
                        let Some(related) = self.specs.get(record_type) else {
                            return Err(CoreError::Registration(format!(
                                "'{}' follows unregistered type '{record_type}'",
                                spec.name
                            )));
                        };
                        if related.reference_target(field) != Some(spec.name.as_str()) {
                            return Err(CoreError::Registration(format!(
                                "'{record_type}.{field}' does not reference '{}'",
                                spec.name
                            )));
                        }
                    }
                }
            }
        }
        Ok(Registry { specs: self.specs })
    }

    /// Parent links must end at a type without a parent.
    fn check_parent_chain(&self, spec: &RecordTypeSpec) -> Result<(), CoreError> {
        let mut chain = vec![spec.name.as_str()];
        let mut current = spec;
        while let Some(parent) = &current.parent {
            if chain.contains(&parent.record_type.as_str()) {
                chain.push(&parent.record_type);
                return Err(CoreError::Registration(format!(
                    "Parent types form a cycle: {}",
                    chain.join(" -> ")
                )));
            }
            chain.push(&parent.record_type);
            match self.specs.get(&parent.record_type) {
                Some(next) => current = next,
                None => break,
            }
        }
        Ok(())
    }
}

/// Frozen registration table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    specs: BTreeMap<String, RecordTypeSpec>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Load a registry from a JSON array of [`RecordTypeSpec`] entries.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let specs: Vec<RecordTypeSpec> = serde_json::from_str(json)
            .map_err(|e| CoreError::Registration(format!("Malformed registry: {e}")))?;
        specs
            .into_iter()
            .try_fold(RegistryBuilder::new(), RegistryBuilder::register)?
            .build()
    }

    pub fn is_registered(&self, record_type: &str) -> bool {
        self.specs.contains_key(record_type)
    }

    pub fn get(&self, record_type: &str) -> Option<&RecordTypeSpec> {
        self.specs.get(record_type)
    }

    /// Look up a type, failing for unregistered ones.
    pub fn require(&self, record_type: &str) -> Result<&RecordTypeSpec, CoreError> {
        self.specs.get(record_type).ok_or_else(|| {
            CoreError::Validation(format!("Record type '{record_type}' is not registered"))
        })
    }

    pub fn record_types(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Key of the parent-type record for `record`, if its type has a parent.
    pub fn parent_key_of(&self, record: &Record) -> Option<(String, String)> {
        let parent = self.specs.get(&record.record_type)?.parent.as_ref()?;
        let parent_id = match &parent.link_field {
            Some(field) => record.reference(field)?,
            None => record.record_id.clone(),
        };
        Some((parent.record_type.clone(), parent_id))
    }
}
