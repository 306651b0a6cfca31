use crate::types::{DbId, RecordKey};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Record not found: {record_type} with id {record_id}")]
    RecordNotFound {
        record_type: String,
        record_id: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Dependency resolution during a revert stalled. Live records may be
    /// partially restored and need operator attention.
    #[error("Could not revert revision {revision_id}: {} record(s) unresolved", unresolved.len())]
    Revert {
        revision_id: DbId,
        unresolved: Vec<RecordKey>,
    },

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn record_not_found(key: &RecordKey) -> Self {
        Self::RecordNotFound {
            record_type: key.record_type.clone(),
            record_id: key.record_id.clone(),
        }
    }

    /// Errors a revert pass may resolve by retrying after other restores.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, Self::Integrity(_) | Self::RecordNotFound { .. })
    }
}
