use crate::error::CoreError;
use crate::moderation::DEFAULT_BRANCH_LIMIT;
use crate::roles::GroupAuthorizer;
use crate::snapshot::SnapshotFormat;
use crate::types::DbId;

/// Workflow configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Maximum number of child revisions a revision may carry (default: `10`).
    pub branch_limit: i64,
    /// Auth-layer group whose members are content admins (default: `1`).
    pub content_admin_group_id: DbId,
    /// Auth-layer group whose members are content managers (default: `2`).
    pub content_manager_group_id: DbId,
    /// Serialization format for new snapshots (default: `json`).
    pub snapshot_format: SnapshotFormat,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            branch_limit: DEFAULT_BRANCH_LIMIT,
            content_admin_group_id: 1,
            content_manager_group_id: 2,
            snapshot_format: SnapshotFormat::Json,
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `BRANCH_LIMIT`             | `10`    |
    /// | `CONTENT_ADMIN_GROUP_ID`   | `1`     |
    /// | `CONTENT_MANAGER_GROUP_ID` | `2`     |
    /// | `SNAPSHOT_FORMAT`          | `json`  |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let branch_limit = parse_or(&lookup, "BRANCH_LIMIT", defaults.branch_limit)?;
        if branch_limit < 1 {
            return Err(CoreError::Validation(format!(
                "BRANCH_LIMIT must be at least 1, got {branch_limit}"
            )));
        }

        let content_admin_group_id = parse_or(
            &lookup,
            "CONTENT_ADMIN_GROUP_ID",
            defaults.content_admin_group_id,
        )?;
        let content_manager_group_id = parse_or(
            &lookup,
            "CONTENT_MANAGER_GROUP_ID",
            defaults.content_manager_group_id,
        )?;

        let snapshot_format = match lookup("SNAPSHOT_FORMAT") {
            Some(tag) => SnapshotFormat::from_tag(tag.trim())?,
            None => defaults.snapshot_format,
        };

        Ok(Self {
            branch_limit,
            content_admin_group_id,
            content_manager_group_id,
            snapshot_format,
        })
    }

    pub fn authorizer(&self) -> GroupAuthorizer {
        GroupAuthorizer::new(self.content_admin_group_id, self.content_manager_group_id)
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| {
                CoreError::Validation(format!("{key} must be a valid integer, got '{raw}'"))
            }),
        None => Ok(default),
    }
}
