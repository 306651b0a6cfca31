//! Moderation status and version operation codes.
//!
//! The codes are persisted in `revisions.status` and `versions.op_kind` and
//! form a closed set: anything else read back from storage is rejected.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Moderation state of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModerationStatus {
    #[serde(rename = "DR")]
    Draft,
    #[serde(rename = "NA")]
    NeedAttention,
    #[serde(rename = "AP")]
    Approved,
    #[serde(rename = "RJ")]
    Rejected,
}

impl ModerationStatus {
    /// Stable storage code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Draft => "DR",
            Self::NeedAttention => "NA",
            Self::Approved => "AP",
            Self::Rejected => "RJ",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code {
            "DR" => Ok(Self::Draft),
            "NA" => Ok(Self::NeedAttention),
            "AP" => Ok(Self::Approved),
            "RJ" => Ok(Self::Rejected),
            other => Err(CoreError::Validation(format!(
                "Unknown moderation status code '{other}'"
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::NeedAttention => "Needs attention",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Approved and Rejected end a review.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl Default for ModerationStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// What a version did to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "CHG")]
    Change,
    #[serde(rename = "DEL")]
    Delete,
    #[serde(rename = "RCV")]
    Recover,
}

impl OpKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Change => "CHG",
            Self::Delete => "DEL",
            Self::Recover => "RCV",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code {
            "ADD" => Ok(Self::Add),
            "CHG" => Ok(Self::Change),
            "DEL" => Ok(Self::Delete),
            "RCV" => Ok(Self::Recover),
            other => Err(CoreError::Validation(format!(
                "Unknown version operation code '{other}'"
            ))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Add => "Adding",
            Self::Change => "Changing",
            Self::Delete => "Deleting",
            Self::Recover => "Recovering",
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
