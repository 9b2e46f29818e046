//! Merge-permission status.

use serde::{Deserialize, Serialize};

/// The merge-permission decision stored for a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    Pending,
    CanBeMerged,
    CannotBeMerged,
}

impl MergeStatus {
    /// Database/wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CanBeMerged => "can_be_merged",
            Self::CannotBeMerged => "cannot_be_merged",
        }
    }
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for MergeStatus {
    fn from(s: &str) -> Self {
        match s {
            "can_be_merged" => Self::CanBeMerged,
            "cannot_be_merged" => Self::CannotBeMerged,
            _ => Self::Pending,
        }
    }
}
