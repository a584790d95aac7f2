use serde::{Deserialize, Serialize};
use std::fmt;

/// Work item state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    /// Initial state when the item is created by a business trigger
    Pending,
    /// An invocation has taken write ownership of the item
    Processing,
    /// Pipeline finished and terminal side effects were performed
    Completed,
    /// Unrecoverable error; requires operator reset
    Failed,
}

impl WorkItemStatus {
    /// Check if this is a terminal state (item no longer occupies the queue)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this item is eligible for selection by the work selector
    pub fn needs_processing(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for WorkItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid work item status: {s}")),
        }
    }
}

impl Default for WorkItemStatus {
    fn default() -> Self {
        Self::Pending
    }
}
