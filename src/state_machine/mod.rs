//! # Item State Machine
//!
//! Status management for work items. The status field records write ownership
//! and terminal outcomes; the step cursor itself is derived from which
//! checkpoints exist (see [`engine::pipeline`](crate::engine::pipeline)).

pub mod states;

pub use states::WorkItemStatus;

use crate::error::{BatchError, Result};

/// Validate a status transition, returning the new status.
///
/// The transition to `Processing` marks invocation write ownership before any
/// step executes. `Failed → Pending` is the operator reset path; everything
/// else out of a terminal state is rejected.
pub fn transition(from: WorkItemStatus, to: WorkItemStatus) -> Result<WorkItemStatus> {
    use WorkItemStatus::{Completed, Failed, Pending, Processing};

    let allowed = matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Processing)
            | (Failed, Pending)
    );

    if allowed {
        Ok(to)
    } else {
        Err(BatchError::StateTransition(format!(
            "invalid work item transition: {from} -> {to}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(transition(WorkItemStatus::Pending, WorkItemStatus::Processing).is_ok());
        assert!(transition(WorkItemStatus::Processing, WorkItemStatus::Completed).is_ok());
        assert!(transition(WorkItemStatus::Processing, WorkItemStatus::Failed).is_ok());
    }

    #[test]
    fn test_operator_reset() {
        assert!(transition(WorkItemStatus::Failed, WorkItemStatus::Pending).is_ok());
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        assert!(transition(WorkItemStatus::Completed, WorkItemStatus::Processing).is_err());
        assert!(transition(WorkItemStatus::Completed, WorkItemStatus::Pending).is_err());
        assert!(transition(WorkItemStatus::Failed, WorkItemStatus::Processing).is_err());
    }

    #[test]
    fn test_reprocessing_keeps_ownership() {
        // An item left Processing by an interrupted invocation is touched
        // again by the next one without a status change.
        assert!(transition(WorkItemStatus::Processing, WorkItemStatus::Processing).is_ok());
    }
}
