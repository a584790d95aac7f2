//! # Error Classification
//!
//! Decides what happens to an item whose processing failed: left in
//! processing for the next invocation to retry, or marked failed for
//! operator attention. Timeout-induced interruption never reaches this
//! module — it is not an error.

use crate::engine::{EngineError, StepError};
use crate::error::BatchError;

/// What to do with an item after a processing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Leave the item in processing; the next scheduled invocation retries it.
    Retry,
    /// Mark the item failed with the message recorded. Requires an operator
    /// (or the reset endpoint) to re-queue it.
    Fail,
}

/// Classify an item-level processing error.
///
/// Transient collaborator failures and infrastructure errors are retryable;
/// structural errors (missing dependency checkpoints, corrupt payloads,
/// permanently failing steps) are not.
pub fn classify(error: &BatchError) -> ErrorDisposition {
    match error {
        BatchError::Database(_) => ErrorDisposition::Retry,
        BatchError::Engine(engine_error) => match engine_error {
            EngineError::StepFailed {
                source: StepError::Transient(_),
                ..
            } => ErrorDisposition::Retry,
            EngineError::FinalizationFailed {
                source: StepError::Transient(_),
                ..
            } => ErrorDisposition::Retry,
            EngineError::MissingDependency { .. }
            | EngineError::CorruptCheckpoint { .. }
            | EngineError::UnregisteredJob(_)
            | EngineError::StepFailed { .. }
            | EngineError::FinalizationFailed { .. } => ErrorDisposition::Fail,
        },
        _ => ErrorDisposition::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_step_failure_retries() {
        let error = BatchError::Engine(EngineError::StepFailed {
            step: "research".to_string(),
            source: StepError::Transient("provider overloaded".to_string()),
        });
        assert_eq!(classify(&error), ErrorDisposition::Retry);
    }

    #[test]
    fn test_permanent_step_failure_fails() {
        let error = BatchError::Engine(EngineError::StepFailed {
            step: "research".to_string(),
            source: StepError::Permanent("ticker delisted".to_string()),
        });
        assert_eq!(classify(&error), ErrorDisposition::Fail);
    }

    #[test]
    fn test_missing_dependency_is_structural() {
        let error = BatchError::Engine(EngineError::MissingDependency {
            step: "analysis".to_string(),
            dependency: "research".to_string(),
        });
        assert_eq!(classify(&error), ErrorDisposition::Fail);
    }
}
