//! # Structured Error Handling
//!
//! Crate-level error taxonomy for the batch engine. Layer-specific errors
//! (`EngineError`, the step handlers' `StepError`) convert into
//! [`BatchError`] at the crate boundary.

use thiserror::Error;

/// Top-level error type for the batch-processing core.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State transition error: {0}")]
    StateTransition(String),

    #[error("Engine error: {0}")]
    Engine(#[from] crate::engine::EngineError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type Result<T> = std::result::Result<T, BatchError>;
