//! # Resilience Patterns
//!
//! Retry helpers for the flaky external collaborators step functions talk to
//! (market-data providers, LLM APIs). The engine itself never retries a step
//! within an invocation; handlers use these helpers internally and surface a
//! transient [`StepError`](crate::engine::StepError) once retries are
//! exhausted.

pub mod backoff;

pub use backoff::retry_with_backoff;
