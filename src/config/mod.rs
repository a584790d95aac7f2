//! # Batch Engine Configuration System
//!
//! Explicit, validated configuration for the batch core. Mirrors the layered
//! approach used across the platform: a TOML file provides the base values,
//! `ALPHARANK_*` environment variables override them, and every section has
//! sane defaults so partial files load cleanly.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use alpharank_batch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let budget = manager.config().execution.max_execution_time();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure for the batch engine.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Database connection and pooling configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Scheduler authentication settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Time budget and batch sizing
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Retry/backoff settings for flaky collaborators
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// HTTP trigger surface configuration
    #[serde(default)]
    pub web: WebConfig,
}

/// Database connection and pooling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection URL; falls back to DATABASE_URL when unset
    pub url: Option<String>,
    /// Connection pool size
    pub pool: u32,
    /// Checkout timeout in seconds
    pub checkout_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool: 10,
            checkout_timeout: 10,
        }
    }
}

impl DatabaseConfig {
    /// Resolve the effective database URL.
    pub fn database_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

/// Scheduler authentication configuration.
///
/// The trigger endpoints accept the shared secret either as a bearer token or
/// via the `X-Scheduler-Secret` header.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared secret expected from the external scheduler
    pub scheduler_secret: String,
}

/// Time budget and batch sizing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Wall-clock budget per invocation, kept below the host's hard limit
    pub max_execution_time_ms: u64,
    /// Maximum items pulled from the work selector per invocation
    pub batch_size: usize,
    /// Concurrency for the pooled executor variant
    pub worker_concurrency: usize,
    /// Recency window for duplicate-target exclusion, in hours
    pub duplicate_window_hours: i64,
    /// Trading-calendar offset from UTC, in minutes (e.g. -300 for US Eastern)
    pub calendar_offset_minutes: i32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_execution_time_ms: 50_000,
            batch_size: 25,
            worker_concurrency: 10,
            duplicate_window_hours: 24,
            calendar_offset_minutes: -300,
        }
    }
}

impl ExecutionConfig {
    pub fn max_execution_time(&self) -> Duration {
        Duration::from_millis(self.max_execution_time_ms)
    }

    /// Configuration optimized for tests: tiny batches, generous budget.
    pub fn for_testing() -> Self {
        Self {
            max_execution_time_ms: 5_000,
            batch_size: 10,
            worker_concurrency: 4,
            duplicate_window_hours: 24,
            calendar_offset_minutes: 0,
        }
    }
}

/// Retry/backoff configuration for step-internal collaborator retries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffConfig {
    /// Maximum attempts before a transient failure surfaces as a step failure
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied per attempt
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before the given retry attempt (1-based), capped at max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let delay = self.base_delay_ms as f64 * self.multiplier.powi(exp as i32);
        Duration::from_millis((delay as u64).min(self.max_delay_ms))
    }

    /// Configuration optimized for tests: no real sleeping to speak of.
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
        }
    }
}

/// HTTP trigger surface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    /// Bind address for the trigger router
    pub bind_address: String,
    /// Request timeout in seconds
    pub request_timeout_seconds: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_seconds: 60,
        }
    }
}
