//! # Configuration Loader
//!
//! Loads [`BatchConfig`](super::BatchConfig) from an optional TOML file plus
//! `ALPHARANK_*` environment overrides (e.g. `ALPHARANK_AUTH__SCHEDULER_SECRET`).

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::BatchConfig;
use crate::error::{BatchError, Result};

const ENV_PREFIX: &str = "ALPHARANK";
const DEFAULT_CONFIG_PATH: &str = "config/alpharank-batch";

/// Loads and owns the effective configuration.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: BatchConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from an explicit base path (without extension).
    pub fn load_from_path(path: &str) -> Result<Self> {
        let environment = detect_environment();

        let builder = Config::builder()
            // Base file is optional so bare-environment deployments still boot.
            .add_source(File::with_name(path).format(FileFormat::Toml).required(false))
            // Environment-specific override file, e.g. config/alpharank-batch.production.toml
            .add_source(
                File::with_name(&format!("{path}.{environment}"))
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let config: BatchConfig = builder
            .build()
            .map_err(|e| BatchError::Configuration(format!("failed to read configuration: {e}")))?
            .try_deserialize()
            .map_err(|e| BatchError::Configuration(format!("invalid configuration: {e}")))?;

        debug!(
            environment = %environment,
            batch_size = config.execution.batch_size,
            max_execution_time_ms = config.execution.max_execution_time_ms,
            "Configuration loaded"
        );

        let manager = Self {
            config,
            environment,
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Build a manager directly from an in-memory configuration (tests, embedding).
    pub fn from_config(config: BatchConfig) -> Self {
        Self {
            config,
            environment: detect_environment(),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    fn validate(&self) -> Result<()> {
        let execution = &self.config.execution;
        if execution.max_execution_time_ms == 0 {
            return Err(BatchError::Configuration(
                "execution.max_execution_time_ms must be positive".to_string(),
            ));
        }
        if execution.batch_size == 0 {
            return Err(BatchError::Configuration(
                "execution.batch_size must be positive".to_string(),
            ));
        }
        if execution.worker_concurrency == 0 {
            return Err(BatchError::Configuration(
                "execution.worker_concurrency must be positive".to_string(),
            ));
        }
        if self.environment == "production" && self.config.auth.scheduler_secret.is_empty() {
            return Err(BatchError::Configuration(
                "auth.scheduler_secret must be set in production".to_string(),
            ));
        }
        info!(environment = %self.environment, "Configuration validated");
        Ok(())
    }
}

fn detect_environment() -> String {
    std::env::var("ALPHARANK_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}
