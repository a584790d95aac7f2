//! # Web Application State
//!
//! Shared state for the trigger handlers: the two executor variants, the
//! effective configuration, and (in Postgres deployments) the pool used by
//! the readiness probe.

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::BatchConfig;
use crate::engine::{TimeBoxedExecutor, WorkerPool};

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TimeBoxedExecutor>,
    pub worker_pool: Arc<WorkerPool>,
    pub config: Arc<BatchConfig>,
    /// Present when running against Postgres; used by the readiness probe.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new(executor: Arc<TimeBoxedExecutor>, config: Arc<BatchConfig>) -> Self {
        let worker_pool = Arc::new(WorkerPool::new(executor.clone()));
        Self {
            executor,
            worker_pool,
            config,
            db_pool: None,
        }
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}
