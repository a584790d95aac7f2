//! # Clock and Time Budget
//!
//! The executor never reads time directly; it goes through the [`Clock`]
//! seam so the timeout behavior is deterministic under test. [`TimeBudget`]
//! is the cooperative-timeout primitive shared by the executor and the
//! sub-task runner: the loop checks it between items and between sub-units,
//! never preempting a step mid-flight.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of both monotonic and wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic timeout tests.
pub struct ManualClock {
    epoch: Instant,
    state: Mutex<ManualState>,
}

struct ManualState {
    elapsed: Duration,
    wall: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            epoch: Instant::now(),
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            }),
        }
    }

    /// Advance both monotonic and wall time.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.elapsed += by;
        state.wall += chrono::Duration::from_std(by).expect("duration out of range");
    }

    pub fn set_wall(&self, wall: DateTime<Utc>) {
        self.state.lock().wall = wall;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + self.state.lock().elapsed
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.state.lock().wall
    }
}

/// Wall-clock budget for one invocation, kept below the host's hard limit.
#[derive(Clone)]
pub struct TimeBudget {
    clock: Arc<dyn Clock>,
    start: Instant,
    max: Duration,
}

impl TimeBudget {
    pub fn start(clock: Arc<dyn Clock>, max: Duration) -> Self {
        let start = clock.now();
        Self { clock, start, max }
    }

    /// Whether the budget has been consumed. Checked between items and
    /// sub-units only; a step in flight is never interrupted.
    pub fn expired(&self) -> bool {
        self.elapsed() >= self.max
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }
}
