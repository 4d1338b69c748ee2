//! Monotonic invocation clock.
//!
//! Uses `tokio::time::Instant` so tests can drive elapsed time with a paused
//! runtime instead of real sleeps.

use std::time::Duration;
use tokio::time::Instant;

/// Start timestamp plus the elapsed-time threshold for one invocation
#[derive(Debug, Clone, Copy)]
pub struct JobClock {
    started_at: Instant,
    budget: Duration,
}

impl JobClock {
    /// Record the invocation start
    pub fn start(budget: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// True once elapsed time reaches the threshold
    pub fn is_exhausted(&self) -> bool {
        self.elapsed() >= self.budget
    }
}
