//! Countdown Timer
//!
//! A single timeout budget shared by consecutive waits.

use std::time::Duration;
use tokio::time::Instant;

/// Fixed timeout budget measured from construction
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    timeout: Duration,
    started: Instant,
}

impl Countdown {
    /// Start a countdown of `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            started: Instant::now(),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// The configured total
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time since construction
    pub fn time_elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Budget still available, floored at zero
    pub fn time_left(&self) -> Duration {
        self.timeout.saturating_sub(self.time_elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.time_left().is_zero()
    }
}
