//! Fixed-rate tick cadence.
//!
//! The loop targets deadlines at `start + k × period`. When a tick finishes
//! early the loop sleeps until the next deadline. When it overruns, the next
//! tick starts immediately and the schedule is rebased to that moment, so
//! skipped deadlines are never replayed as a burst of catch-up ticks.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use engine_component::{EcsError, Result};

/// Configuration for the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    /// An unbounded loop at `tick_rate` ticks per second.
    #[must_use]
    pub fn unbounded(tick_rate: f64) -> Self {
        Self {
            tick_rate,
            max_ticks: 0,
        }
    }

    /// The time budget of one tick.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidTickRate`] unless the rate is positive and
    /// finite.
    pub fn period(&self) -> Result<Duration> {
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(EcsError::InvalidTickRate(self.tick_rate));
        }
        Duration::try_from_secs_f64(1.0 / self.tick_rate)
            .map_err(|_| EcsError::InvalidTickRate(self.tick_rate))
    }

    /// Returns `true` once `completed` ticks exhaust the configured limit.
    #[must_use]
    pub fn is_done(&self, completed: u64) -> bool {
        self.max_ticks > 0 && completed >= self.max_ticks
    }
}

/// What the loop should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Sleep this long before the next tick.
    Sleep(Duration),
    /// The deadline passed this long ago; run the next tick right away.
    Overrun(Duration),
}

/// Deadline tracker for a fixed-rate loop.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next: Instant,
}

impl Cadence {
    /// Start a cadence whose first tick began at `start`.
    #[must_use]
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
        }
    }

    /// The time budget of one tick.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Decide how to wait after a tick that finished at `now`, and advance
    /// the deadline.
    pub fn pace(&mut self, now: Instant) -> Pace {
        if now < self.next {
            let wait = self.next - now;
            self.next += self.period;
            Pace::Sleep(wait)
        } else {
            let behind = now - self.next;
            self.next = now + self.period;
            Pace::Overrun(behind)
        }
    }
}
