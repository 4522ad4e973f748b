//! Exponential backoff schedule.
//!
//! Pure arithmetic: callers decide how to wait. The session manager uses it
//! between identity-service attempts and resuming subscribers use it between
//! reconnects.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Delay schedule `initial_ms × multiplier^attempt`, capped at `max_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_ms: u64,
    /// Upper bound for any single delay.
    pub max_ms: u64,
    /// Growth factor per attempt. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    /// Total attempts including the first one. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 100,
            max_ms: 5_000,
            multiplier: 2.0,
            max_attempts: Some(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        let ms = (self.initial_ms as f64 * factor).min(self.max_ms as f64);
        Duration::from_millis(ms as u64)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}
