use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub fn backoff_ms(attempt: u32, base_ms: u64, factor: f64, jitter_ms: u64) -> u64 {
    let pow = factor.powi((attempt.saturating_sub(1)) as i32);
    let core = (base_ms as f64 * pow).round() as u64;
    let jitter = if jitter_ms > 0 { rand::rng().random_range(0..=jitter_ms) } else { 0 };
    core + jitter
}

/// How many times a retryable read is re-sent, and how long to wait between
/// attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_ms: u64,
    pub factor: f64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_ms: 250, factor: 2.0, jitter_ms: 100 }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(backoff_ms(attempt, self.base_ms, self.factor, self.jitter_ms))
    }
}
