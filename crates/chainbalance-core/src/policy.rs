//! Exponential backoff between attempts.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Stateless backoff policy: computes the delay before a given retry.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub config: BackoffConfig,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig, max_retries: u32) -> Self {
        Self {
            config,
            max_retries,
        }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;

        Some(Duration::from_millis(base_ms.min(cap_ms) as u64))
    }
}
