//! Backoff schedule for the outer retry loop.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let mut delay_ms = self.config.initial_delay_ms as f64 * 2f64.powi(attempt as i32);
        if rate_limited {
            delay_ms *= self.config.rate_limit_factor;
        }
        let delay_ms = delay_ms.min(self.config.max_delay_ms as f64);
        Duration::from_millis(delay_ms as u64)
    }

    /// Delay before retry number `attempt`, with uniform jitter added.
    /// Rate-limited failures get twice the jitter range.
    pub fn delay_for_attempt(&self, attempt: u32, rate_limited: bool) -> Duration {
        let base = self.base_delay(attempt, rate_limited);
        let jitter_cap = if rate_limited {
            self.config.jitter_ms.saturating_mul(2)
        } else {
            self.config.jitter_ms
        };
        if jitter_cap == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        base.saturating_add(Duration::from_millis(jitter))
    }
}
