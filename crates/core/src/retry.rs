//! Bounded exponential backoff for transient store failures.

use std::time::Duration;

use rand::Rng;

/// Default number of attempts (first try included).
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BASE_MS: u64 = 50;

/// Default upper bound for a single backoff delay.
pub const DEFAULT_RETRY_MAX_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay before retrying after `attempt` (1-based) failed, with up to 50%
    /// random jitter added so replicas contending for one widget spread out.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = backoff_delay_ms(
            attempt,
            self.base_delay.as_millis() as u64,
            self.max_delay.as_millis() as u64,
        );
        let jitter = if base > 1 {
            rand::rng().random_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_delay.as_millis() as u64))
    }
}

/// `base * 2^(attempt - 1)`, capped at `max`.
pub fn backoff_delay_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exponent = attempt.saturating_sub(1).min(32);
    base_ms.saturating_mul(1u64 << exponent).min(max_ms)
}
