//! Retry policy: decides backoff delays.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Retry policy for failed deliveries.
///
/// Unbounded exponential backoff: `delay = base_delay * multiplier^error_count`.
/// With the defaults (60s, x2) the first failure waits 2 minutes, then 4, 8, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: u32) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Delay before the next attempt, given the error count *after* the
    /// failure was counted. Saturates instead of overflowing.
    ///
    /// Example with base_delay=60s, multiplier=2:
    /// - error_count 1: 2m
    /// - error_count 2: 4m
    /// - error_count 3: 8m
    pub fn next_delay(&self, error_count: u32) -> Duration {
        let factor = u128::from(self.multiplier)
            .checked_pow(error_count)
            .unwrap_or(u128::MAX);
        let millis = self.base_delay.as_millis().saturating_mul(factor);
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// When a message that just failed becomes visible again.
    pub fn next_visibility(&self, now: DateTime<Utc>, error_count: u32) -> DateTime<Utc> {
        TimeDelta::from_std(self.next_delay(error_count))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
