//! Exponential backoff retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for(1)`). Capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.saturating_sub(1) as i32);
        let raw = (self.base_delay_ms as f64 * exp).round();
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn retries_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 3000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        // Capped from here on.
        assert_eq!(policy.delay_for(4), Duration::from_millis(3000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(3000));
    }

    #[test]
    fn sequence_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut last = Duration::ZERO;
        for attempt in 1..10 {
            let d = policy.delay_for(attempt);
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.retries_remaining(1));
        assert!(policy.retries_remaining(2));
        assert!(!policy.retries_remaining(3));
    }
}
