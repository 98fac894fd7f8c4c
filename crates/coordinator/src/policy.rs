//! Retry ceiling and backoff schedule.

use std::time::Duration;

/// How often and how patiently a confirmation is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total invocations allowed, first attempt included. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays. Values below 1.0 are treated as 1.0.
    pub multiplier: f64,
    /// Per-attempt time limit; an attempt exceeding it counts as a transport failure.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Returns the delay to wait after `attempt` (1-based) has failed.
    ///
    /// Non-decreasing in `attempt` and never above `max_backoff`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let cap = self.max_backoff.as_secs_f64();
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(cap);
        if secs.is_finite() && secs >= 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            self.max_backoff
        }
    }

    /// Returns the effective ceiling.
    pub fn attempt_ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            attempt_timeout: None,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }

    #[test]
    fn test_delays_never_decrease() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..64 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.max_backoff);
            previous = delay;
        }
    }

    #[test]
    fn test_huge_attempt_numbers_stay_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), policy.max_backoff);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::immediate(0);
        assert_eq!(policy.attempt_ceiling(), 1);
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }
}
