//! Bounded, jittered retry policy for optimistic-concurrency conflicts.
//!
//! Two allocations racing on the same pool both read version `v`; the loser's
//! compare-and-swap fails and it retries after a randomised delay so that the
//! contenders spread out instead of colliding again in lock-step.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay ceiling before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

/// Default number of allocation attempts before reporting contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Exponential ceiling for retry number `retry` (1-based), clamped to
    /// [`RetryPolicy::max_delay`].
    pub fn ceiling(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// "Full jitter" delay: uniform in `[0, ceiling(retry)]`.
    pub fn delay<R: Rng + ?Sized>(&self, retry: u32, rng: &mut R) -> Duration {
        let ceiling_ms = self.ceiling(retry).as_millis() as u64;
        Duration::from_millis(rng.random_range(0..=ceiling_ms))
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn ceiling_doubles_until_clamped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(1), Duration::from_millis(25));
        assert_eq!(policy.ceiling(2), Duration::from_millis(50));
        assert_eq!(policy.ceiling(3), Duration::from_millis(100));
        assert_eq!(policy.ceiling(10), Duration::from_millis(400));
    }

    #[test]
    fn jittered_delay_stays_within_ceiling() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(1);
        for retry in 1..=6 {
            for _ in 0..50 {
                assert!(policy.delay(retry, &mut rng) <= policy.ceiling(retry));
            }
        }
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(4));
        assert!(!policy.should_retry(5));
    }

    #[test]
    fn huge_retry_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(u32::MAX), policy.max_delay);
    }
}
