use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule with bounded jitter.
///
/// The wait before retry `n` (zero-based) is `base * 2^n`, capped at
/// `max_delay`, plus a uniformly random jitter in `[0, jitter]`. The cap
/// applies before jitter, so the effective ceiling is `max_delay + jitter`.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    base: Duration,
    max_delay: Duration,
    jitter: Duration,
}

impl BackoffSchedule {
    /// Creates a schedule starting at `base` per attempt.
    pub fn new(base: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter,
        }
    }

    /// Returns the wait before the retry following failed attempt `attempt`
    /// (zero-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.min(31) as u32;
        let exponential = self.base.saturating_mul(1u32 << shift);
        let capped = exponential.min(self.max_delay);

        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    /// The deterministic (jitter-free) portion of the delay for `attempt`.
    pub fn base_delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.min(31) as u32;
        self.base.saturating_mul(1u32 << shift).min(self.max_delay)
    }
}

impl Default for BackoffSchedule {
    /// 100ms base, 15s cap, 100ms jitter.
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(15),
            jitter: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt_until_the_cap() {
        let schedule = BackoffSchedule::new(
            Duration::from_millis(100),
            Duration::from_millis(350),
            Duration::ZERO,
        );
        assert_eq!(schedule.delay_for(0), Duration::from_millis(100));
        assert_eq!(schedule.delay_for(1), Duration::from_millis(200));
        assert_eq!(schedule.delay_for(2), Duration::from_millis(350));
        assert_eq!(schedule.delay_for(3), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_its_bound() {
        let schedule = BackoffSchedule::new(
            Duration::from_millis(100),
            Duration::from_secs(15),
            Duration::from_millis(50),
        );
        for _ in 0..100 {
            let delay = schedule.delay_for(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn large_attempt_numbers_do_not_overflow() {
        let schedule = BackoffSchedule::new(
            Duration::from_millis(100),
            Duration::from_secs(15),
            Duration::ZERO,
        );
        assert_eq!(schedule.delay_for(1000), Duration::from_secs(15));
    }
}
