use std::time::{Duration, Instant};

/// A single token bucket.
///
/// Invariant: `0.0 <= tokens <= burst`. Refill is monotonic in wall-clock
/// time; `last_refill` only ever advances.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket filled to full burst capacity, favoring initial
    /// admission for a key seen for the first time.
    pub(crate) fn full(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    /// Refills tokens accrued since the last call, then consumes one token
    /// if available.
    ///
    /// Returns `Ok(())` on admission, or `Err(wait)` with the time until a
    /// whole token will be available. The refill is applied either way.
    pub(crate) fn try_admit(&mut self, rate: f64, burst: f64) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / rate))
        }
    }

    #[cfg(test)]
    pub(crate) fn tokens(&self) -> f64 {
        self.tokens
    }
}
