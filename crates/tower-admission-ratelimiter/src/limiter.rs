use crate::bucket::TokenBucket;
use crate::config::RateLimiterConfig;
use crate::events::RateLimiterEvent;
use dashmap::DashMap;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_admission_core::SourceKey;

struct KeyState {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// A map of token buckets keyed by [`SourceKey`].
///
/// Buckets are created lazily on the first admission decision for a key and
/// start full. The map is sharded, so admission decisions for unrelated keys
/// do not serialize; decisions for the same key are strictly ordered.
pub struct KeyedRateLimiter {
    keys: DashMap<SourceKey, KeyState>,
    config: Arc<RateLimiterConfig>,
}

impl KeyedRateLimiter {
    /// Creates a new keyed limiter from the given configuration.
    pub fn new(config: Arc<RateLimiterConfig>) -> Self {
        Self {
            keys: DashMap::new(),
            config,
        }
    }

    /// Decides admission for one request under `key`.
    ///
    /// Non-blocking: returns `Ok(())` if a token was consumed, or
    /// `Err(retry_after)` with the time until the bucket holds a whole token
    /// again. The caller maps a rejection to a 429-equivalent outcome and
    /// must not retry it.
    pub fn try_admit(&self, key: &SourceKey) -> Result<(), Duration> {
        let decision = {
            let mut entry = self
                .keys
                .entry(key.clone())
                .or_insert_with(|| KeyState {
                    bucket: TokenBucket::full(self.config.burst),
                    last_seen: Instant::now(),
                });
            entry.last_seen = Instant::now();
            entry
                .bucket
                .try_admit(self.config.rate, self.config.burst)
        };

        match decision {
            Ok(()) => {
                self.config
                    .event_listeners
                    .emit(&RateLimiterEvent::Admitted {
                        gate_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                    });

                #[cfg(feature = "tracing")]
                tracing::trace!(limiter = %self.config.name, key = %key, "request admitted");

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_decisions_total", "limiter" => self.config.name.clone(), "outcome" => "admitted")
                    .increment(1);

                Ok(())
            }
            Err(retry_after) => {
                self.config
                    .event_listeners
                    .emit(&RateLimiterEvent::Rejected {
                        gate_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        key: key.clone(),
                        retry_after,
                    });

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    limiter = %self.config.name,
                    key = %key,
                    retry_after = ?retry_after,
                    "request rejected by rate limiter"
                );

                #[cfg(feature = "metrics")]
                counter!("ratelimiter_decisions_total", "limiter" => self.config.name.clone(), "outcome" => "rejected")
                    .increment(1);

                Err(retry_after)
            }
        }
    }

    /// Removes buckets that have not been touched for `max_idle`.
    ///
    /// Returns the number of keys evicted. An evicted key that reappears is
    /// recreated with a full bucket, which is the same treatment a brand-new
    /// key receives.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        // Counted inside the closure; len() before/after would race with
        // concurrent inserts.
        let mut evicted = 0;
        self.keys.retain(|_, state| {
            let keep = state.last_seen.elapsed() < max_idle;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Returns the number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
