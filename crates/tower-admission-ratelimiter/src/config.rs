use crate::events::RateLimiterEvent;
use std::time::Duration;
use tower_admission_core::events::{EventListeners, FnListener};
use tower_admission_core::SourceKey;

/// Configuration for the per-source rate limiter.
pub struct RateLimiterConfig {
    pub(crate) rate: f64,
    pub(crate) burst: f64,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Returns a new builder.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    rate: f64,
    burst: u32,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - rate: 50 tokens/second
    /// - burst: 100
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            rate: 50.0,
            burst: 100,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the refill rate in tokens per second.
    ///
    /// Values at or below zero are clamped to a minimum positive rate at
    /// build time, so the rejection wait stays finite.
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Sets the bucket capacity. A key may burst up to this many requests
    /// before the refill rate governs.
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Sets the name for this limiter instance (used in events and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked when a request is admitted.
    ///
    /// The callback receives the admission key.
    pub fn on_admitted<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceKey) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Admitted { key, .. } = event {
                f(key);
            }
        }));
        self
    }

    /// Registers a callback invoked when a request is rejected.
    ///
    /// The callback receives the admission key and the time until one token
    /// refills for that key.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceKey, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::Rejected {
                key, retry_after, ..
            } = event
            {
                f(key, *retry_after);
            }
        }));
        self
    }

    /// Builds the configuration. The rate is clamped to at least
    /// [`MIN_RATE`] tokens per second.
    pub fn build(self) -> RateLimiterConfig {
        RateLimiterConfig {
            rate: if self.rate >= MIN_RATE { self.rate } else { MIN_RATE },
            burst: f64::from(self.burst),
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

/// Lowest accepted refill rate, one token per ~11.5 days.
pub const MIN_RATE: f64 = 1e-6;
