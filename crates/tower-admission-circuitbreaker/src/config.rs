use crate::breaker::CircuitState;
use crate::events::CircuitBreakerEvent;
use std::time::Duration;
use tower_admission_core::events::{EventListeners, FnListener};

/// Configuration for a circuit breaker.
#[derive(Clone)]
pub struct BreakerConfig {
    pub(crate) failure_ratio: f64,
    pub(crate) min_requests: u64,
    pub(crate) max_requests: u64,
    pub(crate) interval: Duration,
    pub(crate) timeout: Duration,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Returns a new builder.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }

    /// Returns a copy of this configuration with a different breaker name.
    ///
    /// Used by the registry to stamp each per-route breaker with its route.
    pub fn with_name<S: Into<String>>(&self, name: S) -> Self {
        let mut config = self.clone();
        config.name = name.into();
        config
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_ratio: f64,
    min_requests: u64,
    max_requests: u64,
    interval: Duration,
    timeout: Duration,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - failure_ratio: 0.6
    /// - min_requests: 10
    /// - max_requests: 100
    /// - interval: 10s
    /// - timeout: 60s
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            failure_ratio: 0.6,
            min_requests: 10,
            max_requests: 100,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the failure rate at or above which a Closed breaker trips.
    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    /// Sets the minimum completed calls in a window before the ratio is
    /// evaluated.
    pub fn min_requests(mut self, min: u64) -> Self {
        self.min_requests = min;
        self
    }

    /// Sets the trial call budget while half-open.
    ///
    /// Clamped to at least 1 on build, otherwise an Open breaker could
    /// never probe its way back to Closed.
    pub fn max_requests(mut self, max: u64) -> Self {
        self.max_requests = max;
        self
    }

    /// Sets the Closed-state counting window length.
    ///
    /// A zero interval disables periodic resets.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long an Open breaker waits before admitting a trial call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the name for this breaker instance (used in events and metrics).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked on every state transition.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition {
                gate_name,
                from,
                to,
                ..
            } = event
            {
                f(gate_name, *from, *to);
            }
        }));
        self
    }

    /// Registers a callback invoked when a call is rejected.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::CallRejected { gate_name, .. } = event {
                f(gate_name);
            }
        }));
        self
    }

    /// Registers a callback invoked when a stale result is discarded.
    pub fn on_stale_result<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StaleResultDropped {
                gate_name,
                generation,
                ..
            } = event
            {
                f(gate_name, *generation);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        BreakerConfig {
            failure_ratio: self.failure_ratio,
            min_requests: self.min_requests,
            max_requests: self.max_requests.max(1),
            interval: self.interval,
            timeout: self.timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
