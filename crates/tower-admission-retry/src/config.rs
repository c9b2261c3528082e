use crate::backoff::BackoffSchedule;
use crate::events::RetryEvent;
use std::sync::Arc;
use std::time::Duration;
use tower_admission_core::events::{EventListeners, FnListener};

/// Predicate deciding whether an error is worth retrying.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Configuration for the retry executor.
pub struct RetryConfig<E> {
    pub(crate) max_attempts: usize,
    pub(crate) schedule: BackoffSchedule,
    pub(crate) predicate: Option<RetryPredicate<E>>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl<E> RetryConfig<E> {
    /// Returns a new builder.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    predicate: Option<RetryPredicate<E>>,
    deadline: Option<Duration>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3 (the first attempt plus 2 retries)
    /// - base_delay: 100ms, doubling per attempt
    /// - max_delay: 15s
    /// - jitter: up to 100ms per wait
    /// - deadline: none
    /// - predicate: every error is retryable
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(15),
            jitter: Duration::from_millis(100),
            predicate: None,
            deadline: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the total attempt budget, including the initial attempt.
    ///
    /// Clamped to at least 1 on build.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the wait before the first retry. Each further retry doubles it.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Caps the deterministic portion of any single wait.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the upper bound of the random jitter added to each wait.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Bounds the whole retry sequence, waits included. When the deadline
    /// expires mid-attempt or the next wait would cross it, the executor
    /// gives up with a deadline error.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a predicate deciding which errors are retried. Errors it
    /// rejects are returned to the caller after the first failure.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the name for this executor instance (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked before each retry wait.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retrying { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked when an attempt succeeds.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Succeeded { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when the attempt budget runs out.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RetryConfig<E> {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            schedule: BackoffSchedule::new(self.base_delay, self.max_delay, self.jitter),
            predicate: self.predicate,
            deadline: self.deadline,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config: RetryConfig<String> = RetryConfigBuilder::new().build();
        assert_eq!(config.max_attempts, 3);
        assert!(config.deadline.is_none());
        assert!(config.predicate.is_none());
        assert_eq!(config.name, "<unnamed>");
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let config: RetryConfig<String> = RetryConfig::builder().max_attempts(0).build();
        assert_eq!(config.max_attempts, 1);
    }
}
