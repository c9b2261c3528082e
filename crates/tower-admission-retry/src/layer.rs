use crate::config::RetryConfig;
use crate::policy::RetryPolicy;
use crate::Retry;
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that retries failed requests.
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
}

impl<E> RetryLayer<E> {
    /// Creates a new layer from a configuration.
    pub fn new(config: RetryConfig<E>) -> Self {
        Self {
            policy: RetryPolicy::new(Arc::new(config)),
        }
    }

    /// Creates a layer around an existing policy.
    pub fn with_policy(policy: RetryPolicy<E>) -> Self {
        Self { policy }
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
        }
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = Retry<S, E>;

    fn layer(&self, service: S) -> Self::Service {
        Retry::new(service, self.policy.clone())
    }
}
