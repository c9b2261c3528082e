use crate::{KeyedRateLimiter, RateLimiterConfig, SourceRateLimiter};
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies per-source token-bucket admission.
///
/// All services produced by one layer share the same keyed bucket map, so a
/// cloned service stack still enforces a single limit per key.
#[derive(Clone)]
pub struct SourceRateLimiterLayer<R> {
    limiter: Arc<KeyedRateLimiter>,
    resolver: Arc<R>,
}

impl<R> SourceRateLimiterLayer<R> {
    /// Creates a new layer from a configuration and a key resolver.
    pub fn new(config: RateLimiterConfig, resolver: R) -> Self {
        Self {
            limiter: Arc::new(KeyedRateLimiter::new(Arc::new(config))),
            resolver: Arc::new(resolver),
        }
    }

    /// Creates a layer around an existing shared limiter.
    pub fn with_limiter(limiter: Arc<KeyedRateLimiter>, resolver: R) -> Self {
        Self {
            limiter,
            resolver: Arc::new(resolver),
        }
    }

    /// Returns the shared keyed limiter, e.g. for idle sweeps.
    pub fn limiter(&self) -> &Arc<KeyedRateLimiter> {
        &self.limiter
    }
}

impl<S, R> Layer<S> for SourceRateLimiterLayer<R> {
    type Service = SourceRateLimiter<S, R>;

    fn layer(&self, service: S) -> Self::Service {
        SourceRateLimiter::new(
            service,
            Arc::clone(&self.limiter),
            Arc::clone(&self.resolver),
        )
    }
}
