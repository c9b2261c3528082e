use crate::classifier::DefaultClassifier;
use crate::config::BreakerConfig;
use crate::registry::BreakerRegistry;
use crate::RouteCircuitBreaker;
use std::sync::Arc;
use tower::Layer;

/// A Tower [`Layer`] that applies per-route circuit breaking.
///
/// All services produced by one layer share the same breaker registry, so a
/// cloned service stack still observes a single breaker per route.
pub struct RouteCircuitBreakerLayer<F, C = DefaultClassifier> {
    registry: Arc<BreakerRegistry>,
    route_fn: Arc<F>,
    classifier: Arc<C>,
}

impl<F> RouteCircuitBreakerLayer<F, DefaultClassifier> {
    /// Creates a new layer from a config template and a route function.
    ///
    /// Errors from the downstream count as failures; responses do not.
    pub fn new(config: BreakerConfig, route_fn: F) -> Self {
        Self {
            registry: Arc::new(BreakerRegistry::new(config)),
            route_fn: Arc::new(route_fn),
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl<F, C> RouteCircuitBreakerLayer<F, C> {
    /// Creates a layer around an existing shared registry.
    pub fn with_registry(registry: Arc<BreakerRegistry>, route_fn: F, classifier: C) -> Self {
        Self {
            registry,
            route_fn: Arc::new(route_fn),
            classifier: Arc::new(classifier),
        }
    }

    /// Replaces the failure classifier.
    pub fn classifier<C2>(self, classifier: C2) -> RouteCircuitBreakerLayer<F, C2> {
        RouteCircuitBreakerLayer {
            registry: self.registry,
            route_fn: self.route_fn,
            classifier: Arc::new(classifier),
        }
    }

    /// Returns the shared breaker registry, e.g. for idle sweeps or
    /// manual controls.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }
}

impl<F, C> Clone for RouteCircuitBreakerLayer<F, C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            route_fn: Arc::clone(&self.route_fn),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, F, C> Layer<S> for RouteCircuitBreakerLayer<F, C> {
    type Service = RouteCircuitBreaker<S, F, C>;

    fn layer(&self, service: S) -> Self::Service {
        RouteCircuitBreaker::new(
            service,
            Arc::clone(&self.registry),
            Arc::clone(&self.route_fn),
            Arc::clone(&self.classifier),
        )
    }
}
