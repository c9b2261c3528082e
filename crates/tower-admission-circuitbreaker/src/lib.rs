//! Per-route circuit breaking for Tower services.
//!
//! Each route (method + path template) gets an independent breaker created
//! lazily from a shared config template. A breaker counts completed calls in
//! a rolling window while Closed and trips Open when the window holds at
//! least `min_requests` samples with a failure rate at or above
//! `failure_ratio`. After `timeout`, up to `max_requests` trial calls probe
//! the downstream; any trial failure reopens, a full budget of successes
//! closes.
//!
//! Every permit carries the generation of the window it was issued under.
//! Results for a superseded generation are discarded, so a slow in-flight
//! call cannot pollute counts after a reset or transition.
//!
//! # Usage
//!
//! ```rust
//! use tower_admission_circuitbreaker::{BreakerConfig, RouteCircuitBreakerLayer};
//! use tower::{Layer, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = BreakerConfig::builder()
//!     .failure_ratio(0.6)
//!     .min_requests(10)
//!     .timeout(Duration::from_secs(60))
//!     .build();
//!
//! let layer = RouteCircuitBreakerLayer::new(config, |req: &String| req.clone());
//!
//! let service = layer.layer(service_fn(|req: String| async move {
//!     Ok::<_, std::io::Error>(req)
//! }));
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: state gauges and call counters via the `metrics` crate
//! - `tracing`: transition logging via the `tracing` crate

mod breaker;
mod classifier;
mod config;
mod error;
mod events;
mod layer;
mod registry;

pub use breaker::{Breaker, BreakerSnapshot, CircuitState, Permit};
pub use classifier::{DefaultClassifier, FailureClassifier, FnClassifier};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::RouteCircuitBreakerLayer;
pub use registry::BreakerRegistry;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower [`Service`] that guards each route with its own circuit breaker.
pub struct RouteCircuitBreaker<S, F, C> {
    inner: S,
    registry: Arc<BreakerRegistry>,
    route_fn: Arc<F>,
    classifier: Arc<C>,
}

impl<S, F, C> RouteCircuitBreaker<S, F, C> {
    /// Creates a new `RouteCircuitBreaker` wrapping the given service.
    pub fn new(
        inner: S,
        registry: Arc<BreakerRegistry>,
        route_fn: Arc<F>,
        classifier: Arc<C>,
    ) -> Self {
        Self {
            inner,
            registry,
            route_fn,
            classifier,
        }
    }

    /// Returns the shared breaker registry.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }
}

impl<S, F, C> Clone for RouteCircuitBreaker<S, F, C>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: Arc::clone(&self.registry),
            route_fn: Arc::clone(&self.route_fn),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, F, C, Req> Service<Req> for RouteCircuitBreaker<S, F, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: Send + 'static,
    F: Fn(&Req) -> String + Send + Sync + 'static,
    C: FailureClassifier<S::Response, S::Error> + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let route = (self.route_fn)(&req);
        let breaker = self.registry.breaker(&route);
        let classifier = Arc::clone(&self.classifier);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let Some(permit) = breaker.try_acquire() else {
                return Err(CircuitBreakerError::Open { name: route });
            };

            let result = inner.call(req).await;
            breaker.record(permit.generation(), !classifier.is_failure(&result));
            result.map_err(CircuitBreakerError::Inner)
        })
    }
}
