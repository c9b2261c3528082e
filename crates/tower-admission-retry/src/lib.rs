//! Deadline-aware retry middleware for Tower services.
//!
//! Failed calls are reissued up to a fixed attempt budget with exponential
//! backoff and bounded jitter between attempts. An optional deadline bounds
//! the whole sequence: attempts race it directly and a backoff wait that
//! would cross it gives up immediately, so the caller's latency ceiling is
//! `deadline` rather than `deadline + one stuck attempt`.
//!
//! A predicate controls which errors are retried; everything else is
//! returned to the caller after the first failure.
//!
//! # Usage
//!
//! ```rust
//! use tower_admission_retry::{RetryConfig, RetryLayer};
//! use tower::{Layer, service_fn};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config: RetryConfig<std::io::Error> = RetryConfig::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .deadline(Duration::from_secs(5))
//!     .retry_if(|e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut)
//!     .build();
//!
//! let service = RetryLayer::new(config).layer(service_fn(|req: String| async move {
//!     Ok::<_, std::io::Error>(req)
//! }));
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: retry outcome counters via the `metrics` crate
//! - `tracing`: attempt logging via the `tracing` crate

mod backoff;
mod config;
mod error;
mod events;
mod layer;
mod policy;

pub use backoff::BackoffSchedule;
pub use config::{RetryConfig, RetryConfigBuilder, RetryPredicate};
pub use error::RetryError;
pub use events::RetryEvent;
pub use layer::RetryLayer;
pub use policy::RetryPolicy;

use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower [`Service`] that retries failed requests.
///
/// The request type must be `Clone` so each attempt gets its own copy.
pub struct Retry<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
}

impl<S, E> Retry<S, E> {
    /// Creates a new `Retry` service wrapping the given service.
    pub fn new(inner: S, policy: RetryPolicy<E>) -> Self {
        Self { inner, policy }
    }
}

impl<S, E> Clone for Retry<S, E>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S, Req, E> Service<Req> for Retry<S, E>
where
    S: Service<Req, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
    E: Send + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|e| RetryError::Exhausted {
            attempts: 0,
            last: e,
        })
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let service = self.inner.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            policy
                .run(None, move || {
                    let mut service = service.clone();
                    let req = req.clone();
                    async move { service.call(req).await }
                })
                .await
        })
    }
}
