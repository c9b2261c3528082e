//! Per-source token-bucket admission for Tower services.
//!
//! Each admission key (client address + method + route, see
//! [`SourceKey`](tower_admission_core::SourceKey)) gets its own token bucket,
//! created on first use with a full burst. A request consumes one token; an
//! empty bucket rejects immediately with no blocking variant. The caller maps
//! a rejection to a 429-equivalent outcome and never retries it.
//!
//! # Usage
//!
//! ```rust
//! use tower_admission_ratelimiter::{RateLimiterConfig, SourceRateLimiterLayer};
//! use tower_admission_core::{FnResolver, SourceKey};
//! use tower::{Layer, service_fn};
//!
//! # async fn example() {
//! let config = RateLimiterConfig::builder()
//!     .rate(10.0)
//!     .burst(20)
//!     .name("api")
//!     .build();
//!
//! let layer = SourceRateLimiterLayer::new(
//!     config,
//!     FnResolver::new(|req: &String| SourceKey::new(req, "GET", "/widgets")),
//! );
//!
//! let service = layer.layer(service_fn(|req: String| async move {
//!     Ok::<_, std::io::Error>(req)
//! }));
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: admission decision counters via the `metrics` crate
//! - `tracing`: decision logging via the `tracing` crate

mod bucket;
mod config;
mod error;
mod events;
mod layer;
mod limiter;

pub use config::{MIN_RATE, RateLimiterConfig, RateLimiterConfigBuilder};
pub use error::RateLimitError;
pub use events::RateLimiterEvent;
pub use layer::SourceRateLimiterLayer;
pub use limiter::KeyedRateLimiter;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tower_admission_core::KeyResolver;

/// A Tower [`Service`] that gates requests through per-source token buckets.
pub struct SourceRateLimiter<S, R> {
    inner: S,
    limiter: Arc<KeyedRateLimiter>,
    resolver: Arc<R>,
}

impl<S, R> SourceRateLimiter<S, R> {
    /// Creates a new `SourceRateLimiter` wrapping the given service.
    pub fn new(inner: S, limiter: Arc<KeyedRateLimiter>, resolver: Arc<R>) -> Self {
        Self {
            inner,
            limiter,
            resolver,
        }
    }

    /// Returns the shared keyed limiter, e.g. for idle sweeps.
    pub fn limiter(&self) -> &Arc<KeyedRateLimiter> {
        &self.limiter
    }
}

impl<S, R> Clone for SourceRateLimiter<S, R>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S, R, Req> Service<Req> for SourceRateLimiter<S, R>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    R: KeyResolver<Req> + 'static,
{
    type Response = S::Response;
    type Error = RateLimitError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RateLimitError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = self.resolver.resolve(&req);
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match limiter.try_admit(&key) {
                Ok(()) => inner.call(req).await.map_err(RateLimitError::Inner),
                Err(retry_after) => Err(RateLimitError::RateLimitExceeded { retry_after }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::{service_fn, Layer, ServiceExt};
    use tower_admission_core::{FnResolver, SourceKey};

    fn per_client_layer(
        rate: f64,
        burst: u32,
    ) -> SourceRateLimiterLayer<FnResolver<impl Fn(&String) -> SourceKey + Send + Sync>> {
        SourceRateLimiterLayer::new(
            RateLimiterConfig::builder().rate(rate).burst(burst).build(),
            FnResolver::new(|client: &String| SourceKey::new(client, "GET", "/things")),
        )
    }

    #[tokio::test]
    async fn admits_within_burst_then_rejects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let service = service_fn(move |_req: String| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>("ok")
            }
        });

        let mut service = per_client_layer(1.0, 3).layer(service);

        for _ in 0..3 {
            let result = service.ready().await.unwrap().call("client-a".into()).await;
            assert!(result.is_ok());
        }

        let result = service.ready().await.unwrap().call("client-a".into()).await;
        assert!(matches!(
            result.unwrap_err(),
            RateLimitError::RateLimitExceeded { .. }
        ));
        // The downstream was never invoked for the rejected request.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn distinct_clients_do_not_share_buckets() {
        let service =
            service_fn(|_req: String| async move { Ok::<_, std::io::Error>("ok") });
        let mut service = per_client_layer(1.0, 1).layer(service);

        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".into())
            .await
            .is_ok());
        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".into())
            .await
            .is_err());
        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-b".into())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn tokens_refill_at_the_configured_rate() {
        let service =
            service_fn(|_req: String| async move { Ok::<_, std::io::Error>("ok") });
        // 50 tokens/sec: one token is back roughly every 20ms.
        let mut service = per_client_layer(50.0, 1).layer(service);

        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".into())
            .await
            .is_ok());
        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".into())
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".into())
            .await
            .is_ok());
    }
}
