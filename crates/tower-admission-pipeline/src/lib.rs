//! Composed request admission for Tower services.
//!
//! [`AdmissionPipeline`] runs each request through three gates in order:
//!
//! 1. A per-source token-bucket rate limiter keyed by
//!    `client:METHOD:route`.
//! 2. A per-route circuit breaker with generation-tagged permits.
//! 3. A deadline-aware retry executor with exponential backoff.
//!
//! A request rejected by an earlier gate never reaches a later one; in
//! particular a rate-limited request is not counted by the breaker and is
//! never retried. Every terminal outcome, including rejections and
//! recovered panics, produces exactly one [`ObservationRecord`] for the
//! metrics and log sinks.
//!
//! The whole downstream call is wrapped in panic recovery, so a panicking
//! handler is reported as `AdmissionError::PanicRecovered` instead of
//! tearing down the connection task.
//!
//! # Usage
//!
//! ```rust
//! use tower_admission_pipeline::{AdmissionPipelineLayer, PipelineConfig};
//! use tower_admission_core::{FnResolver, SourceKey};
//! use tower::{Layer, service_fn};
//!
//! # async fn example() {
//! let config: PipelineConfig = serde_json::from_str(
//!     r#"{ "name": "api", "retry": { "max_attempts": 3, "deadline_ms": 2000 } }"#,
//! ).unwrap();
//!
//! let layer = AdmissionPipelineLayer::<std::io::Error, _>::new(
//!     config,
//!     FnResolver::new(|req: &String| SourceKey::new(req, "GET", "/things")),
//! );
//!
//! let service = layer.layer(service_fn(|req: String| async move {
//!     Ok::<_, std::io::Error>(req)
//! }));
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: request counters, duration histograms, in-flight gauges
//! - `tracing`: structured decision logging
//! - `http`: helpers for `http::Request` stacks (key resolution,
//!   correlation ids, status mapping)

mod config;
#[cfg(feature = "http")]
pub mod http;
mod observe;
mod sweeper;

pub use config::{
    CircuitBreakerSection, PipelineConfig, RateLimitSection, RetrySection,
};
pub use observe::{ObservationRecord, Outcome};
pub use sweeper::spawn_idle_sweeper;
pub use tower_admission_core::AdmissionError;

use futures::future::BoxFuture;
use futures::FutureExt;
use observe::InFlightGuard;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;
use tower_admission_circuitbreaker::{
    BreakerRegistry, CircuitState, DefaultClassifier, FailureClassifier,
};
use tower_admission_core::KeyResolver;
use tower_admission_ratelimiter::KeyedRateLimiter;
use tower_admission_retry::{RetryError, RetryPolicy};

struct Shared<E> {
    name: String,
    limiter: Arc<KeyedRateLimiter>,
    registry: Arc<BreakerRegistry>,
    retry: RetryPolicy<E>,
    sweep_period: std::time::Duration,
    max_idle: std::time::Duration,
}

/// A Tower [`Layer`](tower::Layer) that applies the full admission
/// pipeline.
///
/// All services produced by one layer share the same bucket map, breaker
/// registry, and retry policy, so a cloned service stack enforces a single
/// set of limits.
pub struct AdmissionPipelineLayer<E, R, C = DefaultClassifier> {
    shared: Arc<Shared<E>>,
    resolver: Arc<R>,
    classifier: Arc<C>,
}

impl<E, R> AdmissionPipelineLayer<E, R, DefaultClassifier> {
    /// Creates a layer from a declarative configuration and a key resolver.
    ///
    /// Errors from the downstream count as breaker failures; responses do
    /// not. Use [`classifier`](Self::classifier) to also count responses,
    /// e.g. HTTP 5xx.
    pub fn new(config: PipelineConfig, resolver: R) -> Self {
        observe::describe_metrics();
        let shared = Shared {
            name: config.name.clone(),
            limiter: Arc::new(KeyedRateLimiter::new(Arc::new(config.limiter_config()))),
            registry: Arc::new(BreakerRegistry::new(config.breaker_template())),
            retry: RetryPolicy::new(Arc::new(config.retry_config::<E>())),
            sweep_period: config.sweep_period(),
            max_idle: config.max_idle(),
        };
        Self {
            shared: Arc::new(shared),
            resolver: Arc::new(resolver),
            classifier: Arc::new(DefaultClassifier),
        }
    }
}

impl<E, R, C> AdmissionPipelineLayer<E, R, C> {
    /// Replaces the failure classifier.
    pub fn classifier<C2>(self, classifier: C2) -> AdmissionPipelineLayer<E, R, C2> {
        AdmissionPipelineLayer {
            shared: self.shared,
            resolver: self.resolver,
            classifier: Arc::new(classifier),
        }
    }

    /// Returns the shared keyed rate limiter.
    pub fn limiter(&self) -> &Arc<KeyedRateLimiter> {
        &self.shared.limiter
    }

    /// Returns the shared breaker registry.
    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.shared.registry
    }

    /// Spawns the idle-state sweeper with this pipeline's configured
    /// cadence. Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        spawn_idle_sweeper(
            Arc::clone(&self.shared.limiter),
            Arc::clone(&self.shared.registry),
            self.shared.sweep_period,
            self.shared.max_idle,
        )
    }
}

impl<E, R, C> Clone for AdmissionPipelineLayer<E, R, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            resolver: Arc::clone(&self.resolver),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, E, R, C> tower::Layer<S> for AdmissionPipelineLayer<E, R, C> {
    type Service = AdmissionPipeline<S, E, R, C>;

    fn layer(&self, service: S) -> Self::Service {
        AdmissionPipeline {
            inner: service,
            shared: Arc::clone(&self.shared),
            resolver: Arc::clone(&self.resolver),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

/// A Tower [`Service`] that runs requests through the admission gates.
pub struct AdmissionPipeline<S, E, R, C> {
    inner: S,
    shared: Arc<Shared<E>>,
    resolver: Arc<R>,
    classifier: Arc<C>,
}

impl<S, E, R, C> Clone for AdmissionPipeline<S, E, R, C>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
            resolver: Arc::clone(&self.resolver),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

impl<S, Req, R, C> Service<Req> for AdmissionPipeline<S, S::Error, R, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: Clone + Send + 'static,
    R: KeyResolver<Req> + 'static,
    C: FailureClassifier<S::Response, S::Error> + 'static,
{
    type Response = S::Response;
    type Error = AdmissionError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(|e| AdmissionError::RetryExhausted {
            attempts: 0,
            last: e,
        })
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let key = self.resolver.resolve(&req);
        let shared = Arc::clone(&self.shared);
        let classifier = Arc::clone(&self.classifier);
        let service = self.inner.clone();

        Box::pin(async move {
            let _in_flight = InFlightGuard::enter(&shared.name);
            let started = Instant::now();
            let route = key.route().to_string();

            let finish = |outcome: Outcome, attempts: usize, breaker_state: Option<CircuitState>| {
                observe::emit(&ObservationRecord {
                    pipeline: shared.name.clone(),
                    key: key.clone(),
                    route: route.clone(),
                    outcome,
                    attempts,
                    breaker_state,
                    elapsed: started.elapsed(),
                });
            };

            if let Err(retry_after) = shared.limiter.try_admit(&key) {
                finish(Outcome::RateLimited, 0, None);
                return Err(AdmissionError::RateLimitExceeded {
                    retry_after: Some(retry_after),
                });
            }

            let breaker = shared.registry.breaker(&route);
            let Some(permit) = breaker.try_acquire() else {
                finish(Outcome::CircuitOpen, 0, Some(breaker.state()));
                return Err(AdmissionError::CircuitOpen {
                    name: Some(route.clone()),
                });
            };

            // Each attempt classifies its own result, so the flag that
            // feeds the breaker reflects the response the caller actually
            // receives. The classification of a failed final attempt is
            // kept too, so a classifier that excuses an error is honored
            // on the exhaustion path.
            let attempt_count = Arc::new(AtomicUsize::new(0));
            let last_classified_failure = Arc::new(AtomicBool::new(false));
            let attempt_classifier = Arc::clone(&classifier);
            let attempt_counter = Arc::clone(&attempt_count);
            let last_flag = Arc::clone(&last_classified_failure);
            let attempts = shared.retry.run(None, move || {
                let mut service = service.clone();
                let req = req.clone();
                let classifier = Arc::clone(&attempt_classifier);
                let counter = Arc::clone(&attempt_counter);
                let last_flag = Arc::clone(&last_flag);
                async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let result = service.call(req).await;
                    let classified_failure = classifier.is_failure(&result);
                    last_flag.store(classified_failure, Ordering::Relaxed);
                    result.map(|response| (response, classified_failure))
                }
            });

            let outcome = AssertUnwindSafe(attempts).catch_unwind().await;
            let made = attempt_count.load(Ordering::Relaxed);
            match outcome {
                Ok(Ok((response, classified_failure))) => {
                    breaker.record(permit.generation(), !classified_failure);
                    finish(Outcome::Success, made, Some(breaker.state()));
                    Ok(response)
                }
                Ok(Err(RetryError::Exhausted { attempts, last })) => {
                    breaker.record(
                        permit.generation(),
                        !last_classified_failure.load(Ordering::Relaxed),
                    );
                    finish(Outcome::RetryExhausted, attempts, Some(breaker.state()));
                    Err(AdmissionError::RetryExhausted { attempts, last })
                }
                Ok(Err(RetryError::DeadlineExceeded { after })) => {
                    breaker.record(permit.generation(), false);
                    finish(Outcome::DeadlineExceeded, made, Some(breaker.state()));
                    Err(AdmissionError::DeadlineExceeded { after })
                }
                Err(payload) => {
                    breaker.record(permit.generation(), false);
                    finish(Outcome::Panicked, made, Some(breaker.state()));
                    Err(AdmissionError::PanicRecovered {
                        message: panic_message(payload),
                    })
                }
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

    fn config(json: &str) -> PipelineConfig {
        serde_json::from_str(json).unwrap()
    }

    fn per_client_layer<E>(
        config: PipelineConfig,
    ) -> AdmissionPipelineLayer<E, FnResolver<impl Fn(&String) -> SourceKey + Send + Sync>> {
        AdmissionPipelineLayer::new(
            config,
            FnResolver::new(|client: &String| SourceKey::new(client, "GET", "/things")),
        )
    }

    #[tokio::test]
    async fn admitted_request_passes_through() {
        let layer = per_client_layer::<&'static str>(PipelineConfig::default());
        let mut service =
            layer.layer(service_fn(|req: String| async move { Ok::<_, &'static str>(req) }));

        let response = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap();
        assert_eq!(response, "client-a");
    }

    #[tokio::test]
    async fn rate_limited_requests_carry_retry_after() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{ "rate_limit": { "rate_per_sec": 1.0, "burst": 1 } }"#,
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut service = layer.layer(service_fn(move |req: String| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(req)
            }
        }));

        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .is_ok());
        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::RateLimitExceeded {
                retry_after: Some(_)
            }
        ));
        // Rejected before the downstream, and never retried.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tripped_route_rejects_without_downstream() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{
                "circuit_breaker": { "min_requests": 2, "failure_ratio": 0.5, "timeout_ms": 60000 },
                "retry": { "max_attempts": 1 }
            }"#,
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut service = layer.layer(service_fn(move |_req: String| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("boom")
            }
        }));

        for _ in 0..2 {
            let err = service
                .ready()
                .await
                .unwrap()
                .call("client-a".to_string())
                .await
                .unwrap_err();
            assert!(err.is_retry_exhausted());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::CircuitOpen { name: Some(ref n) } if n == "GET:/things"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_then_reports_exhaustion() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{
                "circuit_breaker": { "min_requests": 100 },
                "retry": { "max_attempts": 3, "base_delay_ms": 1, "jitter_ms": 0 }
            }"#,
        ));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let mut service = layer.layer(service_fn(move |_req: String| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>("connection reset")
            }
        }));

        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::RetryExhausted {
                attempts: 3,
                last: "connection reset"
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deadline_bounds_admitted_calls() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{ "retry": { "max_attempts": 5, "deadline_ms": 50 } }"#,
        ));
        let mut service = layer.layer(service_fn(|_req: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<String, &'static str>("unreachable".to_string())
        }));

        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(err.is_deadline_exceeded());
    }

    #[tokio::test]
    async fn panics_are_recovered_and_counted_as_failures() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{ "retry": { "max_attempts": 1 } }"#,
        ));
        let mut service = layer.layer(service_fn(|req: String| async move {
            if req == "client-a" {
                panic!("handler bug");
            }
            Ok::<String, &'static str>(req)
        }));

        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::PanicRecovered { ref message } if message == "handler bug"
        ));

        // The pipeline keeps serving after the recovered panic.
        assert!(service
            .ready()
            .await
            .unwrap()
            .call("client-b".to_string())
            .await
            .is_ok());
        let snapshot = layer
            .registry()
            .get("GET:/things")
            .expect("breaker exists")
            .snapshot();
        assert_eq!(snapshot.failures, 1);
    }

    #[tokio::test]
    async fn excused_errors_do_not_count_as_breaker_failures() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{ "retry": { "max_attempts": 2, "base_delay_ms": 1, "jitter_ms": 0 } }"#,
        ))
        .classifier(tower_admission_circuitbreaker::FnClassifier::new(
            |result: &Result<String, &'static str>| match result {
                Ok(_) => false,
                Err(e) => *e != "not found",
            },
        ));
        let mut service = layer
            .layer(service_fn(|_req: String| async move { Err::<String, _>("not found") }));

        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(err.is_retry_exhausted());

        // The caller still sees the exhaustion, but the excused error is a
        // breaker success.
        let snapshot = layer
            .registry()
            .get("GET:/things")
            .expect("breaker exists")
            .snapshot();
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.successes, 1);
    }

    #[tokio::test]
    async fn classified_responses_feed_the_breaker() {
        let layer = per_client_layer::<&'static str>(config(
            r#"{
                "circuit_breaker": { "min_requests": 2, "failure_ratio": 0.5 },
                "retry": { "max_attempts": 1 }
            }"#,
        ))
        .classifier(tower_admission_circuitbreaker::FnClassifier::new(
            |result: &Result<u16, &'static str>| match result {
                Ok(status) => *status >= 500,
                Err(_) => true,
            },
        ));
        let mut service =
            layer.layer(service_fn(|_req: String| async move { Ok::<u16, &'static str>(503) }));

        for _ in 0..2 {
            // The 503 is returned to the caller but counted as a failure.
            assert_eq!(
                service
                    .ready()
                    .await
                    .unwrap()
                    .call("client-a".to_string())
                    .await
                    .unwrap(),
                503
            );
        }
        let err = service
            .ready()
            .await
            .unwrap()
            .call("client-a".to_string())
            .await
            .unwrap_err();
        assert!(err.is_circuit_open());
    }
}
