#[cfg(feature = "metrics")]
use std::sync::Once;
use std::time::Duration;
use tower_admission_circuitbreaker::CircuitState;
use tower_admission_core::SourceKey;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// Registers metric descriptions the first time a pipeline is built.
pub(crate) fn describe_metrics() {
    #[cfg(feature = "metrics")]
    METRICS_INIT.call_once(|| {
        metrics::describe_counter!(
            "admission_requests_total",
            "Total number of requests seen by the admission pipeline"
        );
        metrics::describe_histogram!(
            "admission_request_duration_seconds",
            "Duration of requests through the admission pipeline"
        );
        metrics::describe_gauge!(
            "admission_requests_in_flight",
            "Number of requests currently inside the admission pipeline"
        );
    });
}

/// Terminal outcome of one request's trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Admitted and the downstream call (possibly after retries) succeeded.
    Success,
    /// Rejected by the rate limiter before reaching the breaker.
    RateLimited,
    /// Rejected by an open circuit breaker.
    CircuitOpen,
    /// Admitted, but every attempt failed.
    RetryExhausted,
    /// Admitted, but the deadline expired first.
    DeadlineExceeded,
    /// The downstream panicked; the panic was recovered.
    Panicked,
}

impl Outcome {
    /// Stable label used in metrics and logs.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::RateLimited => "rate_limited",
            Outcome::CircuitOpen => "circuit_open",
            Outcome::RetryExhausted => "retry_exhausted",
            Outcome::DeadlineExceeded => "deadline_exceeded",
            Outcome::Panicked => "panicked",
        }
    }
}

/// One observation per completed request, successful or not.
#[derive(Debug, Clone)]
pub struct ObservationRecord {
    /// Pipeline name.
    pub pipeline: String,
    /// The admission key the request resolved to.
    pub key: SourceKey,
    /// The route component of the key.
    pub route: String,
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Downstream attempts made; zero when a gate rejected first.
    pub attempts: usize,
    /// State of the route's breaker when the outcome was recorded, if the
    /// request got that far.
    pub breaker_state: Option<CircuitState>,
    /// Wall time from admission decision to terminal outcome.
    pub elapsed: Duration,
}

/// Emits one record to the metrics and log sinks.
#[allow(unused_variables)]
pub(crate) fn emit(record: &ObservationRecord) {
    #[cfg(feature = "metrics")]
    {
        metrics::counter!(
            "admission_requests_total",
            "pipeline" => record.pipeline.clone(),
            "route" => record.route.clone(),
            "outcome" => record.outcome.label()
        )
        .increment(1);

        metrics::histogram!(
            "admission_request_duration_seconds",
            "pipeline" => record.pipeline.clone(),
            "route" => record.route.clone()
        )
        .record(record.elapsed.as_secs_f64());
    }

    #[cfg(feature = "tracing")]
    {
        let breaker_state = record.breaker_state.map(CircuitState::label);
        match record.outcome {
            Outcome::Success => tracing::debug!(
                pipeline = %record.pipeline,
                key = %record.key,
                outcome = record.outcome.label(),
                attempts = record.attempts,
                breaker_state,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "request completed"
            ),
            Outcome::Panicked => tracing::error!(
                pipeline = %record.pipeline,
                key = %record.key,
                attempts = record.attempts,
                breaker_state,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "request handler panicked"
            ),
            _ => tracing::warn!(
                pipeline = %record.pipeline,
                key = %record.key,
                outcome = record.outcome.label(),
                attempts = record.attempts,
                breaker_state,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "request rejected or failed"
            ),
        }
    }
}

/// Tracks requests currently inside the pipeline.
///
/// The guard decrements on drop, so early returns and recovered panics
/// still release their slot.
pub(crate) struct InFlightGuard {
    #[cfg(feature = "metrics")]
    pipeline: String,
}

impl InFlightGuard {
    #[allow(unused_variables)]
    pub(crate) fn enter(pipeline: &str) -> Self {
        #[cfg(feature = "metrics")]
        metrics::gauge!("admission_requests_in_flight", "pipeline" => pipeline.to_string())
            .increment(1.0);
        Self {
            #[cfg(feature = "metrics")]
            pipeline: pipeline.to_string(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        #[cfg(feature = "metrics")]
        metrics::gauge!("admission_requests_in_flight", "pipeline" => self.pipeline.clone())
            .decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(Outcome::Success.label(), "success");
        assert_eq!(Outcome::RateLimited.label(), "rate_limited");
        assert_eq!(Outcome::CircuitOpen.label(), "circuit_open");
        assert_eq!(Outcome::RetryExhausted.label(), "retry_exhausted");
        assert_eq!(Outcome::DeadlineExceeded.label(), "deadline_exceeded");
        assert_eq!(Outcome::Panicked.label(), "panicked");
    }
}
