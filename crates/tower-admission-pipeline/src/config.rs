use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_admission_circuitbreaker::BreakerConfig;
use tower_admission_ratelimiter::RateLimiterConfig;
use tower_admission_retry::RetryConfig;

/// Declarative configuration for an admission pipeline.
///
/// Durations are plain millisecond fields so the whole struct deserializes
/// from flat JSON, TOML, or environment-sourced config without custom
/// parsing. Every field has a production-sensible default; an empty
/// document is a valid pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name stamped on events, logs, and metric labels.
    pub name: String,
    pub rate_limit: RateLimitSection,
    pub circuit_breaker: CircuitBreakerSection,
    pub retry: RetrySection,
    /// How often idle per-key state is swept, in milliseconds.
    pub sweep_period_ms: u64,
    /// Keys and breakers unused for this long are eligible for sweeping.
    pub max_idle_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "admission".to_string(),
            rate_limit: RateLimitSection::default(),
            circuit_breaker: CircuitBreakerSection::default(),
            retry: RetrySection::default(),
            sweep_period_ms: 60_000,
            max_idle_ms: 300_000,
        }
    }
}

/// Token-bucket settings applied per source key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Tokens refilled per second.
    pub rate_per_sec: f64,
    /// Bucket capacity; a new key may burst this many requests.
    pub burst: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            rate_per_sec: 50.0,
            burst: 100,
        }
    }
}

/// Circuit breaker settings applied per route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSection {
    /// Failure rate at or above which a breaker trips.
    pub failure_ratio: f64,
    /// Minimum completed calls in a window before the ratio is evaluated.
    pub min_requests: u64,
    /// Trial call budget while half-open.
    pub max_requests: u64,
    /// Closed-state counting window, in milliseconds. Zero disables
    /// periodic resets.
    pub interval_ms: u64,
    /// How long an open breaker waits before probing, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_ratio: 0.6,
            min_requests: 10,
            max_requests: 100,
            interval_ms: 10_000,
            timeout_ms: 60_000,
        }
    }
}

/// Retry settings applied to admitted calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Total attempt budget, including the first attempt.
    pub max_attempts: usize,
    /// Wait before the first retry, doubling per attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on any single deterministic wait, in milliseconds.
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter per wait, in milliseconds.
    pub jitter_ms: u64,
    /// Bound on the whole sequence including waits, in milliseconds.
    /// `None` leaves the sequence unbounded.
    pub deadline_ms: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 15_000,
            jitter_ms: 100,
            deadline_ms: None,
        }
    }
}

impl PipelineConfig {
    pub(crate) fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::builder()
            .rate(self.rate_limit.rate_per_sec)
            .burst(self.rate_limit.burst)
            .name(self.name.clone())
            .build()
    }

    pub(crate) fn breaker_template(&self) -> BreakerConfig {
        BreakerConfig::builder()
            .failure_ratio(self.circuit_breaker.failure_ratio)
            .min_requests(self.circuit_breaker.min_requests)
            .max_requests(self.circuit_breaker.max_requests)
            .interval(Duration::from_millis(self.circuit_breaker.interval_ms))
            .timeout(Duration::from_millis(self.circuit_breaker.timeout_ms))
            .name(self.name.clone())
            .build()
    }

    pub(crate) fn retry_config<E>(&self) -> RetryConfig<E> {
        let mut builder = RetryConfig::<E>::builder()
            .max_attempts(self.retry.max_attempts)
            .base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(Duration::from_millis(self.retry.jitter_ms))
            .name(self.name.clone());
        if let Some(deadline_ms) = self.retry.deadline_ms {
            builder = builder.deadline(Duration::from_millis(deadline_ms));
        }
        builder.build()
    }

    /// Sweep cadence as a duration.
    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms)
    }

    /// Idle cutoff as a duration.
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.name, "admission");
        assert_eq!(config.rate_limit.rate_per_sec, 50.0);
        assert_eq!(config.circuit_breaker.failure_ratio, 0.6);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.retry.deadline_ms.is_none());
    }

    #[test]
    fn partial_sections_override_only_what_they_name() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "name": "api",
                "rate_limit": { "burst": 20 },
                "retry": { "max_attempts": 5, "deadline_ms": 2000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.name, "api");
        assert_eq!(config.rate_limit.burst, 20);
        assert_eq!(config.rate_limit.rate_per_sec, 50.0);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.deadline_ms, Some(2000));
        assert_eq!(config.circuit_breaker.min_requests, 10);
    }

    #[test]
    fn round_trips_through_json() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, config.name);
        assert_eq!(back.sweep_period_ms, config.sweep_period_ms);
    }
}
