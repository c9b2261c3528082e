use std::time::{Duration, Instant};
use tower_admission_core::{AdmissionEvent, SourceKey};

/// Events emitted by the rate limiter.
#[derive(Debug)]
pub enum RateLimiterEvent {
    /// A token was consumed and the request admitted.
    Admitted {
        /// Name of the limiter instance.
        gate_name: String,
        /// When the decision was made.
        timestamp: Instant,
        /// The admission key.
        key: SourceKey,
    },
    /// The key's bucket held less than one token; the request was rejected.
    Rejected {
        /// Name of the limiter instance.
        gate_name: String,
        /// When the decision was made.
        timestamp: Instant,
        /// The admission key.
        key: SourceKey,
        /// Time until one token refills for this key.
        retry_after: Duration,
    },
}

impl AdmissionEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Admitted { .. } => "admitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Admitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. } => *timestamp,
        }
    }

    fn gate_name(&self) -> &str {
        match self {
            RateLimiterEvent::Admitted { gate_name, .. }
            | RateLimiterEvent::Rejected { gate_name, .. } => gate_name,
        }
    }
}
