use std::time::{Duration, Instant};
use tower_admission_core::AdmissionEvent;

/// Events emitted by the retry executor.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// An attempt failed and a retry is scheduled after `delay`.
    Retrying {
        gate_name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// An attempt succeeded.
    Succeeded {
        gate_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The attempt budget ran out.
    Exhausted {
        gate_name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The deadline expired before the call could complete.
    DeadlineExceeded {
        gate_name: String,
        timestamp: Instant,
        after: Duration,
    },
    /// An error the predicate declared non-retryable was returned as-is.
    NotRetryable {
        gate_name: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl AdmissionEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retrying { .. } => "retrying",
            RetryEvent::Succeeded { .. } => "succeeded",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::DeadlineExceeded { .. } => "deadline_exceeded",
            RetryEvent::NotRetryable { .. } => "not_retryable",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retrying { timestamp, .. }
            | RetryEvent::Succeeded { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::DeadlineExceeded { timestamp, .. }
            | RetryEvent::NotRetryable { timestamp, .. } => *timestamp,
        }
    }

    fn gate_name(&self) -> &str {
        match self {
            RetryEvent::Retrying { gate_name, .. }
            | RetryEvent::Succeeded { gate_name, .. }
            | RetryEvent::Exhausted { gate_name, .. }
            | RetryEvent::DeadlineExceeded { gate_name, .. }
            | RetryEvent::NotRetryable { gate_name, .. } => gate_name,
        }
    }
}
