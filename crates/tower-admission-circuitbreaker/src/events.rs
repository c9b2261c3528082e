use crate::breaker::CircuitState;
use std::time::Instant;
use tower_admission_core::AdmissionEvent;

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The breaker changed state.
    StateTransition {
        gate_name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was permitted.
    CallPermitted {
        gate_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected without invoking the downstream.
    CallRejected {
        gate_name: String,
        timestamp: Instant,
    },
    /// A permitted call completed successfully.
    SuccessRecorded {
        gate_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A permitted call failed.
    FailureRecorded {
        gate_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A result from a superseded window was discarded.
    StaleResultDropped {
        gate_name: String,
        timestamp: Instant,
        generation: u64,
    },
    /// The Closed-state counting window rolled over.
    WindowReset {
        gate_name: String,
        timestamp: Instant,
        generation: u64,
    },
}

impl AdmissionEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
            CircuitBreakerEvent::StaleResultDropped { .. } => "stale_result_dropped",
            CircuitBreakerEvent::WindowReset { .. } => "window_reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. }
            | CircuitBreakerEvent::StaleResultDropped { timestamp, .. }
            | CircuitBreakerEvent::WindowReset { timestamp, .. } => *timestamp,
        }
    }

    fn gate_name(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { gate_name, .. }
            | CircuitBreakerEvent::CallPermitted { gate_name, .. }
            | CircuitBreakerEvent::CallRejected { gate_name, .. }
            | CircuitBreakerEvent::SuccessRecorded { gate_name, .. }
            | CircuitBreakerEvent::FailureRecorded { gate_name, .. }
            | CircuitBreakerEvent::StaleResultDropped { gate_name, .. }
            | CircuitBreakerEvent::WindowReset { gate_name, .. } => gate_name,
        }
    }
}
