//! Unified error taxonomy for the admission pipeline.
//!
//! Every protective decision the pipeline can take maps to one variant of
//! [`AdmissionError`]. The first three gates (limiter, breaker, deadline)
//! fail fast and represent the pipeline's own decisions; only
//! [`AdmissionError::RetryExhausted`] carries a downstream failure, and it is
//! surfaced verbatim wrapped with the attempt count.
//!
//! ```rust
//! use tower_admission_core::AdmissionError;
//!
//! fn describe(err: &AdmissionError<std::io::Error>) -> &'static str {
//!     match err {
//!         AdmissionError::RateLimitExceeded { .. } => "throttled",
//!         AdmissionError::CircuitOpen { .. } => "shed",
//!         AdmissionError::RetryExhausted { .. } => "failed downstream",
//!         AdmissionError::DeadlineExceeded { .. } => "timed out",
//!         AdmissionError::PanicRecovered { .. } => "crashed",
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// The outcome taxonomy of the admission pipeline.
///
/// `E` is the downstream service's error type.
#[derive(Debug, Error)]
pub enum AdmissionError<E> {
    /// The token-bucket limiter rejected the request.
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Time until one token refills, if known. Suitable for a
        /// `Retry-After` response header.
        retry_after: Option<Duration>,
    },

    /// The circuit breaker is open; the downstream was not invoked.
    #[error("circuit breaker '{}' is open", .name.as_deref().unwrap_or("<unnamed>"))]
    CircuitOpen {
        /// The breaker's route key, if configured.
        name: Option<String>,
    },

    /// All retry attempts failed; carries the last downstream error.
    #[error("request failed after {attempts} attempt(s): {last}")]
    RetryExhausted {
        /// Total attempts made, including the initial one.
        attempts: usize,
        /// The last error returned by the downstream.
        last: E,
    },

    /// The request's overall deadline elapsed before an attempt could
    /// complete.
    #[error("deadline exceeded after {after:?}")]
    DeadlineExceeded {
        /// Elapsed time when the deadline fired.
        after: Duration,
    },

    /// The downstream panicked; caught at the pipeline boundary.
    #[error("downstream panic recovered: {message}")]
    PanicRecovered {
        /// Best-effort rendering of the panic payload.
        message: String,
    },
}

impl<E> AdmissionError<E> {
    /// Returns true if the limiter rejected the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AdmissionError::RateLimitExceeded { .. })
    }

    /// Returns true if the breaker rejected the request.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, AdmissionError::CircuitOpen { .. })
    }

    /// Returns true if retries were exhausted.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, AdmissionError::RetryExhausted { .. })
    }

    /// Returns true if the overall deadline fired.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, AdmissionError::DeadlineExceeded { .. })
    }

    /// Returns true if a downstream panic was recovered.
    pub fn is_panic(&self) -> bool {
        matches!(self, AdmissionError::PanicRecovered { .. })
    }

    /// Extracts the downstream error, if any.
    pub fn into_source(self) -> Option<E> {
        match self {
            AdmissionError::RetryExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Maps the downstream error type.
    pub fn map_source<F, T>(self, f: F) -> AdmissionError<T>
    where
        F: FnOnce(E) -> T,
    {
        match self {
            AdmissionError::RateLimitExceeded { retry_after } => {
                AdmissionError::RateLimitExceeded { retry_after }
            }
            AdmissionError::CircuitOpen { name } => AdmissionError::CircuitOpen { name },
            AdmissionError::RetryExhausted { attempts, last } => AdmissionError::RetryExhausted {
                attempts,
                last: f(last),
            },
            AdmissionError::DeadlineExceeded { after } => AdmissionError::DeadlineExceeded { after },
            AdmissionError::PanicRecovered { message } => AdmissionError::PanicRecovered { message },
        }
    }
}
