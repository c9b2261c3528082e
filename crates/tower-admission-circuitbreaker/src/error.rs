use thiserror::Error;

/// Error type returned by the circuit breaker service.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is open and the call was rejected without invoking the
    /// downstream service.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Name of the breaker that rejected the call.
        name: String,
    },

    /// The downstream service returned an error.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> From<E> for CircuitBreakerError<E> {
    fn from(err: E) -> Self {
        CircuitBreakerError::Inner(err)
    }
}

impl<E> CircuitBreakerError<E> {
    /// Returns `true` if the error is an open-circuit rejection.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// Extracts the downstream error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            CircuitBreakerError::Open { .. } => None,
        }
    }
}
