use std::time::Duration;
use thiserror::Error;

/// Errors returned by the [`SourceRateLimiter`](crate::SourceRateLimiter)
/// service.
#[derive(Debug, Error)]
pub enum RateLimitError<E> {
    /// The key's bucket was empty; the request was not forwarded.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Time until one token refills for the rejected key.
        retry_after: Duration,
    },

    /// An error returned by the inner service.
    #[error("inner service error: {0}")]
    Inner(E),
}

impl<E> RateLimitError<E> {
    /// Returns true if the limiter rejected the request.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RateLimitError::RateLimitExceeded { .. })
    }

    /// Returns the inner error if present.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RateLimitError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
