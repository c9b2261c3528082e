use std::time::Duration;
use thiserror::Error;

/// Errors returned by the retry executor.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The attempt budget ran out. Carries the final attempt's error.
    #[error("request failed after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Total attempts made, including the first.
        attempts: usize,
        /// The error from the final attempt.
        last: E,
    },

    /// The deadline expired, either mid-attempt or because the next
    /// backoff wait would have crossed it.
    #[error("deadline exceeded after {after:?}")]
    DeadlineExceeded {
        /// Elapsed time since the first attempt started.
        after: Duration,
    },
}

impl<E> RetryError<E> {
    /// Returns `true` if the attempt budget was exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Returns `true` if the deadline expired.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RetryError::DeadlineExceeded { .. })
    }

    /// Extracts the final attempt's error, if any.
    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::DeadlineExceeded { .. } => None,
        }
    }
}
