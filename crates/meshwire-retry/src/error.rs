use std::time::Duration;
use thiserror::Error;

/// One failed attempt, as seen by the retry loop.
#[derive(Debug, Error)]
pub enum AttemptFailure<E> {
    /// The attempt exceeded the per-attempt timeout and was abandoned.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The inner service returned an error.
    #[error("{0}")]
    Inner(E),
}

/// Errors returned by the `Retry` service.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable fault; carries the last one.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        last: AttemptFailure<E>,
    },

    /// The failure was not retryable and is surfaced immediately.
    #[error("{0}")]
    Rejected(E),
}

impl<E> RetryError<E> {
    /// Returns true if the retry budget was exhausted.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Extracts the underlying service error, if there is one.
    ///
    /// Returns `None` when the last failure was a timeout, which has no
    /// inner error.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Rejected(e) => Some(e),
            RetryError::Exhausted {
                last: AttemptFailure::Inner(e),
                ..
            } => Some(e),
            RetryError::Exhausted {
                last: AttemptFailure::Timeout(_),
                ..
            } => None,
        }
    }
}
