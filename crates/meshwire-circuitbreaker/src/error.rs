use std::time::Duration;
use thiserror::Error;

/// Errors returned by the `CircuitBreaker` service.
///
/// The fallback-wired variant,
/// [`CircuitBreakerWithFallback`](crate::CircuitBreakerWithFallback),
/// absorbs `OpenCircuit` and `Timeout` into its fallback path and
/// surfaces only the inner error type.
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the call was short-circuited.
    #[error("circuit is open; call not permitted")]
    OpenCircuit,

    /// The whole call, retries included, exceeded the breaker's call
    /// timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// An error from the inner service.
    #[error("{0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::OpenCircuit)
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
