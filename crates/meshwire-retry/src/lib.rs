//! Retry middleware for Tower services.
//!
//! Wraps a single fallible call with a bounded number of attempts, an
//! optional per-attempt timeout, and a configurable delay between
//! attempts. The canonical configuration is exponential backoff with
//! additive jitter, which spreads out concurrent retriers instead of
//! letting them hammer a struggling dependency in lockstep.
//!
//! Failures are split into two classes by the retry predicate:
//! server-class faults (transport errors, 5xx-equivalents, timeouts)
//! are retried; client-class faults (not-found, bad request) are
//! surfaced immediately as [`RetryError::Rejected`]. When the attempt
//! budget runs out the call fails with [`RetryError::Exhausted`],
//! carrying the last underlying failure.
//!
//! # Example
//!
//! ```
//! use meshwire_retry::{ExponentialBackoff, RetryConfig};
//! use std::time::Duration;
//!
//! # #[derive(Debug)]
//! # struct UpstreamError;
//! let layer: meshwire_retry::RetryLayer<UpstreamError> = RetryConfig::builder()
//!     .max_attempts(4)
//!     .attempt_timeout(Duration::from_millis(500))
//!     .backoff(
//!         ExponentialBackoff::new(Duration::from_millis(100))
//!             .jitter(Duration::from_millis(50)),
//!     )
//!     .name("user-fetch")
//!     .build();
//! ```

mod backoff;
mod config;
mod error;
mod events;
mod layer;

pub use backoff::{ExponentialBackoff, FixedInterval, IntervalFunction};
pub use config::{RetryConfig, RetryConfigBuilder, RetryPredicate};
pub use error::{AttemptFailure, RetryError};
pub use events::RetryEvent;
pub use layer::RetryLayer;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::Service;

/// A Tower [`Service`] that retries failed calls of its inner service.
pub struct Retry<S, E> {
    inner: S,
    config: Arc<RetryConfig<E>>,
}

impl<S, E> Retry<S, E> {
    pub(crate) fn new(inner: S, config: Arc<RetryConfig<E>>) -> Self {
        Self { inner, config }
    }
}

impl<S: Clone, E> Clone for Retry<S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, Req, E> Service<Req> for Retry<S, E>
where
    S: Service<Req, Error = E> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
    E: Send + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RetryError::Rejected)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let mut service = self.inner.clone();
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let mut attempt = 0usize;

            loop {
                let outcome = match config.attempt_timeout {
                    Some(limit) => {
                        match tokio::time::timeout(limit, service.call(req.clone())).await {
                            Ok(result) => result.map_err(AttemptFailure::Inner),
                            Err(_) => Err(AttemptFailure::Timeout(limit)),
                        }
                    }
                    None => service.call(req.clone()).await.map_err(AttemptFailure::Inner),
                };

                match outcome {
                    Ok(response) => {
                        config.event_listeners.emit(&RetryEvent::Success {
                            pattern_name: config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });
                        return Ok(response);
                    }
                    Err(AttemptFailure::Inner(error)) if !config.should_retry(&error) => {
                        config.event_listeners.emit(&RetryEvent::Rejected {
                            pattern_name: config.name.clone(),
                            timestamp: Instant::now(),
                        });
                        return Err(RetryError::Rejected(error));
                    }
                    Err(failure) => {
                        if attempt + 1 >= config.max_attempts {
                            config.event_listeners.emit(&RetryEvent::Exhausted {
                                pattern_name: config.name.clone(),
                                timestamp: Instant::now(),
                                attempts: attempt + 1,
                            });
                            return Err(RetryError::Exhausted {
                                attempts: attempt + 1,
                                last: failure,
                            });
                        }

                        let delay = config.next_delay(attempt);
                        config.event_listeners.emit(&RetryEvent::Retry {
                            pattern_name: config.name.clone(),
                            timestamp: Instant::now(),
                            attempt: attempt + 1,
                            delay,
                        });

                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            retry = %config.name,
                            attempt = attempt + 1,
                            ?delay,
                            "retryable failure, backing off"
                        );

                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        })
    }
}
