//! Circuit breaker middleware for Tower services.
//!
//! The breaker tracks the failure ratio of recent calls over a rolling
//! window and stops hammering a dependency that is clearly down:
//!
//! - **Closed**: calls pass through to the inner service.
//! - **Open**: calls are short-circuited without a network attempt.
//! - **Half-open**: after the reset timeout, exactly one trial call is
//!   allowed through; its outcome decides between Closed and Open.
//!
//! State transitions are observable through event listeners
//! (`on_open`, `on_close`, `on_half_open`, `on_state_transition`), so
//! logging and metrics live with the caller rather than inside the
//! breaker.
//!
//! # Fallback wiring
//!
//! [`CircuitBreaker::with_fallback`] produces a service that consults a
//! fallback function on *every* failure path — circuit open, call
//! timeout, or a result the failure classifier counts as a failure —
//! instead of surfacing the raw error. Results the classifier exempts
//! (for example an upstream not-found, which is an answer rather than
//! an outage) bypass the fallback and reach the caller unchanged.
//!
//! ```
//! use meshwire_circuitbreaker::CircuitBreakerLayer;
//! use std::time::Duration;
//! use tower::service_fn;
//!
//! # async fn example() {
//! let layer = CircuitBreakerLayer::builder()
//!     .failure_rate_threshold(0.5)
//!     .window_size(20)
//!     .reset_timeout(Duration::from_secs(10))
//!     .on_state_transition(|from, to| {
//!         eprintln!("circuit: {from:?} -> {to:?}");
//!     })
//!     .build();
//!
//! let upstream = service_fn(|id: String| async move { Ok::<_, String>(id) });
//!
//! let mut resolver = layer.layer_fn(upstream).with_fallback(|id: String| {
//!     Box::pin(async move { Err::<String, _>(format!("no cached copy of {id}")) })
//! });
//! # }
//! ```

use crate::circuit::Circuit;
use crate::classifier::FailureClassifier;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tower::Service;

pub use circuit::{CircuitMetrics, CircuitState};
pub use classifier::{DefaultClassifier, FailureClassifier as FailureClassifierTrait, FnClassifier};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::CircuitBreakerLayer;

mod circuit;
pub mod classifier;
mod config;
mod error;
mod events;
mod layer;

/// Fallback function consulted when the primary path fails.
pub(crate) type FallbackFn<Req, Res, Err> =
    dyn Fn(Req) -> BoxFuture<'static, Result<Res, Err>> + Send + Sync;

enum CallOutcome<Res, Err> {
    Completed(Result<Res, Err>),
    TimedOut(Duration),
}

/// A Tower service that applies circuit breaker logic to an inner
/// service.
pub struct CircuitBreaker<S, C> {
    inner: S,
    circuit: Arc<Mutex<Circuit>>,
    shared_state: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig<C>>,
}

impl<S, C> CircuitBreaker<S, C> {
    pub(crate) fn new(inner: S, config: Arc<CircuitBreakerConfig<C>>) -> Self {
        let shared_state = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            inner,
            circuit: Arc::new(Mutex::new(Circuit::new(Arc::clone(&shared_state)))),
            shared_state,
            config,
        }
    }

    /// Attaches a fallback consulted on every failure path.
    ///
    /// The fallback receives the request and produces either a
    /// replacement response or the error that ultimately reaches the
    /// caller (typically a service-unavailable equivalent when no
    /// cached value exists for the request).
    pub fn with_fallback<Req, Res, Err, F>(
        self,
        fallback: F,
    ) -> CircuitBreakerWithFallback<S, C, Req, Res, Err>
    where
        F: Fn(Req) -> BoxFuture<'static, Result<Res, Err>> + Send + Sync + 'static,
    {
        CircuitBreakerWithFallback {
            inner: self.inner,
            circuit: self.circuit,
            shared_state: self.shared_state,
            config: self.config,
            fallback: Arc::new(fallback),
            _marker: std::marker::PhantomData,
        }
    }

    /// Current state, reading the lock-free shared copy.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.shared_state.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state_sync() == CircuitState::Open
    }

    /// Current state as the circuit itself sees it.
    pub async fn state(&self) -> CircuitState {
        self.circuit.lock().await.state()
    }

    /// Snapshot of the current window.
    pub async fn metrics(&self) -> CircuitMetrics {
        self.circuit.lock().await.metrics()
    }

    /// Forces the circuit open.
    pub async fn force_open(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_open(&self.config, Instant::now());
    }

    /// Resets the circuit to closed and clears the window.
    pub async fn reset(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.reset(&self.config, Instant::now());
    }
}

impl<S: Clone, C> Clone for CircuitBreaker<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            circuit: Arc::clone(&self.circuit),
            shared_state: Arc::clone(&self.shared_state),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitBreaker<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    C: FailureClassifier<S::Response, S::Error> + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let config = Arc::clone(&self.config);
        let circuit = Arc::clone(&self.circuit);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let permitted = {
                let mut circuit = circuit.lock().await;
                circuit.try_acquire(&config, Instant::now())
            };
            if !permitted {
                return Err(CircuitBreakerError::OpenCircuit);
            }

            let outcome = run_call(&mut inner, req, config.call_timeout).await;
            let failed = match &outcome {
                CallOutcome::TimedOut(_) => true,
                CallOutcome::Completed(result) => config.classifier.classify(result),
            };

            {
                let mut circuit = circuit.lock().await;
                let now = Instant::now();
                if failed {
                    circuit.record_failure(&config, now);
                } else {
                    circuit.record_success(&config, now);
                }
            }

            match outcome {
                CallOutcome::Completed(result) => result.map_err(CircuitBreakerError::Inner),
                CallOutcome::TimedOut(limit) => Err(CircuitBreakerError::Timeout(limit)),
            }
        })
    }
}

/// A circuit breaker whose failure paths are routed through a fallback
/// function.
///
/// Unlike [`CircuitBreaker`], this service's error type is the inner
/// error type: the open-circuit rejection never reaches the caller,
/// because the fallback answers in its place. The only errors callers
/// see are results the classifier exempted (client-class faults) and
/// the fallback's own failure.
pub struct CircuitBreakerWithFallback<S, C, Req, Res, Err> {
    inner: S,
    circuit: Arc<Mutex<Circuit>>,
    shared_state: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig<C>>,
    fallback: Arc<FallbackFn<Req, Res, Err>>,
    _marker: std::marker::PhantomData<fn(Req) -> (Res, Err)>,
}

impl<S, C, Req, Res, Err> CircuitBreakerWithFallback<S, C, Req, Res, Err> {
    /// Current state, reading the lock-free shared copy.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.shared_state.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state_sync() == CircuitState::Open
    }

    /// Current state as the circuit itself sees it.
    pub async fn state(&self) -> CircuitState {
        self.circuit.lock().await.state()
    }

    /// Snapshot of the current window.
    pub async fn metrics(&self) -> CircuitMetrics {
        self.circuit.lock().await.metrics()
    }

    /// Forces the circuit open.
    pub async fn force_open(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.force_open(&self.config, Instant::now());
    }

    /// Resets the circuit to closed and clears the window.
    pub async fn reset(&self) {
        let mut circuit = self.circuit.lock().await;
        circuit.reset(&self.config, Instant::now());
    }

    /// "healthy", "degraded" or "unhealthy", for health endpoints.
    pub fn health_status(&self) -> &'static str {
        match self.state_sync() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "degraded",
            CircuitState::Open => "unhealthy",
        }
    }

    /// 200 while traffic is accepted, 503 while the circuit is open.
    pub fn http_status(&self) -> u16 {
        match self.state_sync() {
            CircuitState::Closed | CircuitState::HalfOpen => 200,
            CircuitState::Open => 503,
        }
    }
}

impl<S: Clone, C, Req, Res, Err> Clone for CircuitBreakerWithFallback<S, C, Req, Res, Err> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            circuit: Arc::clone(&self.circuit),
            shared_state: Arc::clone(&self.shared_state),
            config: Arc::clone(&self.config),
            fallback: Arc::clone(&self.fallback),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<S, C, Req, Res, Err> Service<Req> for CircuitBreakerWithFallback<S, C, Req, Res, Err>
where
    S: Service<Req, Response = Res, Error = Err> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Req: Clone + Send + 'static,
    Res: Send + 'static,
    Err: Send + 'static,
    C: FailureClassifier<Res, Err> + Send + Sync + 'static,
{
    type Response = Res;
    type Error = Err;
    type Future = BoxFuture<'static, Result<Res, Err>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let config = Arc::clone(&self.config);
        let circuit = Arc::clone(&self.circuit);
        let fallback = Arc::clone(&self.fallback);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let permitted = {
                let mut circuit = circuit.lock().await;
                circuit.try_acquire(&config, Instant::now())
            };
            if !permitted {
                config
                    .event_listeners
                    .emit(&CircuitBreakerEvent::FallbackInvoked {
                        pattern_name: config.name.clone(),
                        timestamp: Instant::now(),
                    });
                return (fallback)(req).await;
            }

            let outcome = run_call(&mut inner, req.clone(), config.call_timeout).await;
            let failed = match &outcome {
                CallOutcome::TimedOut(_) => true,
                CallOutcome::Completed(result) => config.classifier.classify(result),
            };

            {
                let mut circuit = circuit.lock().await;
                let now = Instant::now();
                if failed {
                    circuit.record_failure(&config, now);
                } else {
                    circuit.record_success(&config, now);
                }
            }

            match outcome {
                CallOutcome::Completed(result) if !failed => result,
                _ => {
                    config
                        .event_listeners
                        .emit(&CircuitBreakerEvent::FallbackInvoked {
                            pattern_name: config.name.clone(),
                            timestamp: Instant::now(),
                        });
                    #[cfg(feature = "tracing")]
                    tracing::debug!(breaker = %config.name, "primary path failed, taking fallback");
                    (fallback)(req).await
                }
            }
        })
    }
}

async fn run_call<S, Req>(
    service: &mut S,
    req: Req,
    call_timeout: Option<Duration>,
) -> CallOutcome<S::Response, S::Error>
where
    S: Service<Req>,
{
    match call_timeout {
        Some(limit) => match tokio::time::timeout(limit, service.call(req)).await {
            Ok(result) => CallOutcome::Completed(result),
            Err(_) => CallOutcome::TimedOut(limit),
        },
        None => CallOutcome::Completed(service.call(req).await),
    }
}
