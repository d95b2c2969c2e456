use crate::circuit::CircuitState;
use crate::classifier::{DefaultClassifier, FnClassifier};
use crate::events::CircuitBreakerEvent;
use meshwire_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for the circuit breaker.
///
/// `C` is the failure classifier type, `DefaultClassifier` unless a
/// custom classifier is installed through the builder.
pub struct CircuitBreakerConfig<C> {
    /// Failure ratio at which the circuit opens, 0.0 to 1.0.
    pub(crate) failure_rate_threshold: f64,
    /// Number of most recent call outcomes kept for the ratio.
    pub(crate) window_size: usize,
    /// Outcomes required before the ratio is evaluated at all.
    pub(crate) min_calls: usize,
    /// Time spent in `Open` before a trial call is allowed.
    pub(crate) reset_timeout: Duration,
    /// Bound on one whole inner call, retries and backoff included.
    /// Must exceed the worst case of the wrapped retry policy.
    pub(crate) call_timeout: Option<Duration>,
    pub(crate) classifier: C,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig<DefaultClassifier> {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder<DefaultClassifier> {
        CircuitBreakerConfigBuilder::new()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder<C = DefaultClassifier> {
    failure_rate_threshold: f64,
    window_size: usize,
    min_calls: Option<usize>,
    reset_timeout: Duration,
    call_timeout: Option<Duration>,
    classifier: C,
    event_listeners: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl CircuitBreakerConfigBuilder<DefaultClassifier> {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - failure_rate_threshold: 0.5
    /// - window_size: 100
    /// - min_calls: same as window_size
    /// - reset_timeout: 10 seconds
    /// - call_timeout: none
    /// - classifier: every error is a failure
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            window_size: 100,
            min_calls: None,
            reset_timeout: Duration::from_secs(10),
            call_timeout: None,
            classifier: DefaultClassifier,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }
}

impl Default for CircuitBreakerConfigBuilder<DefaultClassifier> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> CircuitBreakerConfigBuilder<C> {
    /// Sets the failure ratio at which the circuit opens.
    ///
    /// Default: 0.5 (50%)
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Sets how many recent call outcomes the rolling window keeps.
    ///
    /// Default: 100
    pub fn window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Sets the minimum number of recorded outcomes before the failure
    /// ratio is evaluated.
    ///
    /// Default: same as `window_size`
    pub fn min_calls(mut self, min_calls: usize) -> Self {
        self.min_calls = Some(min_calls);
        self
    }

    /// Sets how long the circuit stays open before allowing the single
    /// half-open trial call.
    ///
    /// Default: 10 seconds
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Bounds one whole inner call. When the inner service itself
    /// retries, configure this strictly greater than the sum of the
    /// attempts' timeouts and backoff delays, so the breaker never cuts
    /// off a call that is still legitimately retrying.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Installs a custom failure classifier from a closure over the
    /// concrete result type. Results classified as non-failures are
    /// never counted against the window and never diverted to the
    /// fallback.
    pub fn failure_classifier<F>(self, f: F) -> CircuitBreakerConfigBuilder<FnClassifier<F>> {
        self.classifier(FnClassifier::new(f))
    }

    /// Installs a custom [`FailureClassifier`](crate::classifier::FailureClassifier)
    /// implementation. Useful when the resulting service type must be
    /// nameable, which a closure-based classifier is not.
    pub fn classifier<C2>(self, classifier: C2) -> CircuitBreakerConfigBuilder<C2> {
        CircuitBreakerConfigBuilder {
            failure_rate_threshold: self.failure_rate_threshold,
            window_size: self.window_size,
            min_calls: self.min_calls,
            reset_timeout: self.reset_timeout,
            call_timeout: self.call_timeout,
            classifier,
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }

    /// Names this breaker for events and logs.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for every state transition, with the state
    /// moved from and the state moved to.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Registers a callback invoked when the circuit opens.
    pub fn on_open<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_transition_to(CircuitState::Open, f)
    }

    /// Registers a callback invoked when the circuit closes.
    pub fn on_close<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_transition_to(CircuitState::Closed, f)
    }

    /// Registers a callback invoked when the circuit moves to half-open
    /// and is about to admit its trial call.
    pub fn on_half_open<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_transition_to(CircuitState::HalfOpen, f)
    }

    /// Registers a callback invoked whenever the fallback path is taken
    /// instead of surfacing the raw failure.
    pub fn on_fallback<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::FallbackInvoked { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback invoked when a call is short-circuited
    /// without reaching the inner service.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    fn on_transition_to<F>(mut self, target: CircuitState, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let CircuitBreakerEvent::StateTransition { to, .. } = event {
                if *to == target {
                    f();
                }
            }
        }));
        self
    }

    /// Builds the configuration into a layer.
    pub fn build(self) -> crate::layer::CircuitBreakerLayer<C> {
        let config = CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            window_size: self.window_size,
            min_calls: self.min_calls.unwrap_or(self.window_size),
            reset_timeout: self.reset_timeout,
            call_timeout: self.call_timeout,
            classifier: self.classifier,
            event_listeners: self.event_listeners,
            name: self.name,
        };
        crate::layer::CircuitBreakerLayer::new(config)
    }
}
