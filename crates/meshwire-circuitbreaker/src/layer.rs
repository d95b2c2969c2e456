use crate::classifier::DefaultClassifier;
use crate::config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
use crate::CircuitBreaker;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that applies circuit breaker behavior to an inner
/// service.
pub struct CircuitBreakerLayer<C = DefaultClassifier> {
    config: Arc<CircuitBreakerConfig<C>>,
}

impl<C> CircuitBreakerLayer<C> {
    pub(crate) fn new(config: CircuitBreakerConfig<C>) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Wraps the given service, returning the `CircuitBreaker` service
    /// directly.
    ///
    /// Use this instead of `Layer::layer` when you need the concrete
    /// type, for example to call
    /// [`with_fallback`](crate::CircuitBreaker::with_fallback) or the
    /// state inspection methods.
    pub fn layer_fn<S>(&self, service: S) -> CircuitBreaker<S, C> {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}

impl CircuitBreakerLayer<DefaultClassifier> {
    /// Creates a new builder for configuring a circuit breaker layer.
    pub fn builder() -> CircuitBreakerConfigBuilder<DefaultClassifier> {
        CircuitBreakerConfigBuilder::new()
    }
}

impl<C> Clone for CircuitBreakerLayer<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreaker<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreaker::new(service, Arc::clone(&self.config))
    }
}
