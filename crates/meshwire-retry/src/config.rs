use crate::backoff::{ExponentialBackoff, FixedInterval, IntervalFunction};
use crate::events::RetryEvent;
use meshwire_core::events::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether a given error is worth another attempt.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Configuration for the retry middleware.
pub struct RetryConfig<E> {
    pub(crate) max_attempts: usize,
    pub(crate) interval: Arc<dyn IntervalFunction>,
    pub(crate) retry_predicate: Option<RetryPredicate<E>>,
    pub(crate) attempt_timeout: Option<Duration>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl<E> RetryConfig<E> {
    /// Creates a new configuration builder.
    pub fn builder() -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new()
    }

    pub(crate) fn should_retry(&self, error: &E) -> bool {
        match &self.retry_predicate {
            Some(predicate) => predicate(error),
            None => true,
        }
    }

    pub(crate) fn next_delay(&self, attempt: usize) -> Duration {
        self.interval.next_interval(attempt)
    }
}

/// Builder for [`RetryConfig`].
pub struct RetryConfigBuilder<E> {
    max_attempts: usize,
    interval: Option<Arc<dyn IntervalFunction>>,
    retry_predicate: Option<RetryPredicate<E>>,
    attempt_timeout: Option<Duration>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> Default for RetryConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetryConfigBuilder<E> {
    /// Creates a new builder.
    ///
    /// Defaults:
    /// - max_attempts: 3
    /// - backoff: exponential, 100ms initial interval
    /// - attempt_timeout: none
    /// - predicate: every error is retryable
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            interval: None,
            retry_predicate: None,
            attempt_timeout: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the total number of attempts, including the first one.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Bounds each individual attempt; a timed-out attempt is abandoned
    /// and counts as a retryable failure. The outer call is unaffected.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Uses the same delay before every retry.
    pub fn fixed_backoff(mut self, interval: Duration) -> Self {
        self.interval = Some(Arc::new(FixedInterval::new(interval)));
        self
    }

    /// Uses exponential backoff starting at `initial`.
    pub fn exponential_backoff(mut self, initial: Duration) -> Self {
        self.interval = Some(Arc::new(ExponentialBackoff::new(initial)));
        self
    }

    /// Uses a custom backoff strategy.
    pub fn backoff<I>(mut self, interval: I) -> Self
    where
        I: IntervalFunction + 'static,
    {
        self.interval = Some(Arc::new(interval));
        self
    }

    /// Only retries errors matching the predicate; everything else is
    /// surfaced immediately as [`RetryError::Rejected`](crate::RetryError).
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate = Some(Arc::new(predicate));
        self
    }

    /// Names this retry instance for events and logs.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked before each retry sleep with the
    /// 1-indexed retry number and the chosen delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback invoked on success with the total number of
    /// attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when the attempt budget runs out.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback invoked when an error is classified as
    /// non-retryable and returned without further attempts.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if matches!(event, RetryEvent::Rejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the retry layer.
    pub fn build(self) -> crate::RetryLayer<E> {
        let interval = self
            .interval
            .unwrap_or_else(|| Arc::new(ExponentialBackoff::new(Duration::from_millis(100))));

        crate::RetryLayer::new(RetryConfig {
            max_attempts: self.max_attempts,
            interval,
            retry_predicate: self.retry_predicate,
            attempt_timeout: self.attempt_timeout,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}
