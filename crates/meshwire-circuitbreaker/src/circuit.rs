use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::counter;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls pass through to the inner service.
    Closed = 0,
    /// Calls are short-circuited without a network attempt.
    Open = 1,
    /// A single trial call is allowed through to probe recovery.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Point-in-time snapshot of the breaker's window, for health
/// endpoints and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub total_calls: usize,
    pub failure_count: usize,
    pub success_count: usize,
    /// Failure ratio over the current window, 0.0 to 1.0.
    pub failure_rate: f64,
    pub time_in_state: Duration,
}

/// The breaker's state value: a tagged state plus a rolling window of
/// the most recent call outcomes.
///
/// All decisions are functions of the recorded outcomes and the clock
/// value passed in by the caller; the circuit itself performs no I/O,
/// so the whole state machine is testable synchronously. Observers are
/// notified through the event listeners on the config.
pub(crate) struct Circuit {
    state: CircuitState,
    shared_state: Arc<AtomicU8>,
    entered_state_at: Instant,
    /// Outcomes of the last `window_size` calls, `true` = failure.
    window: VecDeque<bool>,
    /// Whether the half-open trial call is currently in flight.
    trial_in_flight: bool,
}

impl Circuit {
    pub(crate) fn new(shared_state: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            shared_state,
            entered_state_at: Instant::now(),
            window: VecDeque::new(),
            trial_in_flight: false,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn metrics(&self) -> CircuitMetrics {
        let total_calls = self.window.len();
        let failure_count = self.window.iter().filter(|failed| **failed).count();
        let failure_rate = if total_calls > 0 {
            failure_count as f64 / total_calls as f64
        } else {
            0.0
        };

        CircuitMetrics {
            state: self.state,
            total_calls,
            failure_count,
            success_count: total_calls - failure_count,
            failure_rate,
            time_in_state: self.entered_state_at.elapsed(),
        }
    }

    /// Decides whether a call may proceed at `now`.
    ///
    /// In `Open`, the reset timer is checked and an expired timer moves
    /// the circuit to `HalfOpen`, admitting the caller as the single
    /// trial. In `HalfOpen`, only one trial may be in flight at a time;
    /// everyone else is rejected until the trial's outcome is recorded.
    pub(crate) fn try_acquire<C>(&mut self, config: &CircuitBreakerConfig<C>, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now.duration_since(self.entered_state_at) >= config.reset_timeout {
                    self.transition_to(CircuitState::HalfOpen, config, now);
                    self.trial_in_flight = true;
                    true
                } else {
                    self.reject(config, now);
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    self.reject(config, now);
                    false
                } else {
                    self.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub(crate) fn record_success<C>(&mut self, config: &CircuitBreakerConfig<C>, now: Instant) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                pattern_name: config.name.clone(),
                timestamp: now,
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "breaker" => config.name.clone(), "outcome" => "success")
            .increment(1);

        match self.state {
            CircuitState::HalfOpen => {
                // The trial succeeded: the dependency has recovered.
                self.trial_in_flight = false;
                self.transition_to(CircuitState::Closed, config, now);
            }
            _ => self.push_outcome(false, config, now),
        }
    }

    pub(crate) fn record_failure<C>(&mut self, config: &CircuitBreakerConfig<C>, now: Instant) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                pattern_name: config.name.clone(),
                timestamp: now,
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "breaker" => config.name.clone(), "outcome" => "failure")
            .increment(1);

        match self.state {
            CircuitState::HalfOpen => {
                // A failed trial reopens the circuit and restarts the
                // reset timer.
                self.trial_in_flight = false;
                self.transition_to(CircuitState::Open, config, now);
            }
            _ => {
                self.push_outcome(true, config, now);
                if self.should_open(config) {
                    self.transition_to(CircuitState::Open, config, now);
                }
            }
        }
    }

    pub(crate) fn force_open<C>(&mut self, config: &CircuitBreakerConfig<C>, now: Instant) {
        self.transition_to(CircuitState::Open, config, now);
    }

    pub(crate) fn reset<C>(&mut self, config: &CircuitBreakerConfig<C>, now: Instant) {
        self.transition_to(CircuitState::Closed, config, now);
    }

    fn reject<C>(&self, config: &CircuitBreakerConfig<C>, now: Instant) {
        config
            .event_listeners
            .emit(&CircuitBreakerEvent::CallRejected {
                pattern_name: config.name.clone(),
                timestamp: now,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "breaker" => config.name.clone(), "outcome" => "rejected")
            .increment(1);
    }

    fn push_outcome<C>(&mut self, is_failure: bool, config: &CircuitBreakerConfig<C>, _now: Instant) {
        self.window.push_back(is_failure);
        while self.window.len() > config.window_size {
            self.window.pop_front();
        }
    }

    fn should_open<C>(&self, config: &CircuitBreakerConfig<C>) -> bool {
        let total = self.window.len();
        if total < config.min_calls {
            return false;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        failures as f64 / total as f64 >= config.failure_rate_threshold
    }

    fn transition_to<C>(
        &mut self,
        next: CircuitState,
        config: &CircuitBreakerConfig<C>,
        now: Instant,
    ) {
        if self.state == next {
            return;
        }
        let from = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                pattern_name: config.name.clone(),
                timestamp: now,
                from,
                to: next,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %config.name, ?from, to = ?next, "circuit state transition");

        #[cfg(feature = "metrics")]
        counter!(
            "circuitbreaker_transitions_total",
            "breaker" => config.name.clone(),
            "to" => match next {
                CircuitState::Closed => "closed",
                CircuitState::Open => "open",
                CircuitState::HalfOpen => "half_open",
            }
        )
        .increment(1);

        self.state = next;
        self.shared_state.store(next as u8, Ordering::Release);
        self.entered_state_at = now;
        self.window.clear();
        self.trial_in_flight = false;
    }
}
