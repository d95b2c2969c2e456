use crate::circuit::CircuitState;
use meshwire_core::events::PatternEvent;
use std::time::Instant;

/// Events emitted by the circuit breaker.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved from one state to another.
    StateTransition {
        pattern_name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was short-circuited without touching the inner service.
    CallRejected {
        pattern_name: String,
        timestamp: Instant,
    },
    /// The fallback path was taken instead of returning the raw failure.
    FallbackInvoked {
        pattern_name: String,
        timestamp: Instant,
    },
    /// A call outcome was recorded as a success.
    SuccessRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call outcome was recorded as a failure.
    FailureRecorded {
        pattern_name: String,
        timestamp: Instant,
        state: CircuitState,
    },
}

impl PatternEvent for CircuitBreakerEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::StateTransition { .. } => "state_transition",
            Self::CallRejected { .. } => "call_rejected",
            Self::FallbackInvoked { .. } => "fallback_invoked",
            Self::SuccessRecorded { .. } => "success_recorded",
            Self::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::StateTransition { timestamp, .. }
            | Self::CallRejected { timestamp, .. }
            | Self::FallbackInvoked { timestamp, .. }
            | Self::SuccessRecorded { timestamp, .. }
            | Self::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            Self::StateTransition { pattern_name, .. }
            | Self::CallRejected { pattern_name, .. }
            | Self::FallbackInvoked { pattern_name, .. }
            | Self::SuccessRecorded { pattern_name, .. }
            | Self::FailureRecorded { pattern_name, .. } => pattern_name,
        }
    }
}
