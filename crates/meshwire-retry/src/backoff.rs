//! Backoff strategies deciding how long to wait between attempts.

use rand::Rng;
use std::time::Duration;

/// Computes the delay to wait before a retry attempt.
///
/// `attempt` is zero-indexed: `next_interval(0)` is the delay before the
/// first retry. The index is scoped to a single outer call and is never
/// carried across calls.
pub trait IntervalFunction: Send + Sync {
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// The same delay before every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.interval
    }
}

/// Exponential backoff with an optional cap and additive uniform jitter.
///
/// The delay before retry `k` (zero-indexed) is
/// `initial * multiplier^k`, clamped to `max_interval` when one is set,
/// plus a uniform sample from `[0, jitter)` when jitter is set. The
/// jitter is additive so the deterministic part of the delay is a lower
/// bound regardless of the random draw.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    max_interval: Option<Duration>,
    jitter: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            max_interval: None,
            jitter: None,
        }
    }

    /// Sets the growth factor between attempts.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Caps the deterministic part of the delay.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Adds a uniform random delay from `[0, jitter)` on top of the
    /// exponential delay, de-synchronizing concurrent retriers.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let mut delay = Duration::from_secs_f64(scaled);
        if let Some(max) = self.max_interval {
            delay = delay.min(max);
        }
        if let Some(jitter) = self.jitter {
            if !jitter.is_zero() {
                delay += rand::rng().random_range(Duration::ZERO..jitter);
            }
        }
        delay
    }
}
