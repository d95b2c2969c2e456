//! Failure classification for circuit breaker accounting.
//!
//! Not every error means the dependency is unhealthy: an upstream
//! not-found is a perfectly good answer from a perfectly healthy
//! service. The classifier decides which results count against the
//! failure window (and, on the fallback-wired breaker, which results
//! are replaced by the fallback).

use std::sync::Arc;

/// Decides whether a call result counts as a failure.
pub trait FailureClassifier<Res, Err>: Send + Sync {
    /// Returns `true` if the result should be recorded as a failure.
    fn classify(&self, result: &Result<Res, Err>) -> bool;
}

/// Classifier that treats every error as a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<Res, Err> FailureClassifier<Res, Err> for DefaultClassifier {
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        result.is_err()
    }
}

/// A classifier backed by a closure over the concrete result type.
#[derive(Clone)]
pub struct FnClassifier<F> {
    f: Arc<F>,
}

impl<F> FnClassifier<F> {
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F, Res, Err> FailureClassifier<Res, Err> for FnClassifier<F>
where
    F: Fn(&Result<Res, Err>) -> bool + Send + Sync,
{
    fn classify(&self, result: &Result<Res, Err>) -> bool {
        (self.f)(result)
    }
}

impl<F> std::fmt::Debug for FnClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClassifier").finish_non_exhaustive()
    }
}
