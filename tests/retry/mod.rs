//! Comprehensive tests for the retry pattern.
//!
//! Test organization:
//! - behavior.rs: attempt counting, exhaustion, per-attempt timeouts
//! - predicates.rs: retryable vs non-retryable classification
//! - events.rs: listener hooks and the delays they report

mod behavior;
mod events;
mod predicates;
