//! Core infrastructure for meshwire.
//!
//! This crate provides the shared functionality used across all meshwire
//! pattern crates:
//! - Event system for observability without coupling to a logging sink

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, PatternEvent};
