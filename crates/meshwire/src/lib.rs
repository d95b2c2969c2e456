//! Resilient cross-service calls and event propagation.
//!
//! meshwire is a small family of crates for services that must call
//! each other over unreliable links and stay consistent despite partial
//! failures:
//!
//! - **Retry** (`retry` feature): bounded attempts with per-attempt
//!   timeouts and exponential backoff + jitter
//! - **Circuit breaker** (`circuitbreaker` feature): stops hammering a
//!   failing dependency, probes recovery with a single trial call, and
//!   routes failure paths through a fallback
//! - **Fallback** (`fallback` feature): an event-fed replica cache
//!   consulted as a last resort so the dependent service degrades
//!   instead of failing outright
//! - **Broker** (`broker` feature): publish-on-state-change and
//!   at-least-once idempotent consumption over a durable AMQP topic
//!   exchange
//!
//! Enable the patterns you need:
//!
//! ```toml
//! [dependencies]
//! meshwire = { version = "0.1", features = ["retry", "circuitbreaker", "fallback"] }
//! ```
//!
//! Each pattern is also available as a standalone crate
//! (`meshwire-retry`, `meshwire-circuitbreaker`, `meshwire-fallback`,
//! `meshwire-broker`) for minimal dependency trees.

// Re-export core (always available)
pub use meshwire_core as core;

#[cfg(feature = "broker")]
pub use meshwire_broker as broker;

#[cfg(feature = "circuitbreaker")]
pub use meshwire_circuitbreaker as circuitbreaker;

#[cfg(feature = "fallback")]
pub use meshwire_fallback as fallback;

#[cfg(feature = "retry")]
pub use meshwire_retry as retry;
