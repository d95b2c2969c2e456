//! AMQP event propagation for meshwire.
//!
//! Services stay eventually consistent by publishing the full record on
//! every state change and consuming the records other services publish
//! into a local [`ReplicaCache`](meshwire_fallback::ReplicaCache). The
//! topology is one durable topic exchange; each consuming service binds
//! its own durable queue with a routing key naming the event type it
//! cares about.
//!
//! Delivery is at-least-once and consumption is idempotent; publishing
//! after a committed local mutation is best-effort (a lost event is
//! logged, never rolled back). The broker connection itself is
//! established at process start with [`connect_with_backoff`], whose
//! exhaustion is fatal to the process.

mod connect;
mod consumer;
mod error;
mod publisher;

pub use connect::{connect_with_backoff, SupervisorConfig};
pub use consumer::{apply_message, ApplyOutcome, ConsumerConfig, EventConsumer};
pub use error::BrokerError;
pub use publisher::EventPublisher;

// The AMQP client types (Connection in particular) appear in this
// crate's public API.
pub use lapin;
