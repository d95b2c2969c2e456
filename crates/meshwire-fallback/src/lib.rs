//! Event-fed replica cache used as the last-resort fallback for remote
//! lookups.
//!
//! The cache holds local copies of records owned by another service,
//! keyed by their id. It is populated exclusively by the event consumer
//! applying upstream state-change events; the synchronous call path
//! only ever reads it. That one-way flow is what makes the fallback
//! safe to consult without any coordination with in-flight calls.

mod replica;

pub use replica::{CacheEntry, ReplicaCache};
