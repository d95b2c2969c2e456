use thiserror::Error;

/// Errors from the broker layer.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A single connection attempt failed.
    #[error("broker connection failed: {0}")]
    Connect(#[source] lapin::Error),

    /// The supervised connect ran out of attempts. Fatal to the owning
    /// process: propagate to the entry point and let an external
    /// supervisor restart it.
    #[error("broker unreachable after {attempts} connection attempts")]
    ConnectExhausted {
        attempts: usize,
        #[source]
        last: lapin::Error,
    },

    /// Opening a channel on an established connection failed.
    #[error("channel creation failed")]
    Channel(#[source] lapin::Error),

    /// Declaring or binding an exchange or queue failed.
    #[error("topology declaration failed for {name}")]
    Topology {
        name: String,
        #[source]
        source: lapin::Error,
    },

    /// A publish (or its broker confirmation) failed.
    #[error("publish with routing key {routing_key} failed")]
    Publish {
        routing_key: String,
        #[source]
        source: lapin::Error,
    },

    /// Starting the consume stream failed.
    #[error("consume from {queue} failed")]
    Consume {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    /// An event payload could not be serialized.
    #[error("event payload could not be serialized")]
    Payload(#[from] serde_json::Error),
}
