//! Publishing side of the event flow.
//!
//! Every state-changing operation publishes the full record, JSON
//! encoded, to one durable topic exchange under a routing key naming
//! the event type (`user.created`, `order.created`, ...). Messages are
//! marked persistent so they survive a broker restart once routed to a
//! durable queue.

use crate::error::BrokerError;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ExchangeKind};
use serde::Serialize;

/// Publishes events to a durable topic exchange.
pub struct EventPublisher {
    channel: Channel,
    exchange: String,
}

impl EventPublisher {
    /// Opens a channel and declares the durable topic exchange.
    pub async fn new(
        connection: &Connection,
        exchange: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let exchange = exchange.into();
        let channel = connection
            .create_channel()
            .await
            .map_err(BrokerError::Channel)?;
        channel
            .exchange_declare(
                &exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Topology {
                name: exchange.clone(),
                source,
            })?;

        Ok(Self { channel, exchange })
    }

    /// Publishes `record` as a persistent JSON message and waits for
    /// the broker's confirmation.
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        record: &T,
    ) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(record)?;

        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|source| BrokerError::Publish {
                routing_key: routing_key.to_string(),
                source,
            })?;

        confirm.await.map_err(|source| BrokerError::Publish {
            routing_key: routing_key.to_string(),
            source,
        })?;

        Ok(())
    }

    /// Fire-and-forget publish for use after a local mutation has
    /// already committed: a failure is logged and swallowed, never
    /// retried and never surfaced to the caller of the mutation.
    pub async fn publish_best_effort<T: Serialize>(&self, routing_key: &str, record: &T) {
        if let Err(error) = self.publish(routing_key, record).await {
            tracing::warn!(
                routing_key,
                error = %error,
                "event publish failed; the local mutation stands and the event is lost"
            );
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}
