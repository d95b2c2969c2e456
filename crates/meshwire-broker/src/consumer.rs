//! Consuming side of the event flow.
//!
//! A consumer binds one durable queue to the topic exchange under the
//! routing key it cares about and applies every received message to a
//! [`ReplicaCache`], keyed by the id extracted from the payload.
//! Delivery is at-least-once: applying is idempotent (overwrite per
//! id), so duplicates are harmless. A payload that does not parse is
//! rejected WITHOUT requeue — losing one malformed message is preferred
//! over poison-looping the queue.

use crate::error::BrokerError;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ExchangeKind};
use meshwire_fallback::ReplicaCache;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Where a consumer reads from and how it keys what it reads.
pub struct ConsumerConfig<V> {
    exchange: String,
    queue: String,
    routing_key: String,
    consumer_tag: String,
    prefetch: u16,
    key: Arc<dyn Fn(&V) -> String + Send + Sync>,
}

impl<V> ConsumerConfig<V> {
    /// Creates a config binding `queue` to `exchange` under
    /// `routing_key`, extracting each record's id with `key`.
    pub fn new<F>(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        key: F,
    ) -> Self
    where
        F: Fn(&V) -> String + Send + Sync + 'static,
    {
        let queue = queue.into();
        Self {
            exchange: exchange.into(),
            consumer_tag: format!("{queue}.consumer"),
            queue,
            routing_key: routing_key.into(),
            prefetch: 16,
            key: Arc::new(key),
        }
    }

    pub fn consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Caps unacknowledged deliveries in flight (backpressure).
    ///
    /// Default: 16
    pub fn prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl<V> Clone for ConsumerConfig<V> {
    fn clone(&self) -> Self {
        Self {
            exchange: self.exchange.clone(),
            queue: self.queue.clone(),
            routing_key: self.routing_key.clone(),
            consumer_tag: self.consumer_tag.clone(),
            prefetch: self.prefetch,
            key: Arc::clone(&self.key),
        }
    }
}

/// What happened to one delivered message.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The payload parsed and was written to the cache under `key`.
    Applied { key: String },
    /// The payload did not parse and was discarded.
    Discarded { error: serde_json::Error },
}

/// Parses `payload` and, on success, writes it into the cache keyed by
/// the extracted id.
///
/// This is the whole per-message decision, factored out of the consume
/// loop so it can be exercised without a broker. Applying the same
/// payload twice leaves the cache identical to applying it once.
pub fn apply_message<V: DeserializeOwned>(
    cache: &ReplicaCache<V>,
    key: impl Fn(&V) -> String,
    payload: &[u8],
) -> ApplyOutcome {
    match serde_json::from_slice::<V>(payload) {
        Ok(record) => {
            let key = key(&record);
            cache.insert(key.clone(), record);
            ApplyOutcome::Applied { key }
        }
        Err(error) => ApplyOutcome::Discarded { error },
    }
}

/// A long-lived consumer feeding one [`ReplicaCache`].
pub struct EventConsumer<V> {
    channel: Channel,
    config: ConsumerConfig<V>,
}

impl<V> EventConsumer<V>
where
    V: DeserializeOwned + Send + Sync + 'static,
{
    /// Declares the durable topology (topic exchange, queue, binding)
    /// and returns a consumer ready to run.
    pub async fn bind(
        connection: &Connection,
        config: ConsumerConfig<V>,
    ) -> Result<Self, BrokerError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(BrokerError::Channel)?;
        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(BrokerError::Channel)?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Topology {
                name: config.exchange.clone(),
                source,
            })?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Topology {
                name: config.queue.clone(),
                source,
            })?;

        channel
            .queue_bind(
                &config.queue,
                &config.exchange,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Topology {
                name: config.queue.clone(),
                source,
            })?;

        Ok(Self { channel, config })
    }

    /// Consumes deliveries until the stream ends, applying each one to
    /// `cache`. Intended to be spawned as its own task, independent of
    /// any request handling.
    pub async fn run(self, cache: ReplicaCache<V>) -> Result<(), BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                &self.config.queue,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| BrokerError::Consume {
                queue: self.config.queue.clone(),
                source,
            })?;

        tracing::info!(
            queue = %self.config.queue,
            routing_key = %self.config.routing_key,
            "consuming events"
        );

        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(error) => {
                    tracing::warn!(queue = %self.config.queue, error = %error, "delivery error");
                    continue;
                }
            };

            match apply_message(&cache, |record| (self.config.key)(record), &delivery.data) {
                ApplyOutcome::Applied { key } => {
                    tracing::debug!(queue = %self.config.queue, key = %key, "event applied");
                    if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
                        tracing::warn!(queue = %self.config.queue, error = %error, "ack failed");
                    }
                }
                ApplyOutcome::Discarded { error } => {
                    tracing::warn!(
                        queue = %self.config.queue,
                        error = %error,
                        "discarding malformed message"
                    );
                    if let Err(error) = delivery
                        .reject(BasicRejectOptions { requeue: false })
                        .await
                    {
                        tracing::warn!(queue = %self.config.queue, error = %error, "reject failed");
                    }
                }
            }
        }

        tracing::info!(queue = %self.config.queue, "consume stream ended");
        Ok(())
    }
}
