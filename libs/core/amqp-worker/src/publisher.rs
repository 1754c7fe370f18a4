//! Publishing JSON events to an exchange.

use crate::error::BrokerError;
use crate::metrics::PublishMetrics;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Raw write to the broker.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn publish_bytes(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError>;
}

/// [`MessageSink`] over a lapin channel.
///
/// Channels are not safe for concurrent publishes, so every write holds the lock
/// until the broker confirm (when confirms are enabled) has been received.
pub struct ChannelSink {
    channel: Mutex<Channel>,
}

impl ChannelSink {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn publish_bytes(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        let channel = self.channel.lock().await;

        let properties = BasicProperties::default()
            .with_content_type(JSON_CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT)
            .with_headers(headers);

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BrokerError::publish(exchange, routing_key, e))?
            .await
            .map_err(|e| BrokerError::publish(exchange, routing_key, format!("confirm failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(BrokerError::publish(exchange, routing_key, "broker nacked the message"));
        }

        Ok(())
    }
}

/// Put the channel in publisher-confirm mode so each publish waits for the broker.
pub async fn enable_confirms(channel: &Channel) -> Result<(), BrokerError> {
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| BrokerError::topology("publisher confirms", e))
}

/// Serialize `payload` and publish it.
///
/// Serialization happens before anything touches the sink, so an
/// unserializable payload never produces a partial write.
pub async fn publish_json<T>(
    sink: &dyn MessageSink,
    exchange: &str,
    routing_key: &str,
    payload: &T,
) -> Result<(), BrokerError>
where
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload)?;
    sink.publish_bytes(exchange, routing_key, &body, FieldTable::default())
        .await
}

/// Publishes JSON events to one exchange.
///
/// Cheap to clone; clones share the underlying sink and its lock.
#[derive(Clone)]
pub struct Publisher {
    sink: Arc<dyn MessageSink>,
    exchange: String,
    metrics: PublishMetrics,
}

impl Publisher {
    pub fn new(sink: Arc<dyn MessageSink>, exchange: impl Into<String>) -> Self {
        let exchange = exchange.into();
        Self {
            metrics: PublishMetrics::new(&exchange),
            sink,
            exchange,
        }
    }

    /// Publisher over a lapin channel.
    pub fn for_channel(channel: Channel, exchange: impl Into<String>) -> Self {
        Self::new(Arc::new(ChannelSink::new(channel)), exchange)
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The sink this publisher writes to, for sharing with a dead-letter route.
    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.sink)
    }

    pub async fn publish<T>(&self, routing_key: &str, payload: &T) -> Result<(), BrokerError>
    where
        T: Serialize + ?Sized,
    {
        match publish_json(self.sink.as_ref(), &self.exchange, routing_key, payload).await {
            Ok(()) => {
                self.metrics.published(routing_key);
                debug!(exchange = %self.exchange, routing_key, "Event published");
                Ok(())
            }
            Err(e) => {
                self.metrics.failed(routing_key);
                error!(exchange = %self.exchange, routing_key, error = %e, "Failed to publish event");
                Err(e)
            }
        }
    }
}
