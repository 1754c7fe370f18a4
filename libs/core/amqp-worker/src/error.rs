//! Error types for AMQP worker operations.

use thiserror::Error;

/// Error that can occur while talking to the broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Every connection attempt failed.
    #[error("Failed to connect to broker after {attempts} attempts: {last_error}")]
    Connect { attempts: u32, last_error: String },

    /// Channel could not be opened.
    #[error("Failed to open channel: {0}")]
    Channel(#[source] lapin::Error),

    /// A declaration (QoS, exchange, queue or binding) was rejected.
    #[error("Topology setup failed for {target}: {source}")]
    Topology {
        target: String,
        #[source]
        source: lapin::Error,
    },

    /// Payload could not be encoded; nothing was written to the broker.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker refused or failed a publish.
    #[error("Publish to '{exchange}' with key '{routing_key}' failed: {message}")]
    Publish {
        exchange: String,
        routing_key: String,
        message: String,
    },

    /// Consumer registration failed or the delivery stream broke.
    #[error("Consumer error on queue '{queue}': {message}")]
    Consume { queue: String, message: String },

    /// Ack or nack could not be delivered to the broker.
    #[error("Failed to {action} delivery {delivery_tag}: {message}")]
    Acknowledge {
        action: &'static str,
        delivery_tag: u64,
        message: String,
    },
}

impl BrokerError {
    pub fn topology(target: impl Into<String>, source: lapin::Error) -> Self {
        Self::Topology {
            target: target.into(),
            source,
        }
    }

    pub fn publish(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::Publish {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            message: error.to_string(),
        }
    }

    pub fn consume(queue: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Consume {
            queue: queue.into(),
            message: error.to_string(),
        }
    }
}
