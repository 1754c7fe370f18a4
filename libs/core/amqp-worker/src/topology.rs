//! Exchange/queue declarations.
//!
//! Every declaration is idempotent, so both services run the full setup on
//! every start. A service only declares the queues it touches.

use crate::error::BrokerError;
use lapin::options::{BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ExchangeKind};
use tracing::{debug, info};

/// Prefetch applied to every channel opened by [`setup_channel`].
pub const PREFETCH_COUNT: u16 = 10;

/// A durable queue bound to an exchange under one routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueBinding {
    pub queue: &'static str,
    pub routing_key: &'static str,
    pub exchange: &'static str,
}

impl QueueBinding {
    pub const fn new(queue: &'static str, routing_key: &'static str, exchange: &'static str) -> Self {
        Self {
            queue,
            routing_key,
            exchange,
        }
    }
}

/// Exchanges referenced by `bindings`, in first-seen order, each listed once.
pub fn exchanges(bindings: &[QueueBinding]) -> Vec<&'static str> {
    let mut seen = Vec::new();
    for binding in bindings {
        if !seen.contains(&binding.exchange) {
            seen.push(binding.exchange);
        }
    }
    seen
}

/// Open a channel and declare everything `bindings` needs on it.
///
/// Order: QoS, each exchange (durable, direct), then per binding a durable
/// queue followed by its binding. The first failure aborts setup and names the
/// object that was rejected.
pub async fn setup_channel(
    connection: &Connection,
    bindings: &[QueueBinding],
) -> Result<Channel, BrokerError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(BrokerError::Channel)?;

    channel
        .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
        .await
        .map_err(|e| BrokerError::topology("channel qos", e))?;

    for exchange in exchanges(bindings) {
        debug!(exchange, "Declaring exchange");
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::topology(format!("exchange '{exchange}'"), e))?;
    }

    for binding in bindings {
        declare_binding(&channel, binding).await?;
    }

    info!(
        bindings = bindings.len(),
        prefetch = PREFETCH_COUNT,
        "Channel topology ready"
    );
    Ok(channel)
}

async fn declare_binding(channel: &Channel, binding: &QueueBinding) -> Result<(), BrokerError> {
    debug!(
        queue = binding.queue,
        routing_key = binding.routing_key,
        exchange = binding.exchange,
        "Declaring queue"
    );

    channel
        .queue_declare(
            binding.queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BrokerError::topology(format!("queue '{}'", binding.queue), e))?;

    channel
        .queue_bind(
            binding.queue,
            binding.exchange,
            binding.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BrokerError::topology(
                format!(
                    "binding '{}' -> '{}' ({})",
                    binding.exchange, binding.queue, binding.routing_key
                ),
                e,
            )
        })?;

    Ok(())
}
