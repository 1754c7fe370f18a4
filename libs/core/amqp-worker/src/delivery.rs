//! Inbound deliveries and their acknowledgement handle.

use crate::error::BrokerError;
use async_trait::async_trait;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use lapin::Channel;

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledge: Send + Sync + 'static {
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Negative acknowledgement. `requeue = true` returns the message to its queue.
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// A message handed to the consumer pool.
#[derive(Debug)]
pub struct InboundDelivery<A> {
    pub body: Vec<u8>,
    pub delivery_tag: u64,
    /// Set by the broker when this message was delivered before and not acked.
    pub redelivered: bool,
    pub content_type: Option<String>,
    pub acker: A,
}

/// Acknowledges by delivery tag on the channel the message arrived on.
#[derive(Clone)]
pub struct ChannelAcker {
    channel: Channel,
    delivery_tag: u64,
}

#[async_trait]
impl Acknowledge for ChannelAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(self.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Acknowledge {
                action: "ack",
                delivery_tag: self.delivery_tag,
                message: e.to_string(),
            })
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                self.delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Acknowledge {
                action: "nack",
                delivery_tag: self.delivery_tag,
                message: e.to_string(),
            })
    }
}

impl InboundDelivery<ChannelAcker> {
    pub fn from_lapin(channel: &Channel, delivery: Delivery) -> Self {
        let content_type = delivery
            .properties
            .content_type()
            .as_ref()
            .map(|ct| ct.as_str().to_string());

        Self {
            body: delivery.data,
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            content_type,
            acker: ChannelAcker {
                channel: channel.clone(),
                delivery_tag: delivery.delivery_tag,
            },
        }
    }
}
