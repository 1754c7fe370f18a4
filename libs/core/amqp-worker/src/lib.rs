//! AMQP 0.9.1 worker framework for the notification pipeline.
//!
//! Wraps a RabbitMQ broker (via `lapin`) behind four pieces: a connection
//! helper with fixed-delay retry, an idempotent topology declarer, a JSON
//! publisher and a bounded-concurrency consumer pool with explicit ack/nack.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────────┐     ┌────────────────────┐
//! │   Publisher    │────▶│ Exchange (direct)   │────▶│   ConsumerPool     │
//! │ (JSON, durable)│     │  └▶ bound queues    │     │ (Semaphore+JoinSet)│
//! └────────────────┘     └─────────────────────┘     └─────────┬──────────┘
//!                                  ▲                           │
//!                                  │ poison messages           ▼
//!                        ┌─────────┴─────────┐        ┌────────────────────┐
//!                        │ dead-letter queue │◀───────│  DeliveryHandler   │
//!                        └───────────────────┘        └────────────────────┘
//! ```
//!
//! # Delivery contract
//!
//! - Handler success → ack, issued after the handler returns
//! - Handler failure or panic → nack with requeue
//! - With a redelivery ceiling configured, a message that keeps failing (or
//!   fails permanently) is republished to the dead-letter route and acked
//!
//! # Example
//!
//! ```rust,ignore
//! use amqp_worker::{connect, setup_channel, ConsumerConfig, ConsumerPool, QueueBinding};
//!
//! const ORDERS: QueueBinding = QueueBinding::new("orders", "order.created", "events");
//!
//! let connection = connect(&url, "orders-worker", 5, Duration::from_secs(3)).await?;
//! let channel = setup_channel(&connection, &[ORDERS]).await?;
//!
//! let pool = ConsumerPool::new(Arc::new(handler), ConsumerConfig::new(ORDERS.queue));
//! pool.consume(&channel, shutdown_rx).await?;
//! ```

mod config;
mod connection;
mod consumer;
mod delivery;
mod error;
mod handler;
pub mod metrics;
mod publisher;
mod redelivery;
mod topology;

pub use config::{ConsumerConfig, DeadLetterPolicy, DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_CONCURRENCY};
pub use connection::{close_connection, connect, retry_fixed};
pub use consumer::ConsumerPool;
pub use delivery::{Acknowledge, ChannelAcker, InboundDelivery};
pub use error::BrokerError;
pub use handler::{DeliveryHandler, FailureKind, HandlerError};
pub use metrics::{init_metrics, ConsumerMetrics, PublishMetrics};
pub use publisher::{
    enable_confirms, publish_json, ChannelSink, MessageSink, Publisher, JSON_CONTENT_TYPE,
};
pub use redelivery::{Disposition, RedeliveryTracker};
pub use topology::{exchanges, setup_channel, QueueBinding, PREFETCH_COUNT};

// Re-export so downstream crates name broker types without a direct lapin dependency
pub use lapin::types::FieldTable;
pub use lapin::{Channel, Connection};
