//! Consumer pool configuration
//!
//! `ConsumerConfig` is built per queue. Defaults follow the broker QoS: ten
//! handlers in flight, matching the prefetch count.

use std::time::Duration;

/// Default upper bound on concurrently running handlers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default time allowed for in-flight handlers to finish after shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Where poison messages go once the redelivery ceiling is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterPolicy {
    /// Failures tolerated before a message is dead-lettered.
    pub max_redeliveries: u32,
    pub exchange: String,
    pub routing_key: String,
}

/// Configuration for a single queue consumer
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue to consume from
    pub queue: String,

    /// Consumer tag; empty lets the broker generate one
    pub consumer_tag: String,

    /// Maximum handlers running at once
    pub max_concurrency: usize,

    /// How long shutdown waits for in-flight handlers
    pub drain_timeout: Duration,

    /// Redelivery ceiling. `None` requeues failures indefinitely.
    pub dead_letter: Option<DeadLetterPolicy>,
}

impl ConsumerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            consumer_tag: String::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            dead_letter: None,
        }
    }

    /// Set the concurrency limit (clamped to at least one)
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Enable the redelivery ceiling, routing poison messages to `exchange`/`routing_key`.
    pub fn with_dead_letter(
        mut self,
        max_redeliveries: u32,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.dead_letter = Some(DeadLetterPolicy {
            max_redeliveries,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        });
        self
    }
}
