//! Prometheus metrics for consumers and publishers
//!
//! Provides observability into queue throughput and handler health.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Call this once at startup from inside the tokio runtime. Subsequent calls
/// are no-ops and return the address chosen first.
pub fn init_metrics(addr: SocketAddr) -> Result<SocketAddr, BuildError> {
    EXPORTER
        .get_or_try_init(|| {
            PrometheusBuilder::new().with_http_listener(addr).install()?;
            info!(%addr, "Prometheus exporter listening");
            Ok(addr)
        })
        .copied()
}

/// Consumer pool metrics helper
#[derive(Clone)]
pub struct ConsumerMetrics {
    /// Queue name for labeling
    queue: String,
    /// Handler name for labeling
    handler: String,
}

impl ConsumerMetrics {
    pub fn new(queue: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            handler: handler.into(),
        }
    }

    pub fn delivery_received(&self, redelivered: bool) {
        counter!(
            "amqp_worker_deliveries_received_total",
            "queue" => self.queue.clone(),
            "redelivered" => redelivered.to_string()
        )
        .increment(1);
    }

    pub fn acked(&self, duration: Duration) {
        counter!(
            "amqp_worker_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "handler" => self.handler.clone(),
            "outcome" => "acked"
        )
        .increment(1);

        histogram!(
            "amqp_worker_handler_duration_seconds",
            "queue" => self.queue.clone(),
            "handler" => self.handler.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn requeued(&self, kind: &str) {
        counter!(
            "amqp_worker_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "handler" => self.handler.clone(),
            "outcome" => "requeued"
        )
        .increment(1);

        counter!(
            "amqp_worker_handler_errors_total",
            "queue" => self.queue.clone(),
            "handler" => self.handler.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn dead_lettered(&self) {
        counter!(
            "amqp_worker_deliveries_settled_total",
            "queue" => self.queue.clone(),
            "handler" => self.handler.clone(),
            "outcome" => "dead_lettered"
        )
        .increment(1);
    }

    pub fn in_flight(&self, count: usize) {
        gauge!(
            "amqp_worker_handlers_in_flight",
            "queue" => self.queue.clone()
        )
        .set(count as f64);
    }
}

/// Publisher metrics helper
#[derive(Clone)]
pub struct PublishMetrics {
    exchange: String,
}

impl PublishMetrics {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
        }
    }

    pub fn published(&self, routing_key: &str) {
        counter!(
            "amqp_worker_published_total",
            "exchange" => self.exchange.clone(),
            "routing_key" => routing_key.to_string(),
            "status" => "success"
        )
        .increment(1);
    }

    pub fn failed(&self, routing_key: &str) {
        counter!(
            "amqp_worker_published_total",
            "exchange" => self.exchange.clone(),
            "routing_key" => routing_key.to_string(),
            "status" => "failed"
        )
        .increment(1);
    }
}
