//! Bounded-concurrency consumer for one queue.
//!
//! Every delivery is settled exactly once, and only after its handler has
//! returned:
//!
//! - handler `Ok` → ack
//! - handler `Err` or panic → nack with requeue, or, once the redelivery
//!   ceiling is configured and reached, publish to the dead-letter route and
//!   ack the original
//! - delivery received but never dispatched because shutdown began → nack
//!   with requeue

use crate::config::ConsumerConfig;
use crate::delivery::{Acknowledge, ChannelAcker, InboundDelivery};
use crate::error::BrokerError;
use crate::handler::{DeliveryHandler, HandlerError};
use crate::metrics::ConsumerMetrics;
use crate::publisher::MessageSink;
use crate::redelivery::{Disposition, RedeliveryTracker};
use futures::{FutureExt, Stream, StreamExt};
use lapin::options::{BasicCancelOptions, BasicConsumeOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use std::any::Any;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

struct DeadLetterRoute {
    sink: Arc<dyn MessageSink>,
    tracker: RedeliveryTracker,
    exchange: String,
    routing_key: String,
}

/// Consumes one queue, running at most `max_concurrency` handlers at a time.
pub struct ConsumerPool<H: ?Sized> {
    handler: Arc<H>,
    config: ConsumerConfig,
    limiter: Arc<Semaphore>,
    metrics: ConsumerMetrics,
    dead_letter: Option<Arc<DeadLetterRoute>>,
}

impl<H> ConsumerPool<H>
where
    H: DeliveryHandler + ?Sized + 'static,
{
    pub fn new(handler: Arc<H>, config: ConsumerConfig) -> Self {
        let metrics = ConsumerMetrics::new(&config.queue, handler.name());
        Self {
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            handler,
            config,
            metrics,
            dead_letter: None,
        }
    }

    /// Sink used to republish poison messages.
    ///
    /// Only takes effect when the config carries a dead-letter policy.
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        match &self.config.dead_letter {
            Some(policy) => {
                self.dead_letter = Some(Arc::new(DeadLetterRoute {
                    sink,
                    tracker: RedeliveryTracker::new(policy.max_redeliveries),
                    exchange: policy.exchange.clone(),
                    routing_key: policy.routing_key.clone(),
                }));
            }
            None => warn!(
                queue = %self.config.queue,
                "Dead-letter sink given without a dead-letter policy; failures will requeue indefinitely"
            ),
        }
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Register a manual-ack consumer on `channel` and process deliveries until
    /// shutdown or until the broker closes the delivery stream.
    ///
    /// On shutdown the consumer is cancelled first, so the broker stops pushing,
    /// then in-flight handlers are drained.
    pub async fn consume(
        &self,
        channel: &Channel,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), BrokerError> {
        let consumer = channel
            .basic_consume(
                &self.config.queue,
                &self.config.consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    exclusive: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::consume(&self.config.queue, e))?;

        let consumer_tag = consumer.tag().as_str().to_string();
        info!(queue = %self.config.queue, consumer_tag = %consumer_tag, "Consumer registered");

        let ack_channel = channel.clone();
        let deliveries = consumer.map(move |item| {
            item.map(|delivery| InboundDelivery::<ChannelAcker>::from_lapin(&ack_channel, delivery))
        });

        let (in_flight, outcome) = self.dispatch(deliveries, shutdown).await;

        if let Err(e) = channel
            .basic_cancel(&consumer_tag, BasicCancelOptions::default())
            .await
        {
            debug!(queue = %self.config.queue, error = %e, "Consumer cancel failed");
        }

        self.drain(in_flight).await;
        outcome
    }

    /// Process an arbitrary delivery stream until shutdown or until it ends.
    ///
    /// Returns `Ok` only for a shutdown-initiated stop; a closed or failing
    /// stream is reported as [`BrokerError::Consume`] after draining.
    pub async fn run<S, A, E>(
        &self,
        deliveries: S,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<InboundDelivery<A>, E>>,
        A: Acknowledge,
        E: Display,
    {
        let (in_flight, outcome) = self.dispatch(deliveries, shutdown).await;
        self.drain(in_flight).await;
        outcome
    }

    async fn dispatch<S, A, E>(
        &self,
        deliveries: S,
        mut shutdown: watch::Receiver<bool>,
    ) -> (JoinSet<()>, Result<(), BrokerError>)
    where
        S: Stream<Item = Result<InboundDelivery<A>, E>>,
        A: Acknowledge,
        E: Display,
    {
        let queue = self.config.queue.as_str();
        info!(
            queue,
            handler = self.handler.name(),
            max_concurrency = self.config.max_concurrency,
            dead_letter = self.dead_letter.is_some(),
            "Starting consumer"
        );

        let mut deliveries = std::pin::pin!(deliveries);
        let mut in_flight = JoinSet::new();

        let outcome = loop {
            if *shutdown.borrow() {
                info!(queue, "Shutdown signal received, stopping consumer");
                break Ok(());
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!(queue, "Shutdown channel closed, stopping consumer");
                        break Ok(());
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.reap(joined, in_flight.len());
                }

                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.metrics.delivery_received(delivery.redelivered);
                        if delivery.redelivered {
                            debug!(queue, delivery_tag = delivery.delivery_tag, "Processing redelivered message");
                        }

                        match self.acquire_slot(&mut shutdown, &mut in_flight).await {
                            Some(permit) => self.spawn(&mut in_flight, permit, delivery),
                            None => {
                                requeue_undispatched(queue, delivery).await;
                                info!(queue, "Shutdown signal received, stopping consumer");
                                break Ok(());
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!(queue, error = %e, "Delivery stream failed");
                        break Err(BrokerError::consume(queue, e));
                    }
                    None => {
                        warn!(queue, "Delivery stream closed by broker");
                        break Err(BrokerError::consume(queue, "delivery stream closed"));
                    }
                },
            }
        };

        (in_flight, outcome)
    }

    /// Wait for a free handler slot, giving up if shutdown starts first.
    async fn acquire_slot(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        in_flight: &mut JoinSet<()>,
    ) -> Option<OwnedSemaphorePermit> {
        loop {
            tokio::select! {
                biased;

                permit = Arc::clone(&self.limiter).acquire_owned() => return permit.ok(),

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.reap(joined, in_flight.len());
                }
            }
        }
    }

    fn spawn<A: Acknowledge>(
        &self,
        in_flight: &mut JoinSet<()>,
        permit: OwnedSemaphorePermit,
        delivery: InboundDelivery<A>,
    ) {
        let handler = Arc::clone(&self.handler);
        let metrics = self.metrics.clone();
        let dead_letter = self.dead_letter.clone();
        let queue = self.config.queue.clone();

        in_flight.spawn(async move {
            let _permit = permit;
            process_delivery(handler.as_ref(), delivery, &metrics, dead_letter.as_deref(), &queue)
                .await;
        });
        self.metrics.in_flight(in_flight.len());
    }

    fn reap(&self, joined: Result<(), JoinError>, remaining: usize) {
        if let Err(e) = joined {
            error!(queue = %self.config.queue, error = %e, "Handler task did not complete");
        }
        self.metrics.in_flight(remaining);
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        let queue = self.config.queue.as_str();
        if in_flight.is_empty() {
            info!(queue, "Consumer stopped");
            return;
        }

        let timeout = self.config.drain_timeout;
        info!(
            queue,
            in_flight = in_flight.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Draining in-flight handlers"
        );

        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = in_flight.join_next().await {
                self.reap(joined, in_flight.len());
            }
        })
        .await;

        match drained {
            Ok(()) => info!(queue, "Consumer stopped after draining"),
            Err(_) => {
                warn!(
                    queue,
                    abandoned = in_flight.len(),
                    "Drain timeout elapsed; unsettled deliveries return to the queue when the channel closes"
                );
                in_flight.detach_all();
            }
        }
    }
}

async fn requeue_undispatched<A: Acknowledge>(queue: &str, delivery: InboundDelivery<A>) {
    if let Err(e) = delivery.acker.nack(true).await {
        warn!(queue, delivery_tag = delivery.delivery_tag, error = %e, "Failed to requeue undispatched delivery");
    }
}

async fn process_delivery<H, A>(
    handler: &H,
    delivery: InboundDelivery<A>,
    metrics: &ConsumerMetrics,
    dead_letter: Option<&DeadLetterRoute>,
    queue: &str,
) where
    H: DeliveryHandler + ?Sized,
    A: Acknowledge,
{
    let delivery_tag = delivery.delivery_tag;
    let start = Instant::now();

    let result = match AssertUnwindSafe(handler.handle(&delivery.body))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    };

    let error = match result {
        Ok(()) => {
            if let Some(route) = dead_letter {
                route.tracker.forget(&delivery.body);
            }
            match delivery.acker.ack().await {
                Ok(()) => {
                    metrics.acked(start.elapsed());
                    debug!(
                        queue,
                        delivery_tag,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Delivery acked"
                    );
                }
                Err(e) => error!(queue, delivery_tag, error = %e, "Failed to ack delivery"),
            }
            return;
        }
        Err(error) => error,
    };

    let kind = error.kind();
    let route = match dead_letter {
        Some(route) => route,
        None => {
            requeue(queue, &delivery, metrics, &error, None).await;
            return;
        }
    };

    match route
        .tracker
        .record_failure(&delivery.body, kind)
    {
        Disposition::Requeue { failures } => {
            requeue(queue, &delivery, metrics, &error, Some(failures)).await;
        }
        Disposition::DeadLetter { failures } => {
            let headers = dead_letter_headers(queue, &error, failures);
            match route
                .sink
                .publish_bytes(&route.exchange, &route.routing_key, &delivery.body, headers)
                .await
            {
                Ok(()) => {
                    warn!(
                        queue,
                        delivery_tag,
                        failures,
                        kind = %kind,
                        error = %error,
                        "Moved delivery to dead-letter queue"
                    );
                    metrics.dead_lettered();
                    if let Err(e) = delivery.acker.ack().await {
                        error!(queue, delivery_tag, error = %e, "Failed to ack dead-lettered delivery");
                    }
                }
                Err(e) => {
                    error!(queue, delivery_tag, error = %e, "Dead-letter publish failed, requeueing");
                    requeue(queue, &delivery, metrics, &error, Some(failures)).await;
                }
            }
        }
    }
}

async fn requeue<A: Acknowledge>(
    queue: &str,
    delivery: &InboundDelivery<A>,
    metrics: &ConsumerMetrics,
    error: &HandlerError,
    failures: Option<u32>,
) {
    warn!(
        queue,
        delivery_tag = delivery.delivery_tag,
        redelivered = delivery.redelivered,
        failures = ?failures,
        kind = %error.kind(),
        error = %error,
        "Handler failed, requeueing delivery"
    );
    metrics.requeued(&error.kind().to_string());

    if let Err(e) = delivery.acker.nack(true).await {
        error!(queue, delivery_tag = delivery.delivery_tag, error = %e, "Failed to nack delivery");
    }
}

fn dead_letter_headers(queue: &str, error: &HandlerError, failures: u32) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(
        "x-original-queue".into(),
        AMQPValue::LongString(queue.to_string().into()),
    );
    headers.insert(
        "x-failure-reason".into(),
        AMQPValue::LongString(error.to_string().into()),
    );
    headers.insert("x-attempts".into(), AMQPValue::LongUInt(failures));
    headers
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::test_ackers::{delivery, RecordingAcker, Settlement};
    use crate::handler::test_handlers::{CountingHandler, PanickingHandler, RejectingHandler};
    use crate::publisher::test_sinks::RecordingSink;
    use async_trait::async_trait;
    use futures::stream;
    use lapin::types::ShortString;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    type Item = Result<InboundDelivery<RecordingAcker>, String>;

    fn deliveries(acker: &RecordingAcker, count: u64) -> Vec<Item> {
        (1..=count)
            .map(|tag| Ok(delivery(acker, tag, br#"{"id":1,"name":"hello"}"#)))
            .collect()
    }

    fn sorted(mut settled: Vec<(u64, Settlement)>) -> Vec<(u64, Settlement)> {
        settled.sort_by_key(|(tag, _)| *tag);
        settled
    }

    #[tokio::test]
    async fn test_success_acks_each_delivery_once() {
        let acker = RecordingAcker::default();
        let handler = CountingHandler::succeeding(Duration::from_millis(5));
        let pool = ConsumerPool::new(handler.clone(), ConsumerConfig::new("q"));
        let (_tx, rx) = watch::channel(false);

        let result = pool.run(stream::iter(deliveries(&acker, 3)), rx).await;

        // stream ended without a shutdown signal
        assert!(matches!(result, Err(BrokerError::Consume { .. })));
        assert_eq!(
            sorted(acker.settled()),
            vec![(1, Settlement::Ack), (2, Settlement::Ack), (3, Settlement::Ack)]
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_nacks_with_requeue_once() {
        let acker = RecordingAcker::default();
        let pool = ConsumerPool::new(CountingHandler::failing(), ConsumerConfig::new("q"));
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 2)), rx).await;

        assert_eq!(
            sorted(acker.settled()),
            vec![
                (1, Settlement::Nack { requeue: true }),
                (2, Settlement::Nack { requeue: true })
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let acker = RecordingAcker::default();
        let handler = CountingHandler::succeeding(Duration::from_millis(20));
        let config = ConsumerConfig::new("q").with_max_concurrency(3);
        let pool = ConsumerPool::new(handler.clone(), config);
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 13)), rx).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 13);
        let peak = handler.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {peak}");
        assert!(peak >= 1);
        assert_eq!(acker.settled().len(), 13);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_nacked_and_pool_survives() {
        let acker = RecordingAcker::default();
        let pool = ConsumerPool::new(Arc::new(PanickingHandler), ConsumerConfig::new("q"));
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 2)), rx).await;

        assert_eq!(
            sorted(acker.settled()),
            vec![
                (1, Settlement::Nack { requeue: true }),
                (2, Settlement::Nack { requeue: true })
            ]
        );
    }

    #[tokio::test]
    async fn test_ack_happens_after_handler_returns() {
        struct SlowHandler {
            finished: Arc<AtomicBool>,
        }

        #[async_trait]
        impl DeliveryHandler for SlowHandler {
            async fn handle(&self, _body: &[u8]) -> Result<(), HandlerError> {
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.finished.store(true, Ordering::SeqCst);
                Ok(())
            }

            fn name(&self) -> &'static str {
                "slow"
            }
        }

        struct ObservingAcker {
            finished: Arc<AtomicBool>,
            observed: Arc<Mutex<Vec<bool>>>,
        }

        #[async_trait]
        impl Acknowledge for ObservingAcker {
            async fn ack(&self) -> Result<(), BrokerError> {
                self.observed
                    .lock()
                    .unwrap()
                    .push(self.finished.load(Ordering::SeqCst));
                Ok(())
            }

            async fn nack(&self, _requeue: bool) -> Result<(), BrokerError> {
                panic!("unexpected nack");
            }
        }

        let finished = Arc::new(AtomicBool::new(false));
        let observed = Arc::new(Mutex::new(Vec::new()));
        let item: Result<_, String> = Ok(InboundDelivery {
            body: b"{}".to_vec(),
            delivery_tag: 1,
            redelivered: false,
            content_type: None,
            acker: ObservingAcker {
                finished: finished.clone(),
                observed: observed.clone(),
            },
        });

        let pool = ConsumerPool::new(
            Arc::new(SlowHandler {
                finished: finished.clone(),
            }),
            ConsumerConfig::new("q"),
        );
        let (_tx, rx) = watch::channel(false);
        let _ = pool.run(stream::iter(vec![item]), rx).await;

        assert_eq!(*observed.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_consumer_cleanly() {
        let acker = RecordingAcker::default();
        let handler = CountingHandler::succeeding(Duration::ZERO);
        let pool = ConsumerPool::new(handler.clone(), ConsumerConfig::new("q"));
        let (tx, rx) = watch::channel(false);

        let deliveries = stream::iter(deliveries(&acker, 2)).chain(stream::pending());
        let run = tokio::spawn(async move { pool.run(deliveries, rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("consumer did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(acker.settled().len(), 2);
    }

    #[tokio::test]
    async fn test_delivery_waiting_for_slot_is_requeued_on_shutdown() {
        /// Holds every call until `release` is notified.
        struct GatedHandler {
            started: Notify,
            release: Notify,
        }

        #[async_trait]
        impl DeliveryHandler for GatedHandler {
            async fn handle(&self, _body: &[u8]) -> Result<(), HandlerError> {
                self.started.notify_one();
                self.release.notified().await;
                Ok(())
            }

            fn name(&self) -> &'static str {
                "gated"
            }
        }

        let acker = RecordingAcker::default();
        let handler = Arc::new(GatedHandler {
            started: Notify::new(),
            release: Notify::new(),
        });
        let config = ConsumerConfig::new("q").with_max_concurrency(1);
        let pool = ConsumerPool::new(handler.clone(), config);
        let (tx, rx) = watch::channel(false);

        let deliveries = stream::iter(deliveries(&acker, 2)).chain(stream::pending());
        let run = tokio::spawn(async move { pool.run(deliveries, rx).await });

        // first delivery holds the only slot, second waits for it
        handler.started.notified().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(acker.settled(), vec![(2, Settlement::Nack { requeue: true })]);

        handler.release.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("consumer did not stop")
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(
            acker.settled(),
            vec![(2, Settlement::Nack { requeue: true }), (1, Settlement::Ack)]
        );
    }

    #[tokio::test]
    async fn test_drain_timeout_bounds_shutdown() {
        let acker = RecordingAcker::default();
        let handler = CountingHandler::succeeding(Duration::from_secs(5));
        let config = ConsumerConfig::new("q").with_drain_timeout(Duration::from_millis(20));
        let pool = ConsumerPool::new(handler.clone(), config);
        let (tx, rx) = watch::channel(false);

        let deliveries = stream::iter(deliveries(&acker, 1)).chain(stream::pending());
        let started = Instant::now();
        let run = tokio::spawn(async move { pool.run(deliveries, rx).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        let result = run.await.unwrap();

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(2));
        // handler still sleeping, nothing settled yet
        assert!(acker.settled().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_ceiling_moves_message_to_dead_letter() {
        let acker = RecordingAcker::default();
        let sink = Arc::new(RecordingSink::default());
        let config = ConsumerConfig::new("subscription_expiring_queue")
            .with_max_concurrency(1)
            .with_dead_letter(1, "notifications", "dead_letter");
        let pool = ConsumerPool::new(CountingHandler::failing(), config).with_dead_letter_sink(sink.clone());
        let (_tx, rx) = watch::channel(false);

        let first = delivery(&acker, 1, b"poison");
        let mut second = delivery(&acker, 2, b"poison");
        second.redelivered = true;
        let items: Vec<Item> = vec![Ok(first), Ok(second)];

        let _ = pool.run(stream::iter(items), rx).await;

        assert_eq!(
            acker.settled(),
            vec![(1, Settlement::Nack { requeue: true }), (2, Settlement::Ack)]
        );

        let writes = sink.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].exchange, "notifications");
        assert_eq!(writes[0].routing_key, "dead_letter");
        assert_eq!(writes[0].payload, b"poison");
        assert_eq!(
            writes[0].headers.inner().get(&ShortString::from("x-original-queue")),
            Some(&AMQPValue::LongString("subscription_expiring_queue".to_string().into()))
        );
        assert_eq!(
            writes[0].headers.inner().get(&ShortString::from("x-attempts")),
            Some(&AMQPValue::LongUInt(2))
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_lettered_immediately() {
        let acker = RecordingAcker::default();
        let sink = Arc::new(RecordingSink::default());
        let config = ConsumerConfig::new("q").with_dead_letter(5, "notifications", "dead_letter");
        let pool = ConsumerPool::new(Arc::new(RejectingHandler), config).with_dead_letter_sink(sink.clone());
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 1)), rx).await;

        assert_eq!(acker.settled(), vec![(1, Settlement::Ack)]);
        assert_eq!(sink.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_without_dead_letter_requeues() {
        let acker = RecordingAcker::default();
        let pool = ConsumerPool::new(Arc::new(RejectingHandler), ConsumerConfig::new("q"));
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 1)), rx).await;

        assert_eq!(acker.settled(), vec![(1, Settlement::Nack { requeue: true })]);
    }

    #[tokio::test]
    async fn test_dead_letter_publish_failure_falls_back_to_requeue() {
        let acker = RecordingAcker::default();
        let sink = Arc::new(RecordingSink::failing_on(vec![1]));
        let config = ConsumerConfig::new("q").with_dead_letter(0, "notifications", "dead_letter");
        let pool = ConsumerPool::new(CountingHandler::failing(), config).with_dead_letter_sink(sink.clone());
        let (_tx, rx) = watch::channel(false);

        let _ = pool.run(stream::iter(deliveries(&acker, 1)), rx).await;

        assert_eq!(acker.settled(), vec![(1, Settlement::Nack { requeue: true })]);
        assert!(sink.writes().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_is_reported() {
        let acker = RecordingAcker::default();
        let pool = ConsumerPool::new(
            CountingHandler::succeeding(Duration::ZERO),
            ConsumerConfig::new("trial_expiring_queue"),
        );
        let (_tx, rx) = watch::channel(false);

        let mut items = deliveries(&acker, 1);
        items.push(Err("channel closed by broker".to_string()));

        let err = pool.run(stream::iter(items), rx).await.unwrap_err();
        assert!(err.to_string().contains("trial_expiring_queue"));
        assert!(err.to_string().contains("channel closed by broker"));
        assert_eq!(acker.settled(), vec![(1, Settlement::Ack)]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
