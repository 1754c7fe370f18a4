//! Sender Service
//!
//! Consumes notification events and delivers them as email over SMTP.
//!
//! ## Architecture
//!
//! ```text
//! subscription_expiring_queue ──▶ ConsumerPool ──▶ NotificationDispatcher<SubscriptionExpiring>
//! trial_expiring_queue        ──▶ ConsumerPool ──▶ NotificationDispatcher<TrialExpiring>
//!                                      │                         │
//!                                      │ ack / requeue           ▼
//!                                      ▼                   SMTP relay
//!                          notifications.dead_letter
//!                          (after too many failures)
//! ```
//!
//! Each queue gets its own channel so a slow consumer never stalls the other.

use amqp_worker::{
    BrokerError, ChannelSink, ConsumerConfig, ConsumerPool, Connection, MessageSink, QueueBinding,
    close_connection, connect, enable_confirms, init_metrics, setup_channel,
};
use core_config::amqp::AmqpConfig;
use core_config::metrics::MetricsConfig;
use core_config::worker::WorkerSettings;
use core_config::{Environment, FromEnv};
use domain_notifications::queues::{DEAD_LETTER, SENDER_BINDINGS};
use domain_notifications::{
    Mailbox, NotificationDispatcher, NotificationEvent, SmtpConfig, SmtpTransport,
    SubscriptionExpiring, TemplateEngine, TrialExpiring,
};
use eyre::{Result, WrapErr, eyre};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

pub const SERVICE_NAME: &str = "subtrack-sender";

type ConsumerOutcome = std::result::Result<std::result::Result<(), BrokerError>, JoinError>;

/// Consumer settings for one queue, derived from the worker tuning.
pub fn consumer_config(binding: &QueueBinding, settings: &WorkerSettings) -> ConsumerConfig {
    let config = ConsumerConfig::new(binding.queue)
        .with_max_concurrency(settings.max_concurrency)
        .with_drain_timeout(settings.drain_timeout);

    match settings.max_redeliveries {
        Some(max) => config.with_dead_letter(max, DEAD_LETTER.exchange, DEAD_LETTER.routing_key),
        None => config,
    }
}

/// Run the sender
///
/// 1. Sets up structured logging (JSON for prod, pretty for dev)
/// 2. Loads templates and the SMTP relay settings
/// 3. Connects to the broker with fixed-delay retry
/// 4. Declares the full topology, including the dead-letter queue
/// 5. Consumes both event queues until SIGINT/SIGTERM or a consumer fails
///
/// # Errors
///
/// Returns an error if configuration is invalid, the broker stays unreachable
/// after all retries, or a consumer stops for any reason other than shutdown.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment, SERVICE_NAME);

    info!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        "Starting sender service"
    );

    let amqp = AmqpConfig::from_env().wrap_err("Failed to load AMQP configuration")?;
    let settings = WorkerSettings::from_env().wrap_err("Failed to load worker configuration")?;
    let smtp = SmtpConfig::from_env().wrap_err("Failed to load SMTP configuration")?;
    let metrics = MetricsConfig::from_env().wrap_err("Failed to load metrics configuration")?;

    start_metrics(&metrics)?;

    let mail = Mail {
        templates: TemplateEngine::new().wrap_err("Failed to register email templates")?,
        transport: Arc::new(SmtpTransport::new(&smtp).wrap_err("Failed to build SMTP transport")?),
        sender: smtp.sender().wrap_err("Invalid sender address")?,
    };
    info!(host = %smtp.host, port = smtp.port, tls = smtp.use_tls, "SMTP relay configured");

    let connection = connect(
        &amqp.url,
        &amqp.connection_name,
        amqp.connect_max_retries,
        amqp.connect_retry_delay,
    )
    .await
    .wrap_err("Failed to connect to AMQP broker")?;

    let result = serve(&connection, &settings, &mail).await;

    close_connection(&connection).await;
    info!("Sender service stopped");
    result
}

/// Everything a dispatcher needs to send mail.
struct Mail {
    templates: TemplateEngine,
    transport: Arc<SmtpTransport>,
    sender: Mailbox,
}

async fn serve(connection: &Connection, settings: &WorkerSettings, mail: &Mail) -> Result<()> {
    let control = setup_channel(connection, SENDER_BINDINGS)
        .await
        .wrap_err("Failed to declare sender topology")?;
    enable_confirms(&control)
        .await
        .wrap_err("Failed to enable publisher confirms")?;
    let dead_letters: Arc<dyn MessageSink> = Arc::new(ChannelSink::new(control));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = JoinSet::new();

    let started = async {
        spawn_consumer::<SubscriptionExpiring>(
            &mut consumers,
            connection,
            settings,
            mail,
            &dead_letters,
            shutdown_rx.clone(),
        )
        .await?;
        spawn_consumer::<TrialExpiring>(
            &mut consumers,
            connection,
            settings,
            mail,
            &dead_letters,
            shutdown_rx,
        )
        .await
    }
    .await;

    if let Err(e) = started {
        let _ = shutdown_tx.send(true);
        while consumers.join_next().await.is_some() {}
        return Err(e);
    }

    // A consumer only returns before shutdown when its channel or stream failed.
    let mut failure = tokio::select! {
        signal = shutdown_signal() => {
            if let Err(e) = signal {
                error!(error = %e, "Error waiting for shutdown signal");
            }
            None
        }
        Some(stopped) = consumers.join_next() => consumer_error(stopped)
            .or_else(|| Some(eyre!("Consumer stopped before shutdown was requested"))),
    };

    let _ = shutdown_tx.send(true);

    while let Some(stopped) = consumers.join_next().await {
        if let Some(e) = consumer_error(stopped) {
            error!(error = %e, "Consumer ended with an error");
            failure.get_or_insert(e);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Open a dedicated channel for `E`'s queue and start consuming it.
async fn spawn_consumer<E: NotificationEvent>(
    consumers: &mut JoinSet<std::result::Result<(), BrokerError>>,
    connection: &Connection,
    settings: &WorkerSettings,
    mail: &Mail,
    dead_letters: &Arc<dyn MessageSink>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let binding = E::binding();
    let channel = setup_channel(connection, &[binding])
        .await
        .wrap_err_with(|| format!("Failed to open channel for {}", binding.queue))?;

    let dispatcher = NotificationDispatcher::<E, SmtpTransport>::new(
        mail.templates.clone(),
        Arc::clone(&mail.transport),
        mail.sender.clone(),
    );

    let mut pool = ConsumerPool::new(Arc::new(dispatcher), consumer_config(&binding, settings));
    if pool.config().dead_letter.is_some() {
        pool = pool.with_dead_letter_sink(Arc::clone(dead_letters));
    }

    info!(
        queue = binding.queue,
        kind = E::KIND,
        max_concurrency = settings.max_concurrency,
        "Starting consumer"
    );

    consumers.spawn(async move { pool.consume(&channel, shutdown).await });
    Ok(())
}

fn consumer_error(outcome: ConsumerOutcome) -> Option<eyre::Report> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(eyre::Report::new(e).wrap_err("Consumer failed")),
        Err(e) => Some(eyre::Report::new(e).wrap_err("Consumer task did not complete")),
    }
}

fn start_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled() {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = config.socket_addr().wrap_err("Invalid metrics address")?;
    init_metrics(addr).wrap_err("Failed to start Prometheus exporter")?;
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
