//! Scheduler Service
//!
//! Scans storage for approaching deadlines and publishes one event per
//! affected entity.
//!
//! ## Architecture
//!
//! ```text
//! PostgreSQL
//!   ↓ (every 12h: subscriptions ending tomorrow)
//!   ↓ (every 24h: trials ending today)
//! ExpiringSubscriptionsJob / TrialExpiringJob
//!   ↓ (JSON, persistent, publisher confirms)
//! Exchange "notifications"
//!   ↓
//! subscription_expiring_queue / trial_expiring_queue
//! ```

use amqp_worker::{close_connection, connect, enable_confirms, init_metrics, setup_channel, Publisher};
use core_config::amqp::AmqpConfig;
use core_config::database::DatabaseConfig;
use core_config::metrics::MetricsConfig;
use core_config::scheduler::SchedulerConfig;
use core_config::{Environment, FromEnv};
use domain_notifications::queues::{EXCHANGE, SCHEDULER_BINDINGS};
use domain_subscriptions::{
    ExpiringSubscriptionsJob, PgSubscriptionStore, SubscriptionStore, TrialExpiringJob,
    run_periodic,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "subtrack-scheduler";

/// Run the scheduler
///
/// 1. Sets up structured logging (JSON for prod, pretty for dev)
/// 2. Connects to the broker with fixed-delay retry
/// 3. Declares the scheduler-side topology and enables publisher confirms
/// 4. Connects to PostgreSQL
/// 5. Runs both pollers until SIGINT/SIGTERM, then closes the connection
///
/// # Errors
///
/// Returns an error if configuration is invalid, the broker stays unreachable
/// after all retries, topology declaration fails, or PostgreSQL is unreachable.
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment, SERVICE_NAME);

    info!(
        service = SERVICE_NAME,
        version = env!("CARGO_PKG_VERSION"),
        "Starting scheduler service"
    );

    let amqp = AmqpConfig::from_env().wrap_err("Failed to load AMQP configuration")?;
    let database = DatabaseConfig::from_env().wrap_err("Failed to load database configuration")?;
    let schedule = SchedulerConfig::from_env().wrap_err("Failed to load scheduler configuration")?;
    let metrics = MetricsConfig::from_env().wrap_err("Failed to load metrics configuration")?;

    start_metrics(&metrics)?;

    let connection = connect(
        &amqp.url,
        &amqp.connection_name,
        amqp.connect_max_retries,
        amqp.connect_retry_delay,
    )
    .await
    .wrap_err("Failed to connect to AMQP broker")?;

    let result = serve(&connection, &database, &schedule).await;

    close_connection(&connection).await;
    info!("Scheduler service stopped");
    result
}

async fn serve(
    connection: &amqp_worker::Connection,
    database: &DatabaseConfig,
    schedule: &SchedulerConfig,
) -> Result<()> {
    let channel = setup_channel(connection, SCHEDULER_BINDINGS)
        .await
        .wrap_err("Failed to declare scheduler topology")?;
    enable_confirms(&channel)
        .await
        .wrap_err("Failed to enable publisher confirms")?;
    let publisher = Publisher::for_channel(channel, EXCHANGE);

    let db = domain_subscriptions::connect(database)
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    let store: Arc<dyn SubscriptionStore> = Arc::new(PgSubscriptionStore::new(db));

    let expiring = ExpiringSubscriptionsJob::new(Arc::clone(&store), publisher.clone());
    let trials = TrialExpiringJob::new(store, publisher);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pollers = JoinSet::new();

    let expiring_interval = schedule.expiring_interval;
    let rx = shutdown_rx.clone();
    pollers.spawn(async move { run_periodic(&expiring, expiring_interval, rx).await });

    let trial_interval = schedule.trial_interval;
    pollers.spawn(async move { run_periodic(&trials, trial_interval, shutdown_rx).await });

    if let Err(e) = shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    let _ = shutdown_tx.send(true);

    while let Some(joined) = pollers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Poller task did not complete");
        }
    }

    Ok(())
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
