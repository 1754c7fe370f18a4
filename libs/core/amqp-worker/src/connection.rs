//! Broker connection with fixed-delay retry.

use crate::error::BrokerError;
use lapin::{Connection, ConnectionProperties};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run `operation` up to `max_attempts` times, sleeping `delay` between failures.
///
/// Returns the attempt count and the last error when every attempt fails.
/// At least one attempt is always made.
pub async fn retry_fixed<F, Fut, T, E>(
    mut operation: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, (u32, E)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => return Err((attempt, e)),
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Open a connection to the broker, retrying with a fixed delay.
///
/// The caller owns the returned connection and must close it exactly once,
/// normally through [`close_connection`] during shutdown.
pub async fn connect(
    url: &str,
    connection_name: &str,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<Connection, BrokerError> {
    info!(connection_name, max_retries, "Connecting to AMQP broker");

    let connection = retry_fixed(
        |_| {
            Connection::connect(
                url,
                ConnectionProperties::default().with_connection_name(connection_name.into()),
            )
        },
        max_retries,
        retry_delay,
    )
    .await
    .map_err(|(attempts, e)| BrokerError::Connect {
        attempts,
        last_error: e.to_string(),
    })?;

    info!(connection_name, "Connected to AMQP broker");
    Ok(connection)
}

/// Close the connection with a normal reply code. Errors are logged, not returned,
/// because there is nothing left to do with a connection that refused to close.
pub async fn close_connection(connection: &Connection) {
    match connection.close(200, "shutdown").await {
        Ok(()) => info!("AMQP connection closed"),
        Err(e) => warn!(error = %e, "AMQP connection did not close cleanly"),
    }
}
