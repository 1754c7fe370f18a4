//! Periodic deadline scans.
//!
//! A [`PollJob`] performs one pass; [`run_periodic`] runs it immediately and
//! then once per interval until shutdown. A failed pass is logged and the next
//! tick proceeds as usual.

use async_trait::async_trait;
use metrics::counter;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::SubscriptionResult;

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Entities returned by the storage query
    pub found: usize,
    pub published: usize,
    pub failed: usize,
}

#[async_trait]
pub trait PollJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Query storage and publish one event per entity.
    ///
    /// Per-entity publish failures are counted in the report, not returned.
    async fn run_pass(&self) -> SubscriptionResult<PassReport>;
}

/// Run `job` now and then every `period` until `shutdown` flips to true
/// (or its sender is dropped). A pass already in progress is allowed to finish.
pub async fn run_periodic<J>(job: &J, period: Duration, mut shutdown: watch::Receiver<bool>)
where
    J: PollJob + ?Sized,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        job = job.name(),
        interval_seconds = period.as_secs(),
        "Starting poller"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            _ = ticker.tick() => run_once(job).await,
        }
    }

    info!(job = job.name(), "Poller stopped");
}

async fn run_once<J: PollJob + ?Sized>(job: &J) {
    let name = job.name();
    debug!(job = name, "Running poll pass");

    match job.run_pass().await {
        Ok(report) if report.found == 0 => {
            counter!("scheduler_passes_total", "job" => name, "outcome" => "empty").increment(1);
            info!(job = name, "No entities due, nothing to publish");
        }
        Ok(report) => {
            let outcome = if report.failed == 0 { "ok" } else { "partial" };
            counter!("scheduler_passes_total", "job" => name, "outcome" => outcome).increment(1);
            info!(
                job = name,
                found = report.found,
                published = report.published,
                failed = report.failed,
                "Poll pass complete"
            );
        }
        Err(e) => {
            counter!("scheduler_passes_total", "job" => name, "outcome" => "error").increment(1);
            error!(job = name, error = %e, "Poll pass failed");
        }
    }
}
