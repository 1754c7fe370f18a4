//! The two deadline scans the scheduler runs.

use amqp_worker::Publisher;
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use domain_notifications::{NotificationEvent, SubscriptionExpiring, TrialExpiring};
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::poller::{PassReport, PollJob};
use crate::store::SubscriptionStore;

/// Source of "today" in UTC; swapped out in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Publish every event under its routing key; one failure never stops the batch.
async fn publish_all<E: NotificationEvent>(
    publisher: &Publisher,
    events: &[E],
) -> PassReport {
    let routing_key = E::binding().routing_key;
    let mut report = PassReport {
        found: events.len(),
        ..PassReport::default()
    };

    for event in events {
        match publisher.publish(routing_key, event).await {
            Ok(()) => {
                report.published += 1;
                debug!(kind = E::KIND, to = %event.recipient_email(), "Event queued");
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    kind = E::KIND,
                    to = %event.recipient_email(),
                    error = %e,
                    "Failed to publish event, continuing with the rest"
                );
            }
        }
    }

    report
}

/// Subscriptions whose period ends tomorrow → `subscription.expiring.tomorrow`.
pub struct ExpiringSubscriptionsJob {
    store: Arc<dyn SubscriptionStore>,
    publisher: Publisher,
    today: Clock,
}

impl ExpiringSubscriptionsJob {
    pub fn new(store: Arc<dyn SubscriptionStore>, publisher: Publisher) -> Self {
        Self {
            store,
            publisher,
            today: Arc::new(utc_today),
        }
    }

    pub fn with_clock(mut self, today: Clock) -> Self {
        self.today = today;
        self
    }
}

#[async_trait]
impl PollJob for ExpiringSubscriptionsJob {
    fn name(&self) -> &'static str {
        "expiring_subscriptions"
    }

    async fn run_pass(&self) -> SubscriptionResult<PassReport> {
        let tomorrow = (self.today)()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| SubscriptionError::Query("date out of range".to_string()))?;

        let events: Vec<SubscriptionExpiring> = self.store.subscriptions_ending_on(tomorrow).await?;
        Ok(publish_all(&self.publisher, &events).await)
    }
}

/// Trials ending today → `subscription.trial.expiring`.
pub struct TrialExpiringJob {
    store: Arc<dyn SubscriptionStore>,
    publisher: Publisher,
    today: Clock,
}

impl TrialExpiringJob {
    pub fn new(store: Arc<dyn SubscriptionStore>, publisher: Publisher) -> Self {
        Self {
            store,
            publisher,
            today: Arc::new(utc_today),
        }
    }

    pub fn with_clock(mut self, today: Clock) -> Self {
        self.today = today;
        self
    }
}

#[async_trait]
impl PollJob for TrialExpiringJob {
    fn name(&self) -> &'static str {
        "trial_expiring"
    }

    async fn run_pass(&self) -> SubscriptionResult<PassReport> {
        let events: Vec<TrialExpiring> = self.store.trials_ending_on((self.today)()).await?;
        Ok(publish_all(&self.publisher, &events).await)
    }
}
