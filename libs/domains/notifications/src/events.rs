//! Event envelopes carried on the notification exchange.
//!
//! Bodies are plain JSON with no id or version field, so a redelivered message
//! is byte-identical to the original.

use crate::error::NotificationResult;
use crate::queues;
use crate::templates::{RenderedEmail, TemplateEngine};
use amqp_worker::QueueBinding;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A subscription whose current period ends tomorrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionExpiring {
    pub email: String,
    pub username: String,
    pub service_name: String,
    pub end_date: DateTime<Utc>,
    pub price: f64,
}

/// A user whose trial ends today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialExpiring {
    pub uuid: Uuid,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub trial_end_date: Option<DateTime<Utc>>,
}

/// An event that ends in one email to one recipient.
pub trait NotificationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Short name used for logs, metric labels and handler naming.
    const KIND: &'static str;

    /// Queue (and routing key) the event travels through.
    fn binding() -> QueueBinding;

    fn recipient_email(&self) -> &str;

    fn recipient_name(&self) -> &str;

    fn render(&self, templates: &TemplateEngine) -> NotificationResult<RenderedEmail>;
}

impl NotificationEvent for SubscriptionExpiring {
    const KIND: &'static str = "subscription_expiring";

    fn binding() -> QueueBinding {
        queues::SUBSCRIPTION_EXPIRING
    }

    fn recipient_email(&self) -> &str {
        &self.email
    }

    fn recipient_name(&self) -> &str {
        &self.username
    }

    fn render(&self, templates: &TemplateEngine) -> NotificationResult<RenderedEmail> {
        templates.render_subscription_expiring(self)
    }
}

impl NotificationEvent for TrialExpiring {
    const KIND: &'static str = "trial_expiring";

    fn binding() -> QueueBinding {
        queues::TRIAL_EXPIRING
    }

    fn recipient_email(&self) -> &str {
        &self.email
    }

    fn recipient_name(&self) -> &str {
        &self.username
    }

    fn render(&self, templates: &TemplateEngine) -> NotificationResult<RenderedEmail> {
        templates.render_trial_expiring(self)
    }
}
