use async_trait::async_trait;
use chrono::NaiveDate;
use domain_notifications::{SubscriptionExpiring, TrialExpiring};

use crate::error::SubscriptionResult;

/// Read side of subscription storage used by the deadline scans.
///
/// Rows come back already shaped as the event they produce.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Subscriptions whose current period ends on `date` (UTC)
    async fn subscriptions_ending_on(
        &self,
        date: NaiveDate,
    ) -> SubscriptionResult<Vec<SubscriptionExpiring>>;

    /// Users whose trial ends on `date` (UTC)
    async fn trials_ending_on(&self, date: NaiveDate) -> SubscriptionResult<Vec<TrialExpiring>>;
}
