//! Subscriptions Domain
//!
//! Storage queries for approaching deadlines and the scheduler side of the
//! notification pipeline: periodic scans that publish one event per entity.
//!
//! ```text
//! run_periodic ──tick──▶ PollJob::run_pass ──▶ SubscriptionStore ──▶ Publisher
//! ```

pub mod error;
pub mod jobs;
pub mod poller;
pub mod postgres;
pub mod store;

pub use error::{SubscriptionError, SubscriptionResult};
pub use jobs::{Clock, ExpiringSubscriptionsJob, TrialExpiringJob};
pub use poller::{PassReport, PollJob, run_periodic};
pub use postgres::{PgSubscriptionStore, connect};
pub use store::SubscriptionStore;
