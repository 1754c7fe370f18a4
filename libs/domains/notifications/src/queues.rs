//! Exchange and queue layout shared by both services.
//!
//! Each service declares only what it touches: the scheduler publishes to the
//! deadline queues, the sender consumes from everything.

use amqp_worker::QueueBinding;

/// Durable direct exchange carrying every notification event.
pub const EXCHANGE: &str = "notifications";

pub const UPCOMING: QueueBinding = QueueBinding::new("notification.upcoming", "upcoming", EXCHANGE);

pub const SUBSCRIPTION_EXPIRING: QueueBinding = QueueBinding::new(
    "subscription_expiring_queue",
    "subscription.expiring.tomorrow",
    EXCHANGE,
);

pub const TRIAL_EXPIRING: QueueBinding = QueueBinding::new(
    "trial_expiring_queue",
    "subscription.trial.expiring",
    EXCHANGE,
);

pub const PAYMENT_DUE: QueueBinding = QueueBinding::new("payment.due", "due", EXCHANGE);

/// Messages that exhausted their redeliveries or failed permanently.
pub const DEAD_LETTER: QueueBinding =
    QueueBinding::new("notifications.dead_letter", "dead_letter", EXCHANGE);

pub const SCHEDULER_BINDINGS: &[QueueBinding] = &[SUBSCRIPTION_EXPIRING, TRIAL_EXPIRING];

pub const SENDER_BINDINGS: &[QueueBinding] = &[
    UPCOMING,
    SUBSCRIPTION_EXPIRING,
    TRIAL_EXPIRING,
    PAYMENT_DUE,
    DEAD_LETTER,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scheduler_bindings_are_subset_of_sender() {
        for binding in SCHEDULER_BINDINGS {
            assert!(SENDER_BINDINGS.contains(binding), "{} missing on sender side", binding.queue);
        }
    }

    #[test]
    fn test_routing_keys_are_unique() {
        let keys: HashSet<_> = SENDER_BINDINGS.iter().map(|b| b.routing_key).collect();
        assert_eq!(keys.len(), SENDER_BINDINGS.len());
    }

    #[test]
    fn test_single_exchange() {
        assert_eq!(amqp_worker::exchanges(SENDER_BINDINGS), vec![EXCHANGE]);
    }
}
