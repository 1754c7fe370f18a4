//! Redelivery ceiling for poison messages.
//!
//! Event bodies carry no identifier and the broker assigns a new delivery tag
//! on every redelivery, so failures are counted per SHA-256 of the body.
//! Identical copies in the queue (the scheduler can publish the same event
//! twice in one day) share one count. A count is dropped as soon as a copy
//! succeeds or is dead-lettered, so a later copy starts from zero.
//!
//! Counts are local to the process. With several consumers on one queue a
//! message can see up to `max_redeliveries` failures in each of them.

use crate::handler::FailureKind;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Upper bound on tracked fingerprints before the table is reset.
const MAX_TRACKED: usize = 10_000;

type Fingerprint = [u8; 32];

/// What to do with a delivery whose handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nack with requeue.
    Requeue { failures: u32 },
    /// Publish to the dead-letter route, then ack the original.
    DeadLetter { failures: u32 },
}

#[derive(Debug)]
pub struct RedeliveryTracker {
    max_redeliveries: u32,
    failures: Mutex<HashMap<Fingerprint, u32>>,
}

impl RedeliveryTracker {
    pub fn new(max_redeliveries: u32) -> Self {
        Self {
            max_redeliveries,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn fingerprint(body: &[u8]) -> Fingerprint {
        Sha256::digest(body).into()
    }

    /// Record a failed attempt and decide where the message goes next.
    ///
    /// Permanent failures are dead-lettered straight away.
    pub fn record_failure(&self, body: &[u8], kind: FailureKind) -> Disposition {
        let key = Self::fingerprint(body);
        let mut failures = self.failures.lock().unwrap_or_else(|p| p.into_inner());

        if !failures.contains_key(&key) && failures.len() >= MAX_TRACKED {
            warn!(tracked = failures.len(), "Redelivery table full, resetting counts");
            failures.clear();
        }

        let count = failures.entry(key).or_insert(0);
        *count += 1;
        let seen = *count;

        if kind == FailureKind::Permanent || seen > self.max_redeliveries {
            failures.remove(&key);
            Disposition::DeadLetter { failures: seen }
        } else {
            Disposition::Requeue { failures: seen }
        }
    }

    /// Drop any count kept for `body` once it has been handled.
    pub fn forget(&self, body: &[u8]) {
        let key = Self::fingerprint(body);
        self.failures
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&key);
    }

    pub fn tracked(&self) -> usize {
        self.failures.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
