//! Shared test utilities for the notification pipeline
//!
//! - `TestRabbitMq`: RabbitMQ container with automatic cleanup (feature: "rabbitmq")
//! - `TestDatabase`: PostgreSQL container with an inline schema (feature: "postgres")
//! - `TestDataBuilder`: deterministic test data (always available)
//!
//! Container-backed tests need a Docker daemon; callers mark them `#[ignore]`
//! so `cargo test` stays hermetic and `cargo test -- --ignored` runs them.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["postgres"] }
//! ```
//!
//! ```rust,ignore
//! use test_utils::{TestRabbitMq, TestDataBuilder};
//!
//! #[tokio::test]
//! #[ignore = "requires a Docker daemon"]
//! async fn my_broker_test() {
//!     let rabbit = TestRabbitMq::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_broker_test");
//!     let email = builder.email("alice");
//! }
//! ```

use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "rabbitmq")]
mod rabbitmq;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "rabbitmq")]
pub use rabbitmq::TestRabbitMq;

/// Builder for test data with deterministic randomization
///
/// Same seed, same data, so failures reproduce.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_trial_expiring");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic user id; `n` distinguishes users within one test
    pub fn user_id(&self, n: u8) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        uuid_bytes[15] ^= n;
        Uuid::from_bytes(uuid_bytes)
    }

    /// Username unique to this test, e.g. `alice_1234`
    pub fn username(&self, who: &str) -> String {
        format!("{}_{}", who, self.seed % 10_000)
    }

    /// Email address under the reserved example.com domain
    pub fn email(&self, who: &str) -> String {
        format!("{}@example.com", self.username(who))
    }

    /// Unique queue or resource name, e.g. `test-queue-1234-main`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }
}
