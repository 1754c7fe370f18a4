//! PgSubscriptionStore against a real PostgreSQL.
//!
//! Run with `cargo test -p domain_subscriptions -- --ignored` (needs Docker).

use chrono::NaiveDate;
use domain_subscriptions::{PgSubscriptionStore, SubscriptionStore};
use test_utils::{TestDataBuilder, TestDatabase};

const SCHEMA: &str = r#"
CREATE TABLE users (
    uuid uuid PRIMARY KEY,
    email text NOT NULL,
    username text NOT NULL,
    trial_end_date timestamptz
);

CREATE TABLE subscriptions (
    uuid uuid PRIMARY KEY,
    user_uuid uuid NOT NULL REFERENCES users (uuid),
    service_name text NOT NULL,
    price numeric(10, 2) NOT NULL,
    end_date timestamptz NOT NULL
);
"#;

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn test_deadline_queries_match_utc_dates() {
    use sea_orm::{ConnectionTrait, DbBackend, Statement};

    let db = TestDatabase::with_schema(SCHEMA).await;
    let data = TestDataBuilder::from_test_name("test_deadline_queries_match_utc_dates");

    let alice = data.user_id(1);
    let bob = data.user_id(2);
    let insert_users = Statement::from_sql_and_values(
        DbBackend::Postgres,
        "INSERT INTO users (uuid, email, username, trial_end_date) VALUES
            ($1, $2, $3, '2026-03-01T23:30:00Z'),
            ($4, $5, $6, '2026-03-02T00:30:00Z')",
        [
            alice.into(),
            data.email("alice").into(),
            data.username("alice").into(),
            bob.into(),
            data.email("bob").into(),
            data.username("bob").into(),
        ],
    );
    db.connection.execute_raw(insert_users).await.unwrap();

    let insert_subscriptions = Statement::from_sql_and_values(
        DbBackend::Postgres,
        "INSERT INTO subscriptions (uuid, user_uuid, service_name, price, end_date) VALUES
            ($1, $2, 'Netflix', 15.49, '2026-03-01T08:00:00Z'),
            ($3, $4, 'Spotify', 11.99, '2026-03-05T08:00:00Z')",
        [
            data.user_id(10).into(),
            alice.into(),
            data.user_id(11).into(),
            bob.into(),
        ],
    );
    db.connection.execute_raw(insert_subscriptions).await.unwrap();

    let store = PgSubscriptionStore::new(db.connection());
    let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

    let expiring = store.subscriptions_ending_on(day).await.unwrap();
    assert_eq!(expiring.len(), 1);
    assert_eq!(expiring[0].service_name, "Netflix");
    assert_eq!(expiring[0].email, data.email("alice"));
    assert!((expiring[0].price - 15.49).abs() < f64::EPSILON);

    let trials = store.trials_ending_on(day).await.unwrap();
    assert_eq!(trials.len(), 1);
    assert_eq!(trials[0].uuid, alice);
}
