use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use core_config::database::DatabaseConfig;
use domain_notifications::{SubscriptionExpiring, TrialExpiring};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DbBackend, FromQueryResult, Statement,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::store::SubscriptionStore;

const SUBSCRIPTIONS_ENDING_ON: &str = r#"
    SELECT u.email, u.username, s.service_name, s.end_date, s.price::float8 AS price
    FROM subscriptions s
    JOIN users u ON u.uuid = s.user_uuid
    WHERE (s.end_date AT TIME ZONE 'UTC')::date = $1
    ORDER BY s.end_date
"#;

const TRIALS_ENDING_ON: &str = r#"
    SELECT uuid, email, username, trial_end_date
    FROM users
    WHERE (trial_end_date AT TIME ZONE 'UTC')::date = $1
    ORDER BY trial_end_date
"#;

/// Open a pooled connection sized from `DatabaseConfig`.
pub async fn connect(config: &DatabaseConfig) -> SubscriptionResult<DatabaseConnection> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.connect_timeout)
        .sqlx_logging(false);

    let db = Database::connect(opt)
        .await
        .map_err(|e| SubscriptionError::Connection(e.to_string()))?;

    info!(
        max_connections = config.max_connections,
        "Successfully connected to PostgreSQL database"
    );
    Ok(db)
}

/// PostgreSQL implementation of SubscriptionStore using SeaORM raw statements
#[derive(Clone)]
pub struct PgSubscriptionStore {
    db: DatabaseConnection,
}

impl PgSubscriptionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct ExpiringRow {
    email: String,
    username: String,
    service_name: String,
    end_date: DateTime<Utc>,
    price: f64,
}

impl From<ExpiringRow> for SubscriptionExpiring {
    fn from(row: ExpiringRow) -> Self {
        Self {
            email: row.email,
            username: row.username,
            service_name: row.service_name,
            end_date: row.end_date,
            price: row.price,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct TrialRow {
    uuid: Uuid,
    email: String,
    username: String,
    trial_end_date: Option<DateTime<Utc>>,
}

impl From<TrialRow> for TrialExpiring {
    fn from(row: TrialRow) -> Self {
        Self {
            uuid: row.uuid,
            email: row.email,
            username: row.username,
            trial_end_date: row.trial_end_date,
        }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn subscriptions_ending_on(
        &self,
        date: NaiveDate,
    ) -> SubscriptionResult<Vec<SubscriptionExpiring>> {
        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, SUBSCRIPTIONS_ENDING_ON, [date.into()]);

        let rows = ExpiringRow::find_by_statement(stmt).all(&self.db).await?;
        debug!(%date, count = rows.len(), "Loaded expiring subscriptions");

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn trials_ending_on(&self, date: NaiveDate) -> SubscriptionResult<Vec<TrialExpiring>> {
        let stmt =
            Statement::from_sql_and_values(DbBackend::Postgres, TRIALS_ENDING_ON, [date.into()]);

        let rows = TrialRow::find_by_statement(stmt).all(&self.db).await?;
        debug!(%date, count = rows.len(), "Loaded expiring trials");

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, Transaction, Value};
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_subscriptions_ending_on_maps_rows() {
        let end_date = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let row: BTreeMap<&str, Value> = BTreeMap::from([
            ("email", "alice@example.com".into()),
            ("username", "alice".into()),
            ("service_name", "Netflix".into()),
            ("end_date", end_date.into()),
            ("price", 15.49f64.into()),
        ]);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row]])
            .into_connection();
        let store = PgSubscriptionStore::new(db);

        let found = store.subscriptions_ending_on(date()).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].service_name, "Netflix");
        assert_eq!(found[0].end_date, end_date);
        assert_eq!(found[0].price, 15.49);
    }

    #[tokio::test]
    async fn test_trials_query_binds_date() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<BTreeMap<&str, Value>>::new()])
            .into_connection();
        let store = PgSubscriptionStore::new(db.clone());

        let found = store.trials_ending_on(date()).await.unwrap();
        assert!(found.is_empty());

        assert_eq!(
            db.into_transaction_log(),
            vec![Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                TRIALS_ENDING_ON,
                [date().into()],
            )]
        );
    }

    #[tokio::test]
    async fn test_query_error_is_reported() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([sea_orm::DbErr::Custom("connection reset".to_string())])
            .into_connection();
        let store = PgSubscriptionStore::new(db);

        let err = store.trials_ending_on(date()).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::Query(_)));
    }
}
