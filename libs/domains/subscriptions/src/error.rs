pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Storage query failed: {0}")]
    Query(String),

    #[error("Database connection failed: {0}")]
    Connection(String),
}

impl From<sea_orm::DbErr> for SubscriptionError {
    fn from(err: sea_orm::DbErr) -> Self {
        SubscriptionError::Query(err.to_string())
    }
}
