use crate::{env_parse_or, env_required, ConfigError, FromEnv};
use std::time::Duration;

/// Database configuration
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: 10,
            connect_timeout: Duration::from_secs(8),
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL to be set (no default)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            connect_timeout: Duration::from_secs(env_parse_or(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                8,
            )?),
        })
    }
}
