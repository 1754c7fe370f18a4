use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};
use std::time::Duration;

/// Consumer-side tuning for the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    pub max_concurrency: usize,
    pub drain_timeout: Duration,
    /// `None` keeps failed messages cycling through the queue forever.
    pub max_redeliveries: Option<u32>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            drain_timeout: Duration::from_secs(30),
            max_redeliveries: Some(5),
        }
    }
}

impl FromEnv for WorkerSettings {
    /// Reads:
    /// - WORKER_MAX_CONCURRENCY: defaults to 10
    /// - WORKER_DRAIN_TIMEOUT_SECS: defaults to 30
    /// - WORKER_MAX_REDELIVERIES: defaults to 5, `unbounded` disables the ceiling
    fn from_env() -> Result<Self, ConfigError> {
        let max_concurrency: usize = env_parse_or("WORKER_MAX_CONCURRENCY", 10)?;
        if max_concurrency == 0 {
            return Err(ConfigError::ParseError {
                key: "WORKER_MAX_CONCURRENCY".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        let raw_redeliveries = env_or_default("WORKER_MAX_REDELIVERIES", "5");
        let max_redeliveries = if raw_redeliveries.trim().eq_ignore_ascii_case("unbounded") {
            None
        } else {
            Some(
                raw_redeliveries
                    .trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::ParseError {
                        key: "WORKER_MAX_REDELIVERIES".to_string(),
                        details: e.to_string(),
                    })?,
            )
        };

        Ok(Self {
            max_concurrency,
            drain_timeout: Duration::from_secs(env_parse_or("WORKER_DRAIN_TIMEOUT_SECS", 30)?),
            max_redeliveries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_settings_defaults() {
        temp_env::with_vars(
            [
                ("WORKER_MAX_CONCURRENCY", None::<&str>),
                ("WORKER_DRAIN_TIMEOUT_SECS", None),
                ("WORKER_MAX_REDELIVERIES", None),
            ],
            || {
                let settings = WorkerSettings::from_env().unwrap();
                assert_eq!(settings, WorkerSettings::default());
            },
        );
    }

    #[test]
    fn test_worker_settings_unbounded_redeliveries() {
        temp_env::with_var("WORKER_MAX_REDELIVERIES", Some("Unbounded"), || {
            let settings = WorkerSettings::from_env().unwrap();
            assert_eq!(settings.max_redeliveries, None);
        });
    }

    #[test]
    fn test_worker_settings_rejects_zero_concurrency() {
        temp_env::with_var("WORKER_MAX_CONCURRENCY", Some("0"), || {
            let err = WorkerSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("WORKER_MAX_CONCURRENCY"));
        });
    }

    #[test]
    fn test_worker_settings_explicit_values() {
        temp_env::with_vars(
            [
                ("WORKER_MAX_CONCURRENCY", Some("4")),
                ("WORKER_DRAIN_TIMEOUT_SECS", Some("5")),
                ("WORKER_MAX_REDELIVERIES", Some("0")),
            ],
            || {
                let settings = WorkerSettings::from_env().unwrap();
                assert_eq!(settings.max_concurrency, 4);
                assert_eq!(settings.drain_timeout, Duration::from_secs(5));
                assert_eq!(settings.max_redeliveries, Some(0));
            },
        );
    }
}
