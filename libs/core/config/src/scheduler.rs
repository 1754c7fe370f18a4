use crate::{env_parse_or, ConfigError, FromEnv};
use std::time::Duration;

const TWELVE_HOURS: u64 = 12 * 60 * 60;
const ONE_DAY: u64 = 24 * 60 * 60;

/// Poll intervals for the deadline scans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub expiring_interval: Duration,
    pub trial_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiring_interval: Duration::from_secs(TWELVE_HOURS),
            trial_interval: Duration::from_secs(ONE_DAY),
        }
    }
}

impl FromEnv for SchedulerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let expiring: u64 = env_parse_or("SCHEDULER_EXPIRING_INTERVAL_SECS", TWELVE_HOURS)?;
        let trial: u64 = env_parse_or("SCHEDULER_TRIAL_INTERVAL_SECS", ONE_DAY)?;

        for (key, value) in [
            ("SCHEDULER_EXPIRING_INTERVAL_SECS", expiring),
            ("SCHEDULER_TRIAL_INTERVAL_SECS", trial),
        ] {
            if value == 0 {
                return Err(ConfigError::ParseError {
                    key: key.to_string(),
                    details: "interval must be positive".to_string(),
                });
            }
        }

        Ok(Self {
            expiring_interval: Duration::from_secs(expiring),
            trial_interval: Duration::from_secs(trial),
        })
    }
}
