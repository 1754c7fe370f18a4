use crate::{env_or_default, ConfigError, FromEnv};
use std::net::{Ipv4Addr, SocketAddr};

/// Prometheus exporter listener
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub host: String,
    pub port: u16,
}

impl MetricsConfig {
    /// Port 0 turns the exporter off.
    pub fn enabled(&self) -> bool {
        self.port != 0
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
                key: "METRICS_HOST".to_string(),
                details: e.to_string(),
            })
    }
}

impl FromEnv for MetricsConfig {
    /// Reads from environment variables with sensible defaults:
    /// - METRICS_HOST: defaults to 0.0.0.0
    /// - METRICS_PORT: defaults to 9090
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("METRICS_HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_or_default("METRICS_PORT", "9090").parse().map_err(|e| {
            ConfigError::ParseError {
                key: "METRICS_PORT".to_string(),
                details: format!("{}", e),
            }
        })?;

        Ok(Self { host, port })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_from_env_with_defaults() {
        temp_env::with_vars(
            [("METRICS_HOST", None::<&str>), ("METRICS_PORT", None::<&str>)],
            || {
                let config = MetricsConfig::from_env().unwrap();
                assert!(config.enabled());
                assert_eq!(
                    config.socket_addr().unwrap(),
                    "0.0.0.0:9090".parse::<SocketAddr>().unwrap()
                );
            },
        );
    }

    #[test]
    fn test_metrics_config_disabled_with_port_zero() {
        temp_env::with_var("METRICS_PORT", Some("0"), || {
            let config = MetricsConfig::from_env().unwrap();
            assert!(!config.enabled());
        });
    }

    #[test]
    fn test_metrics_config_invalid_port() {
        temp_env::with_var("METRICS_PORT", Some("not-a-port"), || {
            let err = MetricsConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("METRICS_PORT"));
        });
    }
}
