//! SMTP transport using lettre.
//!
//! lettre speaks the whole SMTP dialogue inside a single `send_raw` call over a
//! pooled connection, so the session buffers the envelope from `mail`/`rcpt`
//! and hands everything over at `data`. Connection problems therefore surface
//! as `data` stage failures.

use super::{parse_address, MailSession, MailTransport};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{env_flag, env_or_default, env_parse_or, ConfigError, FromEnv};
use lettre::address::Envelope;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::env;
use std::sync::Arc;
use tracing::{debug, info};

/// SMTP configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Sender email address.
    pub from_email: String,
    /// Sender name.
    pub from_name: String,
    /// SMTP username (optional for dev servers like Mailpit).
    pub username: Option<String>,
    /// SMTP password (optional for dev servers like Mailpit).
    pub password: Option<String>,
    /// Whether to use TLS (false for local dev servers).
    pub use_tls: bool,
}

impl SmtpConfig {
    pub fn new(host: String, port: u16, from_email: String, from_name: String) -> Self {
        Self {
            host,
            port,
            from_email,
            from_name,
            username: None,
            password: None,
            use_tls: false,
        }
    }

    /// Builder method to set TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// The `From:` mailbox for outgoing mail.
    pub fn sender(&self) -> NotificationResult<Mailbox> {
        let address = parse_address(&self.from_email)?;
        let name = Some(self.from_name.clone()).filter(|name| !name.is_empty());
        Ok(Mailbox::new(name, address))
    }
}

impl FromEnv for SmtpConfig {
    /// Defaults target a local Mailpit/MailHog on port 1025.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", "localhost"),
            port: env_parse_or("SMTP_PORT", 1025)?,
            from_email: env_or_default("SMTP_FROM_EMAIL", "noreply@localhost"),
            from_name: env_or_default("SMTP_FROM_NAME", "Subtrack"),
            username: env::var("SMTP_USERNAME").ok(),
            password: env::var("SMTP_PASSWORD").ok(),
            use_tls: env_flag("SMTP_USE_TLS", false),
        })
    }
}

/// [`MailTransport`] over a pooled lettre SMTP client.
#[derive(Clone)]
pub struct SmtpTransport {
    inner: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    host: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> NotificationResult<Self> {
        Ok(Self {
            inner: Arc::new(Self::build_transport(config)?),
            host: config.host.clone(),
        })
    }

    /// Build the SMTP transport based on configuration.
    fn build_transport(
        config: &SmtpConfig,
    ) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| {
                    NotificationError::ConfigError(format!("Failed to create SMTP relay: {}", e))
                })?
                .port(config.port)
        } else {
            // plain connection for local dev servers like Mailpit
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn connect(&self) -> NotificationResult<Box<dyn MailSession>> {
        debug!(host = %self.host, "Opening SMTP session");
        Ok(Box::new(SmtpSession {
            inner: Arc::clone(&self.inner),
            from: None,
            to: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }
}

struct SmtpSession {
    inner: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Option<Address>,
    to: Vec<Address>,
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn mail(&mut self, from: &Address) -> NotificationResult<()> {
        self.from = Some(from.clone());
        Ok(())
    }

    async fn rcpt(&mut self, to: &Address) -> NotificationResult<()> {
        self.to.push(to.clone());
        Ok(())
    }

    async fn data(&mut self, content: &[u8]) -> NotificationResult<()> {
        let envelope = Envelope::new(self.from.clone(), self.to.clone())
            .map_err(|e| NotificationError::transport("data", e))?;

        let response = self
            .inner
            .send_raw(&envelope, content)
            .await
            .map_err(|e| NotificationError::transport("data", e))?;

        info!(
            recipients = self.to.len(),
            code = %response.code(),
            "Email accepted by SMTP server"
        );
        Ok(())
    }

    async fn quit(&mut self) -> NotificationResult<()> {
        self.from = None;
        self.to.clear();
        Ok(())
    }

    async fn close(&mut self) {
        self.from = None;
        self.to.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_config_defaults() {
        temp_env::with_vars_unset(
            [
                "SMTP_HOST",
                "SMTP_PORT",
                "SMTP_FROM_EMAIL",
                "SMTP_FROM_NAME",
                "SMTP_USERNAME",
                "SMTP_PASSWORD",
                "SMTP_USE_TLS",
            ],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert_eq!(config.host, "localhost");
                assert_eq!(config.port, 1025);
                assert!(!config.use_tls);
                assert!(config.username.is_none());
            },
        );
    }

    #[test]
    fn test_smtp_config_from_env() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("smtp.example.com")),
                ("SMTP_PORT", Some("587")),
                ("SMTP_USE_TLS", Some("true")),
                ("SMTP_USERNAME", Some("user")),
                ("SMTP_PASSWORD", Some("pass")),
            ],
            || {
                let config = SmtpConfig::from_env().unwrap();
                assert_eq!(config.host, "smtp.example.com");
                assert_eq!(config.port, 587);
                assert!(config.use_tls);
                assert_eq!(config.username.as_deref(), Some("user"));
            },
        );
    }

    #[test]
    fn test_smtp_config_rejects_bad_port() {
        temp_env::with_var("SMTP_PORT", Some("smtp"), || {
            let err = SmtpConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("SMTP_PORT"));
        });
    }

    #[test]
    fn test_sender_mailbox() {
        let config = SmtpConfig::new(
            "localhost".to_string(),
            1025,
            "noreply@example.com".to_string(),
            "Subtrack".to_string(),
        );
        let sender = config.sender().unwrap();
        assert_eq!(sender.to_string(), "Subtrack <noreply@example.com>");
    }

    #[test]
    fn test_sender_rejects_bad_address() {
        let config = SmtpConfig::new(
            "localhost".to_string(),
            1025,
            "noreply".to_string(),
            "Subtrack".to_string(),
        )
        .with_credentials("user".to_string(), "pass".to_string());
        assert!(config.sender().is_err());
    }

    #[tokio::test]
    async fn test_data_without_recipients_is_a_transport_error() {
        let config = SmtpConfig::new(
            "localhost".to_string(),
            1025,
            "noreply@example.com".to_string(),
            String::new(),
        );
        let transport = SmtpTransport::new(&config).unwrap();
        let mut session = transport.connect().await.unwrap();

        let err = session.data(b"Subject: x\r\n\r\nbody").await.unwrap_err();
        assert!(matches!(err, NotificationError::Transport { stage: "data", .. }));
    }
}
