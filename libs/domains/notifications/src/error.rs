//! Error types for the notifications domain.

use amqp_worker::HandlerError;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while turning an event into a delivered email.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Message body is not a valid event envelope.
    #[error("Malformed event body: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Invalid email address (sender or recipient).
    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// MIME message could not be assembled.
    #[error("Failed to build email message: {0}")]
    Compose(String),

    /// Mail transport failed at one stage of the exchange.
    #[error("Mail transport failed during {stage}: {message}")]
    Transport { stage: &'static str, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl NotificationError {
    pub fn transport(stage: &'static str, message: impl ToString) -> Self {
        NotificationError::Transport {
            stage,
            message: message.to_string(),
        }
    }

    pub fn invalid_address(address: impl Into<String>, reason: impl ToString) -> Self {
        NotificationError::InvalidAddress {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying the same message could succeed.
    ///
    /// Only transport failures are worth a redelivery; everything else fails
    /// identically for an identical body.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotificationError::Transport { .. })
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<core_config::ConfigError> for NotificationError {
    fn from(err: core_config::ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}

impl From<NotificationError> for HandlerError {
    fn from(err: NotificationError) -> Self {
        if err.is_transient() {
            HandlerError::transient(err.to_string())
        } else {
            HandlerError::permanent(err.to_string())
        }
    }
}
