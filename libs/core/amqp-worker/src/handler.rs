//! Delivery handler contract.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// How a handler failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retrying may succeed (network, downstream outage).
    Transient,
    /// Retrying the same body will fail again (malformed payload, bad address).
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error returned by a [`DeliveryHandler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            HandlerError::Permanent(_) => FailureKind::Permanent,
            // a panic may come from a transient condition; let it cycle
            HandlerError::Transient(_) | HandlerError::Panicked(_) => FailureKind::Transient,
        }
    }
}

/// Side-effecting work performed for one delivery body.
///
/// Returning `Ok` acknowledges the message; returning `Err` hands it back to
/// the broker (or to the dead-letter queue once the redelivery ceiling is hit).
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError>;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;
}
