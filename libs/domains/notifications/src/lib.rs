//! Notifications Domain
//!
//! Event envelopes, queue layout and the email side of the pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  ConsumerPool   │  ← amqp-worker, one per queue
//! └────────┬────────┘
//!          │ body
//! ┌────────▼────────────────┐
//! │ NotificationDispatcher  │  ← decode → render → compose
//! └────────┬────────────────┘
//!          │
//! ┌────────▼────────┐
//! │  MailTransport  │  ← mail → rcpt → data → quit (SMTP via lettre)
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     NotificationDispatcher, SmtpConfig, SmtpTransport, SubscriptionExpiring, TemplateEngine,
//! };
//!
//! let smtp = SmtpConfig::from_env()?;
//! let transport = Arc::new(SmtpTransport::new(&smtp)?);
//! let dispatcher: NotificationDispatcher<SubscriptionExpiring, _> =
//!     NotificationDispatcher::new(TemplateEngine::new()?, transport, smtp.sender()?);
//! ```

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod queues;
pub mod templates;
pub mod transport;

// Re-export commonly used types
pub use dispatcher::NotificationDispatcher;
pub use error::{NotificationError, NotificationResult};
pub use events::{NotificationEvent, SubscriptionExpiring, TrialExpiring};
pub use templates::{RenderedEmail, TemplateEngine};
pub use transport::{MailSession, MailTransport, OutgoingMail, SmtpConfig, SmtpTransport};

pub use lettre::message::Mailbox;
