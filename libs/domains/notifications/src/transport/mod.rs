//! Outbound mail transport.
//!
//! A [`MailTransport`] opens a [`MailSession`], and the dispatcher drives the
//! session through the SMTP stages in order: `mail → rcpt → data → quit`.
//! Any stage may fail; the caller closes the session in that case.

mod smtp;

pub use smtp::{SmtpConfig, SmtpTransport};

use crate::error::{NotificationError, NotificationResult};
use crate::templates::RenderedEmail;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};

/// A fully composed message plus its envelope addresses.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: Address,
    pub to: Address,
    /// RFC 5322 bytes, headers included.
    pub content: Vec<u8>,
}

/// Opens mail sessions.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn connect(&self) -> NotificationResult<Box<dyn MailSession>>;

    /// Transport name for logging.
    fn name(&self) -> &'static str;
}

/// One exchange with the mail server.
#[async_trait]
pub trait MailSession: Send {
    async fn mail(&mut self, from: &Address) -> NotificationResult<()>;

    async fn rcpt(&mut self, to: &Address) -> NotificationResult<()>;

    async fn data(&mut self, content: &[u8]) -> NotificationResult<()>;

    async fn quit(&mut self) -> NotificationResult<()>;

    /// Abandon the session without completing it. Never fails.
    async fn close(&mut self);
}

/// Parse an address, reporting the offending input on failure.
pub fn parse_address(raw: &str) -> NotificationResult<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| NotificationError::invalid_address(raw, e))
}

/// Build a multipart/alternative (text + html) message.
pub fn compose(
    from: &Mailbox,
    to_email: &str,
    to_name: &str,
    rendered: &RenderedEmail,
) -> NotificationResult<OutgoingMail> {
    let to_address = parse_address(to_email)?;
    let to_name = Some(to_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let to = Mailbox::new(to_name, to_address.clone());

    let message = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(&rendered.subject)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(rendered.text.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(rendered.html.clone()),
                ),
        )
        .map_err(|e| NotificationError::Compose(e.to_string()))?;

    Ok(OutgoingMail {
        from: from.email.clone(),
        to: to_address,
        content: message.formatted(),
    })
}

/// Run one message through a fresh session.
///
/// On any stage failure the session is closed and the stage error returned.
pub async fn deliver<T>(transport: &T, mail: &OutgoingMail) -> NotificationResult<()>
where
    T: MailTransport + ?Sized,
{
    let mut session = transport.connect().await?;

    let outcome = async {
        session.mail(&mail.from).await?;
        session.rcpt(&mail.to).await?;
        session.data(&mail.content).await?;
        session.quit().await
    }
    .await;

    if outcome.is_err() {
        session.close().await;
    }
    outcome
}
