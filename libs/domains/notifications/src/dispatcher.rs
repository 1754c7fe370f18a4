//! Turns one delivery body into one email.

use crate::error::NotificationResult;
use crate::events::NotificationEvent;
use crate::templates::TemplateEngine;
use crate::transport::{compose, deliver, MailTransport};
use amqp_worker::{DeliveryHandler, HandlerError};
use async_trait::async_trait;
use lettre::message::Mailbox;
use metrics::counter;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, warn};

/// [`DeliveryHandler`] for events of type `E`, sending through `T`.
///
/// Decode, render and compose failures are permanent: the same body will fail
/// the same way. Transport failures are transient.
pub struct NotificationDispatcher<E, T: ?Sized> {
    templates: TemplateEngine,
    transport: Arc<T>,
    sender: Mailbox,
    _event: PhantomData<fn() -> E>,
}

impl<E, T> NotificationDispatcher<E, T>
where
    E: NotificationEvent,
    T: MailTransport + ?Sized,
{
    pub fn new(templates: TemplateEngine, transport: Arc<T>, sender: Mailbox) -> Self {
        Self {
            templates,
            transport,
            sender,
            _event: PhantomData,
        }
    }

    async fn dispatch(&self, body: &[u8]) -> NotificationResult<()> {
        let event: E = serde_json::from_slice(body)?;
        let rendered = event.render(&self.templates)?;
        let mail = compose(
            &self.sender,
            event.recipient_email(),
            event.recipient_name(),
            &rendered,
        )?;

        deliver(self.transport.as_ref(), &mail).await?;

        info!(
            event = E::KIND,
            to = %event.recipient_email(),
            transport = self.transport.name(),
            "Notification sent"
        );
        Ok(())
    }
}

#[async_trait]
impl<E, T> DeliveryHandler for NotificationDispatcher<E, T>
where
    E: NotificationEvent,
    T: MailTransport + ?Sized,
{
    async fn handle(&self, body: &[u8]) -> Result<(), HandlerError> {
        match self.dispatch(body).await {
            Ok(()) => {
                counter!("notifications_sent_total", "event" => E::KIND).increment(1);
                Ok(())
            }
            Err(e) => {
                let kind = if e.is_transient() { "transient" } else { "permanent" };
                counter!("notifications_failed_total", "event" => E::KIND, "kind" => kind)
                    .increment(1);
                warn!(event = E::KIND, kind, error = %e, "Notification dispatch failed");
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        E::KIND
    }
}

impl<E, T: ?Sized> std::fmt::Debug for NotificationDispatcher<E, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("sender", &self.sender.to_string())
            .finish_non_exhaustive()
    }
}
