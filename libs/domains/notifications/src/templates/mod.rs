//! Email template rendering engine.
//!
//! This module provides Handlebars-based template rendering for the deadline
//! emails. Templates run in strict mode, so a missing field is a render error
//! instead of a silently blank line.

use crate::error::{NotificationError, NotificationResult};
use crate::events::{SubscriptionExpiring, TrialExpiring};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// HTML body content.
    pub html: String,
    /// Plain text body content.
    pub text: String,
    /// Email subject line.
    pub subject: String,
}

#[derive(Serialize)]
struct SubscriptionExpiringView<'a> {
    username: &'a str,
    service_name: &'a str,
    end_date: String,
    price: String,
}

#[derive(Serialize)]
struct TrialExpiringView<'a> {
    username: &'a str,
    trial_end_date: Option<String>,
}

/// Template engine for rendering email templates.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        let templates = [
            ("subscription_expiring_html", SUBSCRIPTION_EXPIRING_HTML_TEMPLATE),
            ("subscription_expiring_text", SUBSCRIPTION_EXPIRING_TEXT_TEMPLATE),
            ("trial_expiring_html", TRIAL_EXPIRING_HTML_TEMPLATE),
            ("trial_expiring_text", TRIAL_EXPIRING_TEXT_TEMPLATE),
        ];
        for (name, source) in templates {
            handlebars.register_template_string(name, source).map_err(|e| {
                NotificationError::TemplateError(format!("Failed to register {}: {}", name, e))
            })?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render a template with the given data.
    fn render<T: Serialize>(&self, template_name: &str, data: &T) -> NotificationResult<String> {
        self.handlebars
            .render(template_name, data)
            .map_err(|e| NotificationError::TemplateError(format!("{}: {}", template_name, e)))
    }

    /// Render the "your subscription renews tomorrow" email.
    pub fn render_subscription_expiring(
        &self,
        event: &SubscriptionExpiring,
    ) -> NotificationResult<RenderedEmail> {
        debug!(user = %event.username, service = %event.service_name, "Rendering subscription expiring email");

        let view = SubscriptionExpiringView {
            username: &event.username,
            service_name: &event.service_name,
            end_date: display_date(&event.end_date),
            price: format!("{:.2}", event.price),
        };

        Ok(RenderedEmail {
            html: self.render("subscription_expiring_html", &view)?,
            text: self.render("subscription_expiring_text", &view)?,
            subject: format!("Your {} subscription ends tomorrow", event.service_name),
        })
    }

    /// Render the "your trial ends today" email.
    pub fn render_trial_expiring(&self, event: &TrialExpiring) -> NotificationResult<RenderedEmail> {
        debug!(user = %event.username, "Rendering trial expiring email");

        let view = TrialExpiringView {
            username: &event.username,
            trial_end_date: event.trial_end_date.as_ref().map(display_date),
        };

        Ok(RenderedEmail {
            html: self.render("trial_expiring_html", &view)?,
            text: self.render("trial_expiring_text", &view)?,
            subject: "Your free trial ends today".to_string(),
        })
    }
}

fn display_date(date: &DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

// ============================================================================
// Email Templates
// ============================================================================

const SUBSCRIPTION_EXPIRING_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Subscription ending</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">
          Hi {{username}},
        </h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          Your <strong>{{service_name}}</strong> subscription ends tomorrow, on {{end_date}}.
        </p>
        <table width="100%" cellspacing="0" cellpadding="0" style="margin-bottom: 24px;">
          <tr>
            <td style="background-color: #fef3c7; border-radius: 8px; padding: 16px; border-left: 4px solid #f59e0b;">
              <p style="color: #92400e; font-size: 14px; margin: 0;">
                If it renews automatically you will be charged <strong>{{price}}</strong>.
              </p>
            </td>
          </tr>
        </table>
        <p style="color: #71717a; font-size: 12px; margin: 0;">
          Not using it anymore? Cancel before the end date to avoid the charge.
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const SUBSCRIPTION_EXPIRING_TEXT_TEMPLATE: &str = r#"Hi {{{username}}},

Your {{{service_name}}} subscription ends tomorrow, on {{end_date}}.

If it renews automatically you will be charged {{price}}.

Not using it anymore? Cancel before the end date to avoid the charge."#;

const TRIAL_EXPIRING_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Trial ending</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">
          Hi {{username}},
        </h1>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          Your free trial ends today{{#if trial_end_date}} ({{trial_end_date}}){{/if}}.
        </p>
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0;">
          Upgrade to keep tracking your subscriptions and getting renewal reminders.
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const TRIAL_EXPIRING_TEXT_TEMPLATE: &str = r#"Hi {{{username}}},

Your free trial ends today{{#if trial_end_date}} ({{trial_end_date}}){{/if}}.

Upgrade to keep tracking your subscriptions and getting renewal reminders."#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn expiring() -> SubscriptionExpiring {
        SubscriptionExpiring {
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            service_name: "AT&T Music".to_string(),
            end_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            price: 9.5,
        }
    }

    #[test]
    fn test_template_engine_creation() {
        let engine = TemplateEngine::new();
        assert!(engine.is_ok());
    }

    #[test]
    fn test_render_subscription_expiring() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine.render_subscription_expiring(&expiring()).unwrap();

        assert_eq!(rendered.subject, "Your AT&T Music subscription ends tomorrow");
        assert!(rendered.text.contains("AT&T Music subscription ends tomorrow, on March 1, 2026"));
        assert!(rendered.text.contains("9.50"));
        // html escapes, text does not
        assert!(rendered.html.contains("AT&amp;T Music"));
    }

    #[test]
    fn test_render_trial_expiring_with_and_without_date() {
        let engine = TemplateEngine::new().unwrap();
        let mut event = TrialExpiring {
            uuid: Uuid::nil(),
            email: "bob@example.com".to_string(),
            username: "bob".to_string(),
            trial_end_date: None,
        };

        let rendered = engine.render_trial_expiring(&event).unwrap();
        assert!(rendered.text.contains("Your free trial ends today."));

        event.trial_end_date = Some(Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap());
        let rendered = engine.render_trial_expiring(&event).unwrap();
        assert!(rendered.text.contains("ends today (February 10, 2026)."));
        assert!(rendered.html.contains("Hi bob"));
    }

    #[test]
    fn test_missing_field_fails_in_strict_mode() {
        let engine = TemplateEngine::new().unwrap();
        let err = engine
            .render("trial_expiring_text", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, NotificationError::TemplateError(_)));
    }
}
