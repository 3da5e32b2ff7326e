//! Dry-run transport that only logs.
//!
//! Useful for staging: the scheduler runs end to end and jobs reach `sent`,
//! but nothing leaves the process.

use async_trait::async_trait;

use crate::email::Email;
use crate::error::MailError;
use crate::job::Credentials;
use crate::mailer::{self, DeliveryResult, Mailer, TransportFactory};

/// Logger mailer that emits tracing events for emails.
#[derive(Debug, Clone, Default)]
pub struct LoggerMailer {
    /// If true, log the body at debug level as well.
    log_full: bool,
    login: Option<String>,
}

impl LoggerMailer {
    /// Create a logger mailer with brief output (just recipients).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger mailer that also logs bodies.
    pub fn full() -> Self {
        Self {
            log_full: true,
            login: None,
        }
    }
}

#[async_trait]
impl Mailer for LoggerMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        mailer::validate(email)?;
        let message_id = uuid::Uuid::new_v4().to_string();

        tracing::info!(
            message_id = %message_id,
            login = ?self.login,
            from = ?email.from.as_ref().map(|a| a.formatted_rfc5322()),
            to = ?email.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            subject = %email.subject,
            "Email logged"
        );

        if self.log_full {
            if let Some(ref html) = email.html_body {
                tracing::debug!(body = %html, "HTML body");
            }
        }

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}

impl TransportFactory for LoggerMailer {
    fn transport(&self, credentials: &Credentials) -> Result<Box<dyn Mailer>, MailError> {
        Ok(Box::new(Self {
            log_full: self.log_full,
            login: Some(credentials.identity.email.clone()),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "logger"
    }
}
