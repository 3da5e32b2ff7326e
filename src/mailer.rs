//! Mailer and transport factory traits.
//!
//! # Why `async_trait`?
//!
//! The scheduler holds its transport factory as `Arc<dyn TransportFactory>`
//! and every factory hands back a `Box<dyn Mailer>`, so both traits must be
//! object-safe. Native async traits are not; `#[async_trait]` boxes the
//! returned futures instead. One allocation per send is noise next to an
//! SMTP round trip.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::MailError;
use crate::job::Credentials;

/// Result of a successful email delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID (or server response line) assigned by the provider
    pub message_id: String,
}

impl DeliveryResult {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// A connected, credential-bound sender.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError>;

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }
}

/// Builds a short-lived [`Mailer`] scoped to one job's credentials.
///
/// Each job may carry a different sender account, so there is no shared
/// authenticated connection: the scheduler asks for a fresh transport per
/// job and drops it after the send.
pub trait TransportFactory: Send + Sync {
    /// Build a transport that authenticates as `credentials`.
    fn transport(&self, credentials: &Credentials) -> Result<Box<dyn Mailer>, MailError>;

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str;
}

/// Validate an email before sending.
pub(crate) fn validate(email: &Email) -> Result<(), MailError> {
    if email.from.is_none() {
        return Err(MailError::MissingField("from"));
    }
    if email.to.is_empty() {
        return Err(MailError::MissingField("to"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(matches!(
            validate(&Email::new().to("a@x.com")),
            Err(MailError::MissingField("from"))
        ));
        assert!(matches!(
            validate(&Email::new().from("a@x.com")),
            Err(MailError::MissingField("to"))
        ));
        assert!(validate(&Email::new().from("a@x.com").to("b@x.com")).is_ok());
    }
}
