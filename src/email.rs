//! Outbound message built for a single delivery job.

use serde::{Deserialize, Serialize};

use crate::address::Address;

/// An email message.
///
/// ```
/// use bulkmail::Email;
///
/// let email = Email::new()
///     .from(("Sam", "sam@example.com"))
///     .to("ana@example.com")
///     .subject("Hello!")
///     .html_body("<p>Hi Ana</p>");
/// assert!(email.is_valid());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Email subject line
    pub subject: String,
    /// HTML body
    pub html_body: Option<String>,
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl Into<Address>) -> Self {
        self.from = Some(addr.into());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl Into<Address>) -> Self {
        self.to.push(addr.into());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the HTML body.
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Check if the email has all required fields for sending.
    pub fn is_valid(&self) -> bool {
        self.from.is_some() && !self.to.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let email = Email::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Test")
            .html_body("<b>Hello</b>");

        assert_eq!(email.from.unwrap().email, "sender@example.com");
        assert_eq!(email.to.len(), 1);
        assert_eq!(email.subject, "Test");
        assert_eq!(email.html_body.as_deref(), Some("<b>Hello</b>"));
    }

    #[test]
    fn test_is_valid() {
        assert!(!Email::new().to("recipient@example.com").is_valid());
        assert!(!Email::new().from("sender@example.com").is_valid());
        assert!(Email::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .is_valid());
    }
}
