//! Local mailer for development and testing.
//!
//! Captures emails in memory instead of sending them, and doubles as its own
//! [`TransportFactory`]: every per-job transport it hands out shares the same
//! capture buffer and remembers which sender it was logged in as.
//!
//! # Testing Usage
//!
//! ```rust,ignore
//! use bulkmail::providers::LocalMailer;
//! use bulkmail::testing::*;
//!
//! #[tokio::test]
//! async fn delivers_due_jobs() {
//!     let mailer = LocalMailer::new();
//!     let scheduler = DeliveryScheduler::new(store, Arc::new(mailer.clone()));
//!
//!     scheduler.tick().await?;
//!
//!     assert_email_count(&mailer, 2);
//!     assert_email_to(&mailer, "a@x.com");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::email::Email;
use crate::error::MailError;
use crate::job::Credentials;
use crate::mailer::{self, DeliveryResult, Mailer, TransportFactory};

/// An email captured by [`LocalMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Unique identifier for this email.
    pub id: String,
    /// The email content.
    pub email: Email,
    /// The account the transport was logged in as, if any.
    pub login: Option<String>,
    /// When the email was captured.
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    sent: Mutex<Vec<SentEmail>>,
    /// If set, deliver() fails with this message.
    fail_with: RwLock<Option<String>>,
    /// Recipients whose deliveries fail.
    fail_for: RwLock<HashSet<String>>,
    /// Logins whose deliveries fail as an authentication rejection.
    rejected_logins: RwLock<HashSet<String>>,
    /// Simulated network latency per delivery.
    delay: RwLock<Option<Duration>>,
    attempts: AtomicUsize,
    transports_built: AtomicUsize,
}

/// Local mailer that stores emails in memory.
#[derive(Clone, Default)]
pub struct LocalMailer {
    inner: Arc<Inner>,
    login: Option<String>,
}

impl LocalMailer {
    /// Create a new local mailer with an empty capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Failure Simulation (for testing)
    // =========================================================================

    /// Make every delivery fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.inner.fail_with.write() = Some(message.into());
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.inner.fail_with.write() = None;
        self.inner.fail_for.write().clear();
        self.inner.rejected_logins.write().clear();
    }

    /// Make deliveries to `recipient` fail.
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.inner
            .fail_for
            .write()
            .insert(recipient.into().to_ascii_lowercase());
    }

    /// Reject deliveries from transports logged in as `login`.
    pub fn reject_login(&self, login: impl Into<String>) {
        self.inner
            .rejected_logins
            .write()
            .insert(login.into().to_ascii_lowercase());
    }

    /// Delay every delivery by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.write() = Some(delay);
    }

    // =========================================================================
    // Email Access (for testing assertions)
    // =========================================================================

    /// All captured emails, oldest first.
    pub fn emails(&self) -> Vec<SentEmail> {
        self.inner.sent.lock().clone()
    }

    /// Get the most recently captured email.
    pub fn last_email(&self) -> Option<SentEmail> {
        self.inner.sent.lock().last().cloned()
    }

    /// Get the count of captured emails.
    pub fn email_count(&self) -> usize {
        self.inner.sent.lock().len()
    }

    /// Check if any email was captured.
    pub fn has_emails(&self) -> bool {
        self.email_count() > 0
    }

    /// Number of deliver() calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Number of per-job transports handed out.
    pub fn transports_built(&self) -> usize {
        self.inner.transports_built.load(Ordering::SeqCst)
    }

    /// Clear all captured emails.
    pub fn clear(&self) {
        self.inner.sent.lock().clear();
    }

    /// Remove and return all captured emails.
    pub fn flush(&self) -> Vec<SentEmail> {
        std::mem::take(&mut *self.inner.sent.lock())
    }

    // =========================================================================
    // Query Helpers (for testing)
    // =========================================================================

    /// Number of emails captured for a recipient.
    pub fn count_to(&self, email: &str) -> usize {
        self.find_emails(|e| e.to.iter().any(|a| a.email.eq_ignore_ascii_case(email)))
            .len()
    }

    /// Check if an email was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.count_to(email) > 0
    }

    /// Check if an email with matching subject was sent.
    pub fn sent_with_subject(&self, subject: &str) -> bool {
        self.inner
            .sent
            .lock()
            .iter()
            .any(|stored| stored.email.subject == subject)
    }

    /// Find emails matching a predicate.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<SentEmail>
    where
        F: Fn(&Email) -> bool,
    {
        self.inner
            .sent
            .lock()
            .iter()
            .filter(|stored| predicate(&stored.email))
            .cloned()
            .collect()
    }

    fn check_failures(&self, email: &Email) -> Result<(), MailError> {
        if let Some(message) = self.inner.fail_with.read().clone() {
            return Err(MailError::SendError(message));
        }
        if let Some(login) = &self.login {
            if self
                .inner
                .rejected_logins
                .read()
                .contains(&login.to_ascii_lowercase())
            {
                return Err(MailError::SendError(format!(
                    "535 authentication rejected for {}",
                    login
                )));
            }
        }
        let fail_for = self.inner.fail_for.read();
        if let Some(addr) = email
            .to
            .iter()
            .find(|a| fail_for.contains(&a.email.to_ascii_lowercase()))
        {
            return Err(MailError::SendError(format!(
                "550 mailbox unavailable: {}",
                addr.email
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check_failures(email)?;
        mailer::validate(email)?;

        let id = uuid::Uuid::new_v4().to_string();
        self.inner.sent.lock().push(SentEmail {
            id: id.clone(),
            email: email.clone(),
            login: self.login.clone(),
            sent_at: Utc::now(),
        });
        Ok(DeliveryResult::new(id))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

impl TransportFactory for LocalMailer {
    fn transport(&self, credentials: &Credentials) -> Result<Box<dyn Mailer>, MailError> {
        self.inner.transports_built.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Self {
            inner: Arc::clone(&self.inner),
            login: Some(credentials.identity.email.clone()),
        }))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}
