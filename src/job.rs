//! Delivery job model.
//!
//! A [`DeliveryJob`] is one personalized message to one recipient. Jobs are
//! created in bulk by [`submit_batch`](crate::submit_batch) and only their
//! status (and last error) changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::address::Address;
use crate::email::Email;
use crate::template;

/// Unique, immutable job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// pending ──claim──> in_flight ──> sent | failed | failed_missing_credentials
/// ```
///
/// `in_flight` marks a job claimed by a scheduler tick; it is never selected
/// as due again. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Sent,
    Failed,
    FailedMissingCredentials,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::InFlight,
        JobStatus::Sent,
        JobStatus::Failed,
        JobStatus::FailedMissingCredentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::FailedMissingCredentials => "failed_missing_credentials",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Sent | Self::Failed | Self::FailedMissingCredentials
        )
    }

    /// Whether `self -> next` is a legal one-way transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::InFlight => next.is_terminal(),
            Self::Sent | Self::Failed | Self::FailedMissingCredentials => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{}'", s))
    }
}

/// Owner of the sending account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    /// Display name shown in the `From` header.
    #[serde(default)]
    pub name: String,
    /// Address used both as `From` and as the login user.
    #[serde(default)]
    pub email: String,
}

impl SenderIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// The display-name-wrapped sender address.
    pub fn address(&self) -> Address {
        Address::with_name(self.name.as_str(), self.email.as_str())
    }
}

/// Login material for one send. The secret is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: SenderIdentity,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The unit of work: one message to one recipient.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub id: JobId,
    #[serde(default)]
    pub sender: SenderIdentity,
    /// Stored verbatim; see the crate docs on credential handling.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender_secret: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub subject: String,
    pub body_template: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DeliveryJob {
    /// Eligible for delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }

    /// Sender credentials, or `None` when the email or secret is missing.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.sender.email.trim().is_empty() || self.sender_secret.is_empty() {
            return None;
        }
        Some(Credentials {
            identity: self.sender.clone(),
            secret: self.sender_secret.clone(),
        })
    }

    /// Build the personalized message for this job.
    ///
    /// The recipient name only feeds the template; `To` carries the bare
    /// address.
    pub fn compose(&self) -> Email {
        Email::new()
            .from(self.sender.address())
            .to(Address::new(self.recipient_email.as_str()))
            .subject(self.subject.as_str())
            .html_body(template::render(&self.body_template, &self.recipient_name))
    }

    /// A copy safe to hand out: the secret is cleared.
    pub fn redacted(&self) -> Self {
        Self {
            sender_secret: String::new(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for DeliveryJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryJob")
            .field("id", &self.id)
            .field("sender", &self.sender)
            .field("sender_secret", &"<redacted>")
            .field("recipient_email", &self.recipient_email)
            .field("recipient_name", &self.recipient_name)
            .field("subject", &self.subject)
            .field("scheduled_at", &self.scheduled_at)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
