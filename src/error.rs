//! Error types for bulkmail.

use thiserror::Error;

use crate::job::JobId;

/// Errors raised by transports and configuration.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Configuration error (missing env var, invalid value, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing required field (e.g., from address).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Error building the email message.
    #[error("Build error: {0}")]
    BuildError(String),

    /// Error sending the email (authentication rejection, protocol error, ...).
    #[error("Send error: {0}")]
    SendError(String),

    /// The send did not finish within the configured timeout.
    #[error("Send timed out after {0}s")]
    Timeout(u64),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by batch intake, the job store and the scheduler.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Malformed or incomplete batch request. Nothing was persisted.
    #[error("{0}")]
    Validation(String),

    /// The job store rejected a read or write.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A due job has no sender credentials on record.
    #[error("Missing sender credentials for job {0}")]
    Credential(JobId),

    /// The transport failed to deliver a job.
    #[error("Delivery error: {0}")]
    Delivery(#[from] MailError),
}

impl QueueError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// HTTP-equivalent status for reporting this error to a submitter.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::BuildError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::SendError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}
