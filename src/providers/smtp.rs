//! SMTP transport using lettre.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulkmail::providers::{SmtpMailer, TlsMode};
//!
//! // Implicit TLS on 465, authenticated as the sender
//! let mailer = SmtpMailer::new("smtp.gmail.com", 465)
//!     .tls(TlsMode::Tls)
//!     .credentials("you@gmail.com", "app-password")
//!     .build()?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials as SmtpCredentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::address::Address;
use crate::email::Email;
use crate::error::MailError;
use crate::job::Credentials;
use crate::mailer::{self, DeliveryResult, Mailer, TransportFactory};

/// Default outbound host.
pub const DEFAULT_HOST: &str = "smtp.gmail.com";
/// SMTPS (implicit TLS) submission port.
pub const DEFAULT_PORT: u16 = 465;
/// Connection, greeting and command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP email provider.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a new SMTP mailer builder (implicit TLS, 30s timeout).
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            tls: TlsMode::Tls,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a lettre Message from our Email struct.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        mailer::validate(email)?;
        let from = email
            .from
            .as_ref()
            .ok_or(MailError::MissingField("from"))?;

        let mut builder = Message::builder()
            .from(address_to_mailbox(from)?)
            .subject(&email.subject);

        for to in &email.to {
            builder = builder.to(address_to_mailbox(to)?);
        }

        let message = builder
            .header(ContentType::TEXT_HTML)
            .body(email.html_body.clone().unwrap_or_default())?;

        Ok(message)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let message = self.build_message(email)?;

        let response = self.transport.send(message).await?;

        // First line of the server's reply, or a generated ID
        let message_id = response
            .message()
            .next()
            .and_then(|m| m.lines().next())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// No TLS (dangerous, only for localhost)
    None,
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

impl std::str::FromStr for TlsMode {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            other => Err(MailError::Configuration(format!(
                "Unknown SMTP_TLS mode: {}. Valid modes are: tls, starttls, none",
                other
            ))),
        }
    }
}

/// Builder for SmtpMailer.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    credentials: Option<SmtpCredentials>,
    tls: TlsMode,
    timeout: Duration,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(SmtpCredentials::new(
            username.to_string(),
            password.to_string(),
        ));
        self
    }

    /// Set TLS mode.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Bound connection, greeting and each command.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the SmtpMailer. Nothing connects until the first send.
    pub fn build(self) -> Result<SmtpMailer, MailError> {
        let builder = match self.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host),
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?,
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)?,
        };

        let mut builder = builder.port(self.port).timeout(Some(self.timeout));
        if let Some(creds) = self.credentials {
            builder = builder.credentials(creds);
        }

        Ok(SmtpMailer {
            transport: builder.build(),
        })
    }
}

/// Builds one [`SmtpMailer`] per job, logged in as the job's sender.
#[derive(Debug, Clone)]
pub struct SmtpTransportFactory {
    host: String,
    port: u16,
    tls: TlsMode,
    timeout: Duration,
}

impl SmtpTransportFactory {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: TlsMode::Tls,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// `smtp.gmail.com:465`, implicit TLS, 30s timeout.
    pub fn gmail() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }

    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Default for SmtpTransportFactory {
    fn default() -> Self {
        Self::gmail()
    }
}

impl TransportFactory for SmtpTransportFactory {
    fn transport(&self, credentials: &Credentials) -> Result<Box<dyn Mailer>, MailError> {
        let mailer = SmtpMailer::new(&self.host, self.port)
            .tls(self.tls)
            .timeout(self.timeout)
            .credentials(&credentials.identity.email, &credentials.secret)
            .build()?;
        Ok(Box::new(mailer))
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

/// Convert our Address to lettre's Mailbox.
fn address_to_mailbox(addr: &Address) -> Result<Mailbox, MailError> {
    let email: lettre::Address = addr.to_ascii()?.parse()?;
    Ok(Mailbox::new(addr.name.clone(), email))
}
