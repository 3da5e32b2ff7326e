//! SMTP adapter tests.
//!
//! No SMTP server is involved: these cover construction and the failure path
//! against a port nothing listens on.

#![cfg(feature = "smtp")]

use std::time::Duration;

use bulkmail::providers::{SmtpMailer, SmtpTransportFactory, TlsMode};
use bulkmail::{Credentials, Email, MailError, Mailer, SenderIdentity, TransportFactory};

fn credentials() -> Credentials {
    Credentials {
        identity: SenderIdentity::new("Goverdhan", "me@example.com"),
        secret: "abcd efgh ijkl mnop".to_string(),
    }
}

fn email() -> Email {
    Email::new()
        .from(("Goverdhan", "me@example.com"))
        .to(("Ada", "ada@example.com"))
        .subject("Launch")
        .html_body("<p>Hi Ada</p>")
}

#[test]
fn gmail_defaults() {
    let factory = SmtpTransportFactory::gmail();
    assert_eq!(factory.host(), "smtp.gmail.com");
    assert_eq!(factory.port(), 465);
    assert_eq!(TransportFactory::provider_name(&factory), "smtp");
}

#[test]
fn tls_mode_parses() {
    assert_eq!("tls".parse::<TlsMode>().unwrap(), TlsMode::Tls);
    assert_eq!("STARTTLS".parse::<TlsMode>().unwrap(), TlsMode::StartTls);
    assert_eq!("none".parse::<TlsMode>().unwrap(), TlsMode::None);
    assert!(matches!(
        "sometimes".parse::<TlsMode>(),
        Err(MailError::Configuration(_))
    ));
}

#[test]
fn factory_builds_plain_transport() {
    let factory = SmtpTransportFactory::new("localhost", 2525).tls(TlsMode::None);
    let transport = factory.transport(&credentials()).unwrap();
    assert_eq!(transport.provider_name(), "smtp");
}

#[tokio::test]
async fn unreachable_server_is_a_send_error() {
    let mailer = SmtpMailer::new("127.0.0.1", 1)
        .tls(TlsMode::None)
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let err = mailer.deliver(&email()).await.unwrap_err();
    assert!(matches!(err, MailError::SendError(_)));
}
