//! Logger adapter tests.

use bulkmail::providers::LoggerMailer;
use bulkmail::{Credentials, Email, Mailer, SenderIdentity, TransportFactory};

fn email() -> Email {
    Email::new()
        .from(("Goverdhan", "me@example.com"))
        .to("ada@example.com")
        .subject("Launch")
        .html_body("<p>Hi Ada</p>")
}

#[tokio::test]
async fn deliver_returns_ok() {
    let delivery = LoggerMailer::new().deliver(&email()).await.unwrap();
    assert!(!delivery.message_id.is_empty());
}

#[tokio::test]
async fn deliver_with_full_logging_returns_ok() {
    let delivery = LoggerMailer::full().deliver(&email()).await.unwrap();
    assert!(!delivery.message_id.is_empty());
}

#[tokio::test]
async fn factory_transports_deliver() {
    let credentials = Credentials {
        identity: SenderIdentity::new("Goverdhan", "me@example.com"),
        secret: "pw".to_string(),
    };
    let transport = LoggerMailer::new().transport(&credentials).unwrap();

    assert!(transport.deliver(&email()).await.is_ok());
}

#[tokio::test]
async fn message_ids_are_unique() {
    let mailer = LoggerMailer::new();
    let first = mailer.deliver(&email()).await.unwrap();
    let second = mailer.deliver(&email()).await.unwrap();
    assert_ne!(first.message_id, second.message_id);
}
