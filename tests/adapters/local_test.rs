//! LocalMailer adapter tests.

#![cfg(feature = "local")]

use std::time::Duration;

use bulkmail::providers::LocalMailer;
use bulkmail::testing::*;
use bulkmail::{Credentials, Email, MailError, Mailer, SenderIdentity, TransportFactory};

fn credentials(email: &str) -> Credentials {
    Credentials {
        identity: SenderIdentity::new("Goverdhan", email),
        secret: "abcd efgh ijkl mnop".to_string(),
    }
}

fn email_to(to: &str) -> Email {
    Email::new()
        .from(("Goverdhan", "me@example.com"))
        .to(("Ada", to))
        .subject("Launch")
        .html_body("<p>Hi Ada</p>")
}

// ============================================================================
// Per-Sender Transports
// ============================================================================

#[tokio::test]
async fn each_transport_is_bound_to_its_sender() {
    let mailer = LocalMailer::new();

    let first = mailer.transport(&credentials("one@example.com")).unwrap();
    let second = mailer.transport(&credentials("two@example.com")).unwrap();

    first.deliver(&email_to("a@x.com")).await.unwrap();
    assert_sent_as(&mailer, "one@example.com");

    second.deliver(&email_to("b@x.com")).await.unwrap();
    assert_sent_as(&mailer, "two@example.com");

    assert_eq!(mailer.transports_built(), 2);
    assert_email_count(&mailer, 2);
}

#[tokio::test]
async fn rejected_login_surfaces_as_send_error() {
    let mailer = LocalMailer::new();
    mailer.reject_login("revoked@example.com");

    let transport = mailer.transport(&credentials("revoked@example.com")).unwrap();
    let err = transport.deliver(&email_to("a@x.com")).await.unwrap_err();

    assert!(matches!(err, MailError::SendError(_)));
    assert_no_emails_sent(&mailer);
    assert_eq!(mailer.attempts(), 1);
}

// ============================================================================
// Capture
// ============================================================================

#[tokio::test]
async fn captures_display_names() {
    let mailer = LocalMailer::new();
    mailer.deliver(&email_to("a@x.com")).await.unwrap();

    let last = get_last_email(&mailer);
    assert_eq!(last.email.to[0].name.as_deref(), Some("Ada"));
    assert_eq!(
        last.email.from.as_ref().unwrap().formatted_rfc5322(),
        "\"Goverdhan\" <me@example.com>"
    );
    assert_email_html_contains(&mailer, "a@x.com", "Hi Ada");
}

#[tokio::test]
async fn invalid_email_is_not_captured() {
    let mailer = LocalMailer::new();
    let result = mailer.deliver(&Email::new().to("a@x.com").subject("x")).await;

    assert!(matches!(result, Err(MailError::MissingField("from"))));
    assert_no_emails_sent(&mailer);
}

#[tokio::test]
async fn delay_is_applied_per_delivery() {
    let mailer = LocalMailer::new();
    mailer.set_delay(Duration::from_millis(30));

    let started = std::time::Instant::now();
    mailer.deliver(&email_to("a@x.com")).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(30));
}
