//! Testing utilities and assertion helpers.
//!
//! Assertions over what a [`LocalMailer`] captured and over job state in a
//! [`JobStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use bulkmail::providers::LocalMailer;
//! use bulkmail::testing::*;
//!
//! #[tokio::test]
//! async fn test_batch_delivery() {
//!     let mailer = LocalMailer::new();
//!
//!     // ... submit a batch, run a tick ...
//!
//!     assert_email_count(&mailer, 2);
//!     assert_email_to(&mailer, "a@x.com");
//!     assert_email_html_matches(&mailer, r"Hi \w+");
//!     assert_job_status(&*store, id, JobStatus::Sent).await;
//! }
//! ```

use regex::Regex;

use crate::job::{JobId, JobStatus};
use crate::providers::{LocalMailer, SentEmail};
use crate::storage::JobStore;

/// Format a list of emails for error messages.
fn format_email_summary(emails: &[SentEmail]) -> String {
    if emails.is_empty() {
        return "  (no emails sent)".to_string();
    }

    emails
        .iter()
        .enumerate()
        .map(|(i, stored)| {
            let e = &stored.email;
            let to = e
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let from = e
                .from
                .as_ref()
                .map(|a| a.email.as_str())
                .unwrap_or("<none>");
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\"",
                i + 1,
                to,
                from,
                e.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Delivery Assertions
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(mailer: &LocalMailer) {
    assert!(mailer.has_emails(), "Expected at least one email to be sent, but none were");
}

/// Assert that no emails were sent.
///
/// # Panics
///
/// Panics if any emails were sent.
pub fn assert_no_emails_sent(mailer: &LocalMailer) {
    let emails = mailer.emails();
    assert!(
        emails.is_empty(),
        "Expected no emails to be sent, but {} were:\n{}",
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert exactly `expected` emails were sent.
pub fn assert_email_count(mailer: &LocalMailer, expected: usize) {
    let emails = mailer.emails();
    assert_eq!(
        emails.len(),
        expected,
        "Expected {} emails, got {}:\n{}",
        expected,
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert that an email was sent to `email`.
pub fn assert_email_to(mailer: &LocalMailer, email: &str) {
    assert!(
        mailer.sent_to(email),
        "Expected an email to {}, but none was sent. Sent emails:\n{}",
        email,
        format_email_summary(&mailer.emails())
    );
}

/// Assert that nothing was sent to `email`.
pub fn refute_email_to(mailer: &LocalMailer, email: &str) {
    assert!(
        !mailer.sent_to(email),
        "Expected no email to {}, but {} were sent",
        email,
        mailer.count_to(email)
    );
}

/// Assert the last email has exactly this subject.
pub fn assert_email_subject(mailer: &LocalMailer, subject: &str) {
    let last = get_last_email(mailer);
    assert_eq!(last.email.subject, subject, "Subject mismatch on last email");
}

/// Assert the last email came from `from_email`.
pub fn assert_email_from(mailer: &LocalMailer, from_email: &str) {
    let last = get_last_email(mailer);
    let from = last.email.from.as_ref().map(|a| a.email.as_str());
    assert_eq!(from, Some(from_email), "From mismatch on last email");
}

/// Assert the last email was sent through a transport logged in as `login`.
pub fn assert_sent_as(mailer: &LocalMailer, login: &str) {
    let last = get_last_email(mailer);
    assert_eq!(
        last.login.as_deref(),
        Some(login),
        "Expected the last email to be sent as {}",
        login
    );
}

/// Assert the HTML body of the email to `recipient` contains `text`.
pub fn assert_email_html_contains(mailer: &LocalMailer, recipient: &str, text: &str) {
    let html = html_to(mailer, recipient);
    assert!(
        html.contains(text),
        "Expected HTML body to {} to contain {:?}, got {:?}",
        recipient,
        text,
        html
    );
}

/// Assert the last email's HTML body matches `pattern`.
///
/// # Panics
///
/// Panics if the pattern is invalid, nothing was sent, or the body does not match.
pub fn assert_email_html_matches(mailer: &LocalMailer, pattern: &str) {
    let re = Regex::new(pattern).unwrap_or_else(|e| panic!("Invalid regex {:?}: {}", pattern, e));
    let last = get_last_email(mailer);
    let html = last.email.html_body.unwrap_or_default();
    assert!(
        re.is_match(&html),
        "Expected HTML body to match /{}/, got {:?}",
        pattern,
        html
    );
}

/// Get the most recently sent email.
///
/// # Panics
///
/// Panics if nothing was sent.
pub fn get_last_email(mailer: &LocalMailer) -> SentEmail {
    mailer
        .last_email()
        .unwrap_or_else(|| panic!("Expected at least one email to be sent, but none were"))
}

/// All emails sent to `email`.
pub fn get_emails_to(mailer: &LocalMailer, email: &str) -> Vec<SentEmail> {
    mailer.find_emails(|e| e.to.iter().any(|a| a.email.eq_ignore_ascii_case(email)))
}

fn html_to(mailer: &LocalMailer, recipient: &str) -> String {
    let emails = get_emails_to(mailer, recipient);
    let Some(found) = emails.last() else {
        panic!(
            "Expected an email to {}, but none was sent. Sent emails:\n{}",
            recipient,
            format_email_summary(&mailer.emails())
        );
    };
    found.email.html_body.clone().unwrap_or_default()
}

// ============================================================================
// Job Assertions
// ============================================================================

/// Assert job `id` exists and is in `expected`.
pub async fn assert_job_status<S>(store: &S, id: JobId, expected: JobStatus)
where
    S: JobStore + ?Sized,
{
    let job = match store.get(id).await {
        Ok(Some(job)) => job,
        Ok(None) => panic!("Job {} not found", id),
        Err(e) => panic!("Failed to load job {}: {}", id, e),
    };
    assert_eq!(
        job.status, expected,
        "Job {} to {} is {} (last error: {:?})",
        id, job.recipient_email, job.status, job.last_error
    );
}

/// Assert every job in the store is in `expected`.
pub async fn assert_all_jobs<S>(store: &S, expected: JobStatus)
where
    S: JobStore + ?Sized,
{
    let jobs = store
        .list(None)
        .await
        .unwrap_or_else(|e| panic!("Failed to list jobs: {}", e));
    let stray: Vec<_> = jobs
        .iter()
        .filter(|j| j.status != expected)
        .map(|j| format!("{} ({})", j.recipient_email, j.status))
        .collect();
    assert!(
        stray.is_empty(),
        "Expected all jobs to be {}, but found: {}",
        expected,
        stray.join(", ")
    );
}
