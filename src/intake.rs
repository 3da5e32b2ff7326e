//! Batch intake: validate a submission and queue one job per recipient.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::address::Address;
use crate::error::QueueError;
use crate::job::{DeliveryJob, JobId, JobStatus, SenderIdentity};
use crate::storage::JobStore;

/// Display name stored when a submission does not carry one.
pub const DEFAULT_SENDER_NAME: &str = "Bulk Mailer";

/// A batch submission.
///
/// Field names follow the submission form (`senderEmail`, `appPassword`,
/// `emails`, `names`, `content`, `scheduledTime`). The longer names
/// `senderIdentity`, `senderSecret`, `recipientEmails`, `recipientNames`,
/// `bodyTemplate` and `scheduledAt` are accepted as aliases. A null, empty
/// or absent `scheduledTime` means "now". It may be RFC 3339 or a
/// `datetime-local` value (`2030-10-18T10:30`), read as server-local time.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default, alias = "senderIdentity")]
    pub sender_email: Option<String>,
    #[serde(default, alias = "senderSecret")]
    pub app_password: Option<String>,
    #[serde(default, alias = "recipientEmails")]
    pub emails: Vec<String>,
    #[serde(default, alias = "recipientNames")]
    pub names: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "bodyTemplate")]
    pub content: String,
    #[serde(default, alias = "scheduledAt", deserialize_with = "deserialize_schedule")]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("sender_name", &self.sender_name)
            .field("sender_email", &self.sender_email)
            .field("app_password", &self.app_password.as_ref().map(|_| "<redacted>"))
            .field("emails", &self.emails)
            .field("names", &self.names)
            .field("subject", &self.subject)
            .field("scheduled_time", &self.scheduled_time)
            .finish_non_exhaustive()
    }
}

/// Outcome of an accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    pub job_ids: Vec<JobId>,
    pub scheduled_at: DateTime<Utc>,
}

impl BatchReceipt {
    pub fn queued(&self) -> usize {
        self.job_ids.len()
    }
}

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a schedule timestamp. Values without an offset are local time.
fn parse_schedule(value: &str) -> Result<DateTime<Utc>, String> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    let naive = LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| format!("invalid schedule time '{}'", value))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| format!("schedule time '{}' does not exist locally", value))
}

fn deserialize_schedule<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) if !value.trim().is_empty() => {
            parse_schedule(&value).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Validate and normalize `request` into pending jobs without persisting.
///
/// Recipient emails and names are trimmed; every recipient must be a valid
/// address. Nothing is returned unless the whole batch is valid.
pub fn build_jobs(
    request: &BatchRequest,
    now: DateTime<Utc>,
    default_sender_name: &str,
) -> Result<Vec<DeliveryJob>, QueueError> {
    let (Some(sender_email), Some(secret)) = (
        non_blank(&request.sender_email),
        non_blank(&request.app_password),
    ) else {
        return Err(QueueError::validation(
            "Error: Missing Sender Email or App Password.",
        ));
    };
    let sender_email = sender_email.trim();
    if Address::parse(sender_email).is_err() {
        return Err(QueueError::validation(format!(
            "Error: Invalid sender email '{}'.",
            sender_email
        )));
    }

    if request.emails.is_empty() || request.names.is_empty() {
        return Err(QueueError::validation(
            "Error: At least one recipient is required.",
        ));
    }
    if request.emails.len() != request.names.len() {
        return Err(QueueError::validation(
            "Error: Email count does not match Name count.",
        ));
    }

    let sender = SenderIdentity::new(
        non_blank(&request.sender_name)
            .map(str::trim)
            .unwrap_or(default_sender_name),
        sender_email,
    );
    let scheduled_at = request.scheduled_time.unwrap_or(now);

    request
        .emails
        .iter()
        .zip(&request.names)
        .map(|(email, name)| {
            let recipient = Address::parse(email.trim()).map_err(|_| {
                QueueError::validation(format!(
                    "Error: Invalid recipient email '{}'.",
                    email.trim()
                ))
            })?;
            Ok(DeliveryJob {
                id: JobId::new(),
                sender: sender.clone(),
                sender_secret: secret.to_string(),
                recipient_email: recipient.email,
                recipient_name: name.trim().to_string(),
                subject: request.subject.clone(),
                body_template: request.content.clone(),
                scheduled_at,
                status: JobStatus::Pending,
                created_at: now,
                last_error: None,
            })
        })
        .collect()
}

/// Accepts batch submissions and writes them to a [`JobStore`].
#[derive(Clone)]
pub struct BatchIntake {
    store: Arc<dyn JobStore>,
    default_sender_name: String,
}

impl BatchIntake {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            default_sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }

    /// The store batches are written to.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Display name used when a submission has none.
    pub fn default_sender_name(mut self, name: impl Into<String>) -> Self {
        self.default_sender_name = name.into();
        self
    }

    /// Validate and queue a batch submitted now.
    pub async fn submit(&self, request: BatchRequest) -> Result<BatchReceipt, QueueError> {
        self.submit_at(request, Utc::now()).await
    }

    /// Validate and queue a batch as if submitted at `now`.
    ///
    /// Jobs become visible to the scheduler as soon as the bulk insert
    /// commits. A failed insert fails the whole batch.
    pub async fn submit_at(
        &self,
        request: BatchRequest,
        now: DateTime<Utc>,
    ) -> Result<BatchReceipt, QueueError> {
        let jobs = build_jobs(&request, now, &self.default_sender_name)?;
        let scheduled_at = request.scheduled_time.unwrap_or(now);

        if let Err(e) = self.store.insert_many(&jobs).await {
            tracing::error!(error = %e, count = jobs.len(), "Failed to queue batch");
            return Err(e);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("bulkmail_jobs_submitted_total").increment(jobs.len() as u64);

        tracing::info!(
            count = jobs.len(),
            sender = %jobs[0].sender.email,
            scheduled_at = %scheduled_at,
            "Batch queued"
        );

        Ok(BatchReceipt {
            job_ids: jobs.iter().map(|job| job.id).collect(),
            scheduled_at,
        })
    }
}

/// Validate `request` and queue it in `store` (one-off helper around [`BatchIntake`]).
pub async fn submit_batch(
    store: Arc<dyn JobStore>,
    request: BatchRequest,
) -> Result<BatchReceipt, QueueError> {
    BatchIntake::new(store).submit(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn request() -> BatchRequest {
        BatchRequest {
            sender_name: Some("Goverdhan".to_string()),
            sender_email: Some("me@example.com".to_string()),
            app_password: Some("abcd efgh ijkl mnop".to_string()),
            emails: vec!["a@x.com".to_string(), " b@x.com ".to_string()],
            names: vec!["A".to_string(), " B".to_string()],
            subject: "Hi".to_string(),
            content: "Hello {name}".to_string(),
            scheduled_time: None,
        }
    }

    #[test]
    fn test_one_job_per_recipient() {
        let now = Utc::now();
        let jobs = build_jobs(&request(), now, DEFAULT_SENDER_NAME).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].recipient_email, "b@x.com");
        assert_eq!(jobs[1].recipient_name, "B");
        for job in &jobs {
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.scheduled_at, now);
            assert_eq!(job.created_at, now);
            assert_eq!(job.subject, "Hi");
            assert_eq!(job.sender.name, "Goverdhan");
            assert_eq!(job.sender_secret, "abcd efgh ijkl mnop");
        }
        assert_ne!(jobs[0].id, jobs[1].id);
    }

    #[test]
    fn test_scheduled_time_is_kept() {
        let now = Utc::now();
        let later = now + Duration::hours(2);
        let mut req = request();
        req.scheduled_time = Some(later);

        let jobs = build_jobs(&req, now, DEFAULT_SENDER_NAME).unwrap();
        assert!(jobs.iter().all(|job| job.scheduled_at == later));
    }

    #[test]
    fn test_missing_sender_name_uses_default() {
        let mut req = request();
        req.sender_name = Some("   ".to_string());
        let jobs = build_jobs(&req, Utc::now(), "Fallback").unwrap();
        assert_eq!(jobs[0].sender.name, "Fallback");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        for strip in [0, 1] {
            let mut req = request();
            if strip == 0 {
                req.sender_email = None;
            } else {
                req.app_password = Some(String::new());
            }
            let err = build_jobs(&req, Utc::now(), DEFAULT_SENDER_NAME).unwrap_err();
            assert!(matches!(err, QueueError::Validation(ref m) if m.contains("App Password")));
        }
    }

    #[test]
    fn test_mismatched_or_empty_recipients_rejected() {
        let mut req = request();
        req.names.pop();
        assert!(matches!(
            build_jobs(&req, Utc::now(), DEFAULT_SENDER_NAME),
            Err(QueueError::Validation(m)) if m.contains("does not match")
        ));

        let mut req = request();
        req.emails.clear();
        req.names.clear();
        assert!(matches!(
            build_jobs(&req, Utc::now(), DEFAULT_SENDER_NAME),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn test_invalid_recipient_rejects_whole_batch() {
        let mut req = request();
        req.emails[1] = "not-an-email".to_string();
        assert!(matches!(
            build_jobs(&req, Utc::now(), DEFAULT_SENDER_NAME),
            Err(QueueError::Validation(m)) if m.contains("not-an-email")
        ));
    }

    #[test]
    fn test_deserializes_form_and_long_field_names() {
        let form: BatchRequest = serde_json::from_value(serde_json::json!({
            "senderEmail": "me@example.com",
            "appPassword": "pw",
            "emails": ["a@x.com"],
            "names": ["A"],
            "subject": "s",
            "content": "c",
            "scheduledTime": null
        }))
        .unwrap();
        assert_eq!(form.app_password.as_deref(), Some("pw"));
        assert!(form.scheduled_time.is_none());

        let long: BatchRequest = serde_json::from_value(serde_json::json!({
            "senderIdentity": "me@example.com",
            "senderSecret": "pw",
            "recipientEmails": ["a@x.com"],
            "recipientNames": ["A"],
            "subject": "s",
            "bodyTemplate": "c",
            "scheduledAt": "2030-01-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(long.emails, vec!["a@x.com"]);
        assert_eq!(long.content, "c");
        assert!(long.scheduled_time.is_some());
    }

    #[test]
    fn test_debug_redacts_password() {
        assert!(!format!("{:?}", request()).contains("abcd efgh"));
    }

    #[test]
    fn test_schedule_accepts_rfc3339_and_local_form_values() {
        assert_eq!(
            parse_schedule("2030-10-18T10:30:00+02:00").unwrap().to_rfc3339(),
            "2030-10-18T08:30:00+00:00"
        );

        let naive = NaiveDate::from_ymd_opt(2030, 10, 18)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_schedule("2030-10-18T10:30").unwrap(), expected);
        assert_eq!(parse_schedule("2030-10-18T10:30:00").unwrap(), expected);

        assert!(parse_schedule("next tuesday").is_err());
    }

    #[test]
    fn test_blank_schedule_means_now() {
        let req: BatchRequest = serde_json::from_str(r#"{"scheduledTime": ""}"#).unwrap();
        assert!(req.scheduled_time.is_none());
        let req: BatchRequest = serde_json::from_str(r#"{"scheduledTime": null}"#).unwrap();
        assert!(req.scheduled_time.is_none());
        let req: BatchRequest =
            serde_json::from_str(r#"{"scheduledAt": "2030-10-18T10:30"}"#).unwrap();
        assert!(req.scheduled_time.is_some());
    }
}
