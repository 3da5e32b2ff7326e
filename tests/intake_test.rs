//! Batch intake tests.

use std::sync::Arc;

use bulkmail::{
    BatchIntake, BatchRequest, FileJobStore, JobStatus, JobStore, MemoryJobStore, QueueError,
};
use chrono::{Duration, TimeZone, Utc};

fn request(emails: &[&str], names: &[&str]) -> BatchRequest {
    BatchRequest {
        sender_name: None,
        sender_email: Some("me@example.com".to_string()),
        app_password: Some("abcd efgh ijkl mnop".to_string()),
        emails: emails.iter().map(|s| s.to_string()).collect(),
        names: names.iter().map(|s| s.to_string()).collect(),
        subject: "Launch".to_string(),
        content: "<p>Hi {name}</p>".to_string(),
        scheduled_time: None,
    }
}

#[tokio::test]
async fn queues_one_pending_job_per_recipient() {
    let store = MemoryJobStore::shared();
    let intake = BatchIntake::new(store.clone());

    let receipt = intake
        .submit(request(&["a@x.com", "b@x.com", "c@x.com"], &["A", "B", "C"]))
        .await
        .unwrap();

    assert_eq!(receipt.queued(), 3);
    let jobs = store.list(None).await.unwrap();
    assert_eq!(jobs.len(), 3);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    assert_eq!(
        jobs.iter().map(|j| j.id).collect::<Vec<_>>(),
        receipt.job_ids
    );
    assert_eq!(jobs[2].recipient_name, "C");
    assert_eq!(jobs[0].sender.name, "Bulk Mailer");
}

#[tokio::test]
async fn default_sender_name_is_configurable() {
    let store = MemoryJobStore::shared();
    let intake = BatchIntake::new(store.clone()).default_sender_name("Newsletter");

    intake.submit(request(&["a@x.com"], &["A"])).await.unwrap();

    assert_eq!(store.list(None).await.unwrap()[0].sender.name, "Newsletter");
}

#[tokio::test]
async fn scheduled_batch_is_not_due_until_its_time() {
    let store = MemoryJobStore::shared();
    let now = Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap();
    let mut req = request(&["a@x.com"], &["A"]);
    req.scheduled_time = Some(now + Duration::hours(1));

    BatchIntake::new(store.clone()).submit_at(req, now).await.unwrap();

    assert!(store.fetch_due(now).await.unwrap().is_empty());
    assert_eq!(
        store.fetch_due(now + Duration::hours(1)).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn validation_failure_writes_nothing() {
    let store = MemoryJobStore::shared();
    let intake = BatchIntake::new(store.clone());

    let err = intake
        .submit(request(&["a@x.com", "b@x.com"], &["A"]))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Error: Email count does not match Name count.");
    assert_eq!(err.http_status(), 400);
    assert_eq!(store.count_by_status().await.unwrap().total(), 0);
}

#[tokio::test]
async fn storage_failure_is_reported_and_writes_nothing() {
    let store = MemoryJobStore::shared();
    store.set_failure("disk full");
    let intake = BatchIntake::new(store.clone());

    let err = intake
        .submit(request(&["a@x.com", "b@x.com"], &["A", "B"]))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Storage(_)));
    assert_eq!(err.http_status(), 500);

    store.clear_failure();
    assert_eq!(store.count_by_status().await.unwrap().total(), 0);
}

#[tokio::test]
async fn file_store_keeps_batch_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");

    let receipt = {
        let store = Arc::new(FileJobStore::open(&path).await.unwrap());
        BatchIntake::new(store)
            .submit(request(&["a@x.com", "b@x.com"], &["A", "B"]))
            .await
            .unwrap()
    };

    let reopened = FileJobStore::open(&path).await.unwrap();
    for id in &receipt.job_ids {
        let job = reopened.get(*id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.sender_secret, "abcd efgh ijkl mnop");
    }
}
