//! Job store trait and implementations.
//!
//! The store is the only shared mutable resource. Every mutation is a
//! compare-and-swap on one job's status, so two scheduler ticks (or two
//! processes sharing a backend) can race on the same due set without
//! double-dispatching: only one [`JobStore::try_claim`] wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::QueueError;
use crate::job::{DeliveryJob, JobId, JobStatus};

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub sent: usize,
    pub failed: usize,
    pub failed_missing_credentials: usize,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::InFlight => self.in_flight,
            JobStatus::Sent => self.sent,
            JobStatus::Failed => self.failed,
            JobStatus::FailedMissingCredentials => self.failed_missing_credentials,
        }
    }

    pub fn total(&self) -> usize {
        JobStatus::ALL.into_iter().map(|s| self.get(s)).sum()
    }

    fn bump(&mut self, status: JobStatus) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::InFlight => &mut self.in_flight,
            JobStatus::Sent => &mut self.sent,
            JobStatus::Failed => &mut self.failed,
            JobStatus::FailedMissingCredentials => &mut self.failed_missing_credentials,
        };
        *slot += 1;
    }
}

/// Durable collection of delivery jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert all jobs or none of them.
    async fn insert_many(&self, jobs: &[DeliveryJob]) -> Result<(), QueueError>;

    /// Jobs with `status = pending` and `scheduled_at <= now`, earliest first.
    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryJob>, QueueError>;

    /// Atomically move `id` from `from` to `to`.
    ///
    /// Returns `Ok(false)` when the job is no longer in `from` or the move
    /// is not a legal transition; the record is left untouched.
    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        last_error: Option<String>,
    ) -> Result<bool, QueueError>;

    /// Claim a due job for dispatch (`pending -> in_flight`).
    ///
    /// Exactly one concurrent caller gets `true` for a given job.
    async fn try_claim(&self, id: JobId) -> Result<bool, QueueError> {
        self.transition(id, JobStatus::Pending, JobStatus::InFlight, None)
            .await
    }

    /// Get a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>, QueueError>;

    /// All jobs in insertion order, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, QueueError>;

    /// Per-status totals.
    async fn count_by_status(&self) -> Result<StatusCounts, QueueError>;
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn insert_many(&self, jobs: &[DeliveryJob]) -> Result<(), QueueError> {
        (**self).insert_many(jobs).await
    }

    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryJob>, QueueError> {
        (**self).fetch_due(now).await
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        last_error: Option<String>,
    ) -> Result<bool, QueueError> {
        (**self).transition(id, from, to, last_error).await
    }

    async fn try_claim(&self, id: JobId) -> Result<bool, QueueError> {
        (**self).try_claim(id).await
    }

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>, QueueError> {
        (**self).get(id).await
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, QueueError> {
        (**self).list(status).await
    }

    async fn count_by_status(&self) -> Result<StatusCounts, QueueError> {
        (**self).count_by_status().await
    }
}

/// In-memory job table shared by both store implementations.
#[derive(Debug, Clone, Default)]
struct JobTable {
    jobs: HashMap<JobId, DeliveryJob>,
    /// Order of job IDs for maintaining insertion order.
    order: Vec<JobId>,
}

impl JobTable {
    fn from_jobs(jobs: Vec<DeliveryJob>) -> Self {
        let mut table = Self::default();
        for job in jobs {
            table.order.push(job.id);
            table.jobs.insert(job.id, job);
        }
        table
    }

    fn insert_many(&mut self, jobs: &[DeliveryJob]) -> Result<(), QueueError> {
        let mut seen = std::collections::HashSet::with_capacity(jobs.len());
        for job in jobs {
            if self.jobs.contains_key(&job.id) || !seen.insert(job.id) {
                return Err(QueueError::storage(format!("duplicate job id {}", job.id)));
            }
        }
        for job in jobs {
            self.order.push(job.id);
            self.jobs.insert(job.id, job.clone());
        }
        Ok(())
    }

    fn due(&self, now: DateTime<Utc>) -> Vec<DeliveryJob> {
        let mut due: Vec<DeliveryJob> = self
            .order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();
        // Stable: ties keep insertion order
        due.sort_by_key(|job| job.scheduled_at);
        due
    }

    fn transition(
        &mut self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        last_error: Option<String>,
    ) -> Result<bool, QueueError> {
        let job = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| QueueError::storage(format!("job {} not found", id)))?;

        if job.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        job.status = to;
        if last_error.is_some() {
            job.last_error = last_error;
        }
        Ok(true)
    }

    fn list(&self, status: Option<JobStatus>) -> Vec<DeliveryJob> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect()
    }

    fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            counts.bump(job.status);
        }
        counts
    }

    fn snapshot(&self) -> Vec<DeliveryJob> {
        self.list(None)
    }
}

/// Thread-safe in-memory job store.
///
/// Not durable; used for development, tests and single-process deployments
/// that accept losing queued jobs on restart.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    table: RwLock<JobTable>,
    /// If set, every operation fails with this message (for testing error paths).
    fail_with: RwLock<Option<String>>,
}

impl MemoryJobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every operation fail with a storage error.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.write() = Some(message.into());
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.fail_with.write() = None;
    }

    fn check(&self) -> Result<(), QueueError> {
        match &*self.fail_with.read() {
            Some(message) => Err(QueueError::storage(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert_many(&self, jobs: &[DeliveryJob]) -> Result<(), QueueError> {
        self.check()?;
        self.table.write().insert_many(jobs)
    }

    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryJob>, QueueError> {
        self.check()?;
        Ok(self.table.read().due(now))
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        last_error: Option<String>,
    ) -> Result<bool, QueueError> {
        self.check()?;
        self.table.write().transition(id, from, to, last_error)
    }

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>, QueueError> {
        self.check()?;
        Ok(self.table.read().jobs.get(&id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, QueueError> {
        self.check()?;
        Ok(self.table.read().list(status))
    }

    async fn count_by_status(&self) -> Result<StatusCounts, QueueError> {
        self.check()?;
        Ok(self.table.read().counts())
    }
}

/// Job store persisted as a JSON document.
///
/// Every mutation rewrites the file using write-to-temp-then-rename, with
/// the temp file synced before the rename, so a crash or power loss leaves
/// either the old or the new document, never a torn one. A mutation whose
/// write fails is rolled back in memory and reported as a storage error.
///
/// Jobs are never deleted, so each write costs O(total jobs ever queued)
/// and writes are serialized behind one lock. A tick over N due jobs does
/// up to 2N rewrites (claim plus terminal status). Suited to small and
/// medium queues; a larger deployment wants a row-level [`JobStore`].
#[derive(Debug)]
pub struct FileJobStore {
    path: PathBuf,
    table: tokio::sync::Mutex<JobTable>,
}

impl FileJobStore {
    /// Open (or create) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let table = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let jobs: Vec<DeliveryJob> = serde_json::from_slice(&bytes)?;
            tracing::info!(path = %path.display(), jobs = jobs.len(), "Loaded job store");
            JobTable::from_jobs(jobs)
        } else {
            JobTable::default()
        };

        Ok(Self {
            path,
            table: tokio::sync::Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jobs.json".to_string());
        self.path.with_file_name(format!(".tmp_{}", name))
    }

    async fn persist(&self, table: &JobTable) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec_pretty(&table.snapshot())?;
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }

    /// Apply `mutate` to the table and persist, rolling back if either fails.
    async fn mutate<T, F>(&self, mutate: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut JobTable) -> Result<T, QueueError>,
    {
        let mut table = self.table.lock().await;
        let before = table.clone();

        let value = mutate(&mut table)?;
        if let Err(e) = self.persist(&table).await {
            tracing::error!(path = %self.path.display(), error = %e, "Failed to persist job store");
            *table = before;
            return Err(e);
        }
        Ok(value)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn insert_many(&self, jobs: &[DeliveryJob]) -> Result<(), QueueError> {
        self.mutate(|table| table.insert_many(jobs)).await
    }

    async fn fetch_due(&self, now: DateTime<Utc>) -> Result<Vec<DeliveryJob>, QueueError> {
        Ok(self.table.lock().await.due(now))
    }

    async fn transition(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        last_error: Option<String>,
    ) -> Result<bool, QueueError> {
        let mut table = self.table.lock().await;
        let before = table.clone();

        let changed = table.transition(id, from, to, last_error)?;
        if changed {
            if let Err(e) = self.persist(&table).await {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to persist job store");
                *table = before;
                return Err(e);
            }
        }
        Ok(changed)
    }

    async fn get(&self, id: JobId) -> Result<Option<DeliveryJob>, QueueError> {
        Ok(self.table.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, QueueError> {
        Ok(self.table.lock().await.list(status))
    }

    async fn count_by_status(&self) -> Result<StatusCounts, QueueError> {
        Ok(self.table.lock().await.counts())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::fixtures::job;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_fetch_due() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let later = job("b@x.com", "B", now + Duration::minutes(5));
        let due = job("a@x.com", "A", now);
        store.insert_many(&[later.clone(), due.clone()]).await.unwrap();

        let fetched = store.fetch_due(now).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, due.id);

        let fetched = store.fetch_due(now + Duration::minutes(5)).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].id, due.id); // Earliest first
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let existing = job("a@x.com", "A", now);
        store.insert_many(&[existing.clone()]).await.unwrap();

        let batch = [job("b@x.com", "B", now), existing];
        assert!(store.insert_many(&batch).await.is_err());
        assert_eq!(store.count_by_status().await.unwrap().total(), 1);
    }

    #[tokio::test]
    async fn test_claim_only_once() {
        let store = MemoryJobStore::new();
        let job = job("a@x.com", "A", Utc::now());
        store.insert_many(&[job.clone()]).await.unwrap();

        assert!(store.try_claim(job.id).await.unwrap());
        assert!(!store.try_claim(job.id).await.unwrap());
        assert!(store.fetch_due(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let store = MemoryJobStore::new();
        let job = job("a@x.com", "A", Utc::now());
        let id = job.id;
        store.insert_many(&[job]).await.unwrap();

        assert!(store.try_claim(id).await.unwrap());
        assert!(store
            .transition(id, JobStatus::InFlight, JobStatus::Sent, None)
            .await
            .unwrap());

        for (from, to) in [
            (JobStatus::Sent, JobStatus::Pending),
            (JobStatus::Sent, JobStatus::Failed),
            (JobStatus::InFlight, JobStatus::Failed),
        ] {
            assert!(!store.transition(id, from, to, None).await.unwrap());
        }
        assert_eq!(store.get(id).await.unwrap().unwrap().status, JobStatus::Sent);
    }

    #[tokio::test]
    async fn test_transition_unknown_job_is_storage_error() {
        let store = MemoryJobStore::new();
        let result = store
            .transition(JobId::new(), JobStatus::Pending, JobStatus::InFlight, None)
            .await;
        assert!(matches!(result, Err(QueueError::Storage(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryJobStore::new();
        store.set_failure("connection reset");

        let err = store.fetch_due(Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        store.clear_failure();
        assert!(store.fetch_due(Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_and_counts() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let a = job("a@x.com", "A", now);
        let b = job("b@x.com", "B", now);
        store.insert_many(&[a.clone(), b.clone()]).await.unwrap();
        store
            .transition(a.id, JobStatus::Pending, JobStatus::FailedMissingCredentials, None)
            .await
            .unwrap();

        let pending = store.list(Some(JobStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed_missing_credentials, 1);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue").join("jobs.json");
        let job = job("a@x.com", "A", Utc::now());

        {
            let store = FileJobStore::open(&path).await.unwrap();
            store.insert_many(&[job.clone()]).await.unwrap();
            assert!(store.try_claim(job.id).await.unwrap());
            store
                .transition(
                    job.id,
                    JobStatus::InFlight,
                    JobStatus::Failed,
                    Some("535 auth".to_string()),
                )
                .await
                .unwrap();
        }

        let reopened = FileJobStore::open(&path).await.unwrap();
        let stored = reopened.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("535 auth"));
        assert_eq!(stored.sender_secret, "app-password");
        assert!(!dir.path().join("queue").join(".tmp_jobs.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_writes_only_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let job = job("a@x.com", "A", Utc::now());
        let store = FileJobStore::open(&path).await.unwrap();
        store.insert_many(&[job.clone()]).await.unwrap();
        assert!(store.try_claim(job.id).await.unwrap());

        let on_disk: Vec<DeliveryJob> =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk[0].status, JobStatus::InFlight);

        // A lost compare-and-swap must not touch the file.
        tokio::fs::remove_file(&path).await.unwrap();
        assert!(!store.try_claim(job.id).await.unwrap());
        assert!(!path.exists());

        store
            .transition(job.id, JobStatus::InFlight, JobStatus::Sent, None)
            .await
            .unwrap();
        let on_disk: Vec<DeliveryJob> =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk[0].status, JobStatus::Sent);
        assert!(!dir.path().join(".tmp_jobs.json").exists());
    }
}
