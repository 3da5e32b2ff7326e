//! Periodic delivery of due jobs.
//!
//! Every tick selects pending jobs whose `scheduled_at` has passed, claims
//! each one (`pending -> in_flight`) and only then dispatches it. A job that
//! another tick already claimed is skipped, so overlapping ticks never send
//! the same job twice.
//!
//! ```rust,ignore
//! let scheduler = DeliveryScheduler::new(store, Arc::new(SmtpTransportFactory::gmail()))
//!     .with_config(SchedulerConfig::default());
//!
//! let handle = scheduler.start();
//! // ...
//! handle.shutdown().await;
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::error::{MailError, QueueError};
use crate::job::{DeliveryJob, JobStatus};
use crate::mailer::TransportFactory;
use crate::storage::JobStore;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between ticks (default: 60s).
    pub interval: Duration,
    /// Upper bound on sends running at once within a tick (default: 16).
    pub max_concurrent_sends: usize,
    /// Per-send deadline; an expired send marks the job failed (default: 60s).
    pub send_timeout: Duration,
    /// Start a new tick even while the previous one is still running.
    ///
    /// Off by default. Safe either way because jobs are claimed before
    /// dispatch.
    pub allow_overlap: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_concurrent_sends: 16,
            send_timeout: Duration::from_secs(60),
            allow_overlap: false,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Jobs the store reported as due.
    pub due: usize,
    /// Jobs this tick claimed and dispatched.
    pub claimed: usize,
    /// Due jobs not dispatched because the claim was lost or errored.
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    pub missing_credentials: usize,
    /// Dispatched jobs whose final status could not be recorded.
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    MissingCredentials,
}

impl Outcome {
    fn status(self) -> JobStatus {
        match self {
            Outcome::Sent => JobStatus::Sent,
            Outcome::Failed => JobStatus::Failed,
            Outcome::MissingCredentials => JobStatus::FailedMissingCredentials,
        }
    }
}

impl TickReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Sent => self.sent += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::MissingCredentials => self.missing_credentials += 1,
        }
    }
}

/// Dispatches due jobs through per-job transports.
#[derive(Clone)]
pub struct DeliveryScheduler {
    store: Arc<dyn JobStore>,
    transports: Arc<dyn TransportFactory>,
    config: SchedulerConfig,
}

impl DeliveryScheduler {
    pub fn new(store: Arc<dyn JobStore>, transports: Arc<dyn TransportFactory>) -> Self {
        Self {
            store,
            transports,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run one tick against the current time.
    pub async fn tick(&self) -> Result<TickReport, QueueError> {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as if the clock read `now`.
    ///
    /// Fails only when the due-job query fails. Per-job claim, send and
    /// status-write errors are logged and counted in the report.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, QueueError> {
        let span = tracing::info_span!(
            "bulkmail.tick",
            due = tracing::field::Empty,
            claimed = tracing::field::Empty
        );
        self.dispatch_due(now).instrument(span).await
    }

    async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<TickReport, QueueError> {
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();

        let due = self.store.fetch_due(now).await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        tracing::Span::current().record("due", due.len());
        if due.is_empty() {
            tracing::debug!("No jobs due");
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_sends.max(1)));
        let mut deliveries = JoinSet::new();

        for job in due {
            match self.store.try_claim(job.id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(job_id = %job.id, "Job already claimed, skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job, skipping");
                    report.skipped += 1;
                    continue;
                }
            }
            report.claimed += 1;

            let span = tracing::info_span!(
                "bulkmail.deliver",
                job_id = %job.id,
                recipient = %job.recipient_email,
                provider = self.transports.provider_name()
            );
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            deliveries.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    worker.deliver(job).await
                }
                .instrument(span),
            );
        }
        tracing::Span::current().record("claimed", report.claimed);

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Failed to record delivery outcome");
                    report.errors += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Delivery task aborted");
                    report.errors += 1;
                }
            }
        }

        #[cfg(feature = "metrics")]
        metrics::histogram!("bulkmail_tick_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        tracing::info!(
            due = report.due,
            claimed = report.claimed,
            sent = report.sent,
            failed = report.failed,
            missing_credentials = report.missing_credentials,
            "Tick complete"
        );
        Ok(report)
    }

    /// Send one claimed job and record its final status.
    async fn deliver(&self, job: DeliveryJob) -> Result<Outcome, QueueError> {
        let Some(credentials) = job.credentials() else {
            let reason = QueueError::Credential(job.id).to_string();
            tracing::warn!("Missing sender credentials");
            return self
                .finish(&job, Outcome::MissingCredentials, Some(reason))
                .await;
        };

        let email = job.compose();
        let result = match self.transports.transport(&credentials) {
            Ok(transport) => {
                match tokio::time::timeout(self.config.send_timeout, transport.deliver(&email))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(MailError::Timeout(self.config.send_timeout.as_secs())),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(delivery) => {
                tracing::info!(message_id = %delivery.message_id, "Email sent");
                self.finish(&job, Outcome::Sent, None).await
            }
            Err(e) => {
                tracing::warn!(error = %e, "Email delivery failed");
                self.finish(&job, Outcome::Failed, Some(e.to_string()))
                    .await
            }
        }
    }

    async fn finish(
        &self,
        job: &DeliveryJob,
        outcome: Outcome,
        last_error: Option<String>,
    ) -> Result<Outcome, QueueError> {
        let status = outcome.status();
        let moved = self
            .store
            .transition(job.id, JobStatus::InFlight, status, last_error)
            .await?;
        if !moved {
            return Err(QueueError::storage(format!(
                "job {} was not in_flight when marking {}",
                job.id, status
            )));
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("bulkmail_jobs_total", "status" => status.as_str()).increment(1);

        Ok(outcome)
    }

    async fn run_tick(&self) {
        if let Err(e) = self.tick().await {
            tracing::error!(error = %e, "Delivery tick failed");
        }
    }

    /// Tick every `interval` until `shutdown` turns true or its sender drops.
    ///
    /// A failed tick is logged and the loop carries on. Ticks run one at a
    /// time unless `allow_overlap` is set; a missed interval waits for the
    /// running tick instead of bursting. On shutdown the current tick is
    /// allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut overlapping = JoinSet::new();

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            provider = self.transports.provider_name(),
            allow_overlap = self.config.allow_overlap,
            "Delivery scheduler running"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.config.allow_overlap {
                        let scheduler = self.clone();
                        overlapping.spawn(async move { scheduler.run_tick().await });
                        while overlapping.try_join_next().is_some() {}
                    } else {
                        self.run_tick().await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        while overlapping.join_next().await.is_some() {}
        tracing::info!("Delivery scheduler stopped");
    }

    /// Spawn [`run`](Self::run) on the tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(receiver).await });
        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a scheduler started with [`DeliveryScheduler::start`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop ticking and wait for the running tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Delivery scheduler task failed");
        }
    }
}
