//! # Bulkmail
//!
//! Queue personalized email batches and deliver them on schedule, each batch
//! sent through its own sender's mailbox credentials.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bulkmail::prelude::*;
//! use bulkmail::providers::SmtpTransportFactory;
//!
//! let store = MemoryJobStore::shared();
//! let intake = BatchIntake::new(store.clone());
//!
//! intake.submit(BatchRequest {
//!     sender_email: Some("me@gmail.com".into()),
//!     app_password: Some("abcd efgh ijkl mnop".into()),
//!     emails: vec!["a@x.com".into()],
//!     names: vec!["Ada".into()],
//!     subject: "Hello".into(),
//!     content: "<p>Hi {name}</p>".into(),
//!     ..Default::default()
//! }).await?;
//!
//! let handle = DeliveryScheduler::new(store, Arc::new(SmtpTransportFactory::gmail())).start();
//! ```
//!
//! ## Job lifecycle
//!
//! ```text
//! pending ──claim──> in_flight ──> sent
//!    │                   ├──────> failed
//!    │                   └──────> failed_missing_credentials
//! ```
//!
//! Terminal states are final; failed jobs are not retried.
//!
//! ## Credentials at rest
//!
//! Each job stores its sender's app password verbatim so the scheduler can
//! log in at send time. Anyone who can read the job store can read those
//! passwords. API responses and logs redact them; the store does not.
//!
//! ## Environment Variables
//!
//! See [`Config`] for the full table. The common ones:
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `EMAIL_PROVIDER` | `smtp` (default), `local`, `logger`, `logger_full` |
//! | `SMTP_HOST` / `SMTP_PORT` / `SMTP_TLS` | Outbound server (default `smtp.gmail.com:465`, implicit TLS) |
//! | `JOB_STORE_PATH` | JSON file for durable jobs (in-memory when unset) |
//! | `PORT` | HTTP port (default 5000) |
//!
//! ## Feature Flags
//!
//! - `smtp` - SMTP transport via lettre
//! - `local` - LocalMailer and test assertions
//! - `server` - axum intake server and the `bulkmail` binary
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bulkmail_jobs_submitted_total` | Counter | | Jobs accepted by intake |
//! | `bulkmail_jobs_total` | Counter | status | Jobs reaching a terminal status |
//! | `bulkmail_tick_duration_seconds` | Histogram | | Scheduler tick duration |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the bulkmail crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod config;
mod email;
mod error;
mod intake;
mod job;
mod mailer;
mod scheduler;
mod storage;
mod template;

pub mod providers;

#[cfg(feature = "local")]
pub mod testing;

#[cfg(feature = "server")]
pub mod server;

// Re-exports
pub use address::Address;
pub use config::Config;
pub use email::Email;
pub use error::{MailError, QueueError};
pub use intake::{build_jobs, submit_batch, BatchIntake, BatchReceipt, BatchRequest, DEFAULT_SENDER_NAME};
pub use job::{Credentials, DeliveryJob, JobId, JobStatus, SenderIdentity};
pub use mailer::{DeliveryResult, Mailer, TransportFactory};
pub use scheduler::{DeliveryScheduler, SchedulerConfig, SchedulerHandle, TickReport};
pub use storage::{FileJobStore, JobStore, MemoryJobStore, StatusCounts};
pub use template::{render, NAME_PLACEHOLDER};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        BatchIntake, BatchRequest, DeliveryJob, DeliveryScheduler, Email, JobId, JobStatus,
        JobStore, MailError, Mailer, MemoryJobStore, QueueError, SchedulerConfig,
        TransportFactory,
    };
}
