//! Environment configuration.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `EMAIL_PROVIDER` | `smtp` (`smtp`, `local`, `logger`, `logger_full`) |
//! | `SMTP_HOST` | `smtp.gmail.com` |
//! | `SMTP_PORT` | `465` |
//! | `SMTP_TLS` | `tls` (`tls`, `starttls`, `none`) |
//! | `SMTP_TIMEOUT_SECS` | `30` |
//! | `SCHEDULER_INTERVAL_SECS` | `60` |
//! | `SCHEDULER_MAX_CONCURRENT` | `16` |
//! | `SCHEDULER_SEND_TIMEOUT_SECS` | `60` |
//! | `SCHEDULER_ALLOW_OVERLAP` | `false` |
//! | `JOB_STORE_PATH` | unset (in-memory store) |
//! | `PORT` | `5000` |
//! | `DEFAULT_SENDER_NAME` | `Bulk Mailer` |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MailError, QueueError};
use crate::intake::DEFAULT_SENDER_NAME;
use crate::mailer::TransportFactory;
use crate::providers;
use crate::scheduler::SchedulerConfig;
use crate::storage::{FileJobStore, JobStore, MemoryJobStore};

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_tls: String,
    pub smtp_timeout: Duration,
    pub scheduler: SchedulerConfig,
    pub job_store_path: Option<PathBuf>,
    pub port: u16,
    pub default_sender_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "smtp".to_string(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 465,
            smtp_tls: "tls".to_string(),
            smtp_timeout: Duration::from_secs(30),
            scheduler: SchedulerConfig::default(),
            job_store_path: None,
            port: 5000,
            default_sender_name: DEFAULT_SENDER_NAME.to_string(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, MailError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            MailError::Configuration(format!("Invalid value for {}: {:?}", key, raw))
        }),
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, MailError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(MailError::Configuration(format!(
                "Invalid value for {}: {:?}",
                key, v
            ))),
        },
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MailError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let scheduler = SchedulerConfig {
            interval: Duration::from_secs(parse(
                "SCHEDULER_INTERVAL_SECS",
                non_empty("SCHEDULER_INTERVAL_SECS"),
                defaults.scheduler.interval.as_secs(),
            )?),
            max_concurrent_sends: parse(
                "SCHEDULER_MAX_CONCURRENT",
                non_empty("SCHEDULER_MAX_CONCURRENT"),
                defaults.scheduler.max_concurrent_sends,
            )?,
            send_timeout: Duration::from_secs(parse(
                "SCHEDULER_SEND_TIMEOUT_SECS",
                non_empty("SCHEDULER_SEND_TIMEOUT_SECS"),
                defaults.scheduler.send_timeout.as_secs(),
            )?),
            allow_overlap: parse_bool(
                "SCHEDULER_ALLOW_OVERLAP",
                non_empty("SCHEDULER_ALLOW_OVERLAP"),
            )?,
        };
        if scheduler.interval.is_zero() {
            return Err(MailError::Configuration(
                "SCHEDULER_INTERVAL_SECS must be greater than 0".into(),
            ));
        }
        if scheduler.max_concurrent_sends == 0 {
            return Err(MailError::Configuration(
                "SCHEDULER_MAX_CONCURRENT must be greater than 0".into(),
            ));
        }

        let config = Self {
            provider: non_empty("EMAIL_PROVIDER")
                .map(|p| p.trim().to_lowercase())
                .unwrap_or(defaults.provider),
            smtp_host: non_empty("SMTP_HOST")
                .map(|h| h.trim().to_string())
                .unwrap_or(defaults.smtp_host),
            smtp_port: parse("SMTP_PORT", non_empty("SMTP_PORT"), defaults.smtp_port)?,
            smtp_tls: non_empty("SMTP_TLS")
                .map(|t| t.trim().to_lowercase())
                .unwrap_or(defaults.smtp_tls),
            smtp_timeout: Duration::from_secs(parse(
                "SMTP_TIMEOUT_SECS",
                non_empty("SMTP_TIMEOUT_SECS"),
                defaults.smtp_timeout.as_secs(),
            )?),
            scheduler,
            job_store_path: non_empty("JOB_STORE_PATH").map(PathBuf::from),
            port: parse("PORT", non_empty("PORT"), defaults.port)?,
            default_sender_name: non_empty("DEFAULT_SENDER_NAME")
                .map(|n| n.trim().to_string())
                .unwrap_or(defaults.default_sender_name),
        };

        // Surface provider/TLS mistakes at startup rather than on the first tick.
        config.transport_factory()?;
        Ok(config)
    }

    /// Build the transport factory named by `EMAIL_PROVIDER`.
    pub fn transport_factory(&self) -> Result<Arc<dyn TransportFactory>, MailError> {
        match self.provider.as_str() {
            #[cfg(feature = "smtp")]
            "smtp" => {
                let tls: providers::TlsMode = self.smtp_tls.parse()?;
                Ok(Arc::new(
                    providers::SmtpTransportFactory::new(&self.smtp_host, self.smtp_port)
                        .tls(tls)
                        .timeout(self.smtp_timeout),
                ))
            }
            #[cfg(not(feature = "smtp"))]
            "smtp" => Err(MailError::Configuration(
                "EMAIL_PROVIDER=smtp but 'smtp' feature is not enabled. \
                Add `features = [\"smtp\"]` to Cargo.toml"
                    .into(),
            )),

            #[cfg(feature = "local")]
            "local" => Ok(Arc::new(providers::LocalMailer::new())),
            #[cfg(not(feature = "local"))]
            "local" => Err(MailError::Configuration(
                "EMAIL_PROVIDER=local but 'local' feature is not enabled. \
                Add `features = [\"local\"]` to Cargo.toml"
                    .into(),
            )),

            "logger" => Ok(Arc::new(providers::LoggerMailer::new())),
            "logger_full" => Ok(Arc::new(providers::LoggerMailer::full())),

            other => Err(MailError::Configuration(format!(
                "Unknown EMAIL_PROVIDER: {}. Valid providers are: smtp, local, logger, logger_full",
                other
            ))),
        }
    }

    /// Open the configured job store: file-backed when `JOB_STORE_PATH` is
    /// set, in-memory otherwise.
    pub async fn job_store(&self) -> Result<Arc<dyn JobStore>, QueueError> {
        match &self.job_store_path {
            Some(path) => Ok(Arc::new(FileJobStore::open(path).await?)),
            None => Ok(MemoryJobStore::shared()),
        }
    }
}
