//! Transport implementations.
//!
//! Each provider implements both [`Mailer`](crate::Mailer) (one send) and
//! [`TransportFactory`](crate::TransportFactory) (one transport per job).
//!
//! | Provider | Feature Flag | Description |
//! |----------|-------------|-------------|
//! | [`SmtpTransportFactory`] | `smtp` | SMTP via lettre, per-sender login |
//! | [`LocalMailer`] | `local` | In-memory capture for dev/testing |
//! | [`LoggerMailer`] | (none) | Logs emails without sending |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpBuilder, SmtpMailer, SmtpTransportFactory, TlsMode};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::{LocalMailer, SentEmail};

mod logger;
pub use logger::LoggerMailer;
