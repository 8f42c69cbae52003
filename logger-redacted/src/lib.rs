//! Logging for the RustCare ledger services.
//!
//! [`init_tracing`] installs the global `tracing` subscriber: an `EnvFilter`
//! (honouring `RUST_LOG`) plus a pretty or JSON `fmt` layer.
//! [`PiiRedactor`] masks patient email addresses and phone numbers before
//! they reach a log line.
//!
//! ```no_run
//! use logger_redacted::{init_tracing, LoggerConfig, PiiRedactor};
//!
//! init_tracing(&LoggerConfig::default()).ok();
//! let redactor = PiiRedactor::default();
//! tracing::info!(recipient = %redactor.redact("jane@example.com"), "Reminder sent");
//! ```

pub mod config;
pub mod redactor;

pub use config::*;
pub use redactor::*;

use thiserror::Error;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber. Fails if one is already installed.
///
/// # Errors
/// `Filter` for an unparsable default level, `Init` when a global
/// subscriber already exists.
pub fn init_tracing(config: &LoggerConfig) -> Result<(), LoggerError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.default_directives())?,
    };

    let installed = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_level(true),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            )
            .try_init(),
    };

    installed.map_err(|e| LoggerError::Init(e.to_string()))
}
