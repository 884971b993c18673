//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! The library itself only emits `tracing` events. Applications embedding it
//! (and the test suite) can install a subscriber with [`init_logging`].
//!
//! Priority for determining the filter:
//! 1. `level` argument (if provided)
//! 2. `PROCSIGNAL_LOG` environment variable (e.g. "debug", "procsignal=trace")
//! 3. default to `info`
//!
//! Logs go to STDERR.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted when no level is passed
pub const LOG_ENV: &str = "PROCSIGNAL_LOG";

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global logging subscriber.
///
/// Returns an error if a subscriber is already installed; callers that may
/// initialise more than once can ignore it.
pub fn init_logging(level: Option<&str>, format: LogFormat) -> Result<()> {
    let filter = build_filter(level)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

fn build_filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter: {}", directives)),
        None => Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}
