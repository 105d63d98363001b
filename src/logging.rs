//! Tracing setup for the `status-poller` binary and embedding applications.
//!
//! Logs always go to stderr so the transition log on stdout stays parseable.

use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Environment variable overriding the log filter (`info`, `status_poller=debug`, ...).
pub const LOG_ENV: &str = "STATUS_POLLER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed.
    Silent,
    /// Compact stderr output at `info`.
    Development,
    /// Verbose output with source locations at `debug`.
    Debug,
}

impl LoggingMode {
    /// Maps a `-v` count onto a mode.
    pub fn from_verbosity(verbose: u8) -> Self {
        match verbose {
            0 => LoggingMode::Silent,
            1 => LoggingMode::Development,
            _ => LoggingMode::Debug,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Installs the global subscriber for `mode`.
///
/// The filter is taken from `STATUS_POLLER_LOG`, then `RUST_LOG`, then the
/// mode's default level.
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .with(env_filter("info"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        LoggingMode::Debug => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(env_filter("debug"))
            .try_init()
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new(default_level))
}
