//! Logging setup for applications using the SDK
//!
//! The SDK itself only emits `tracing` events. Binaries either install a
//! global subscriber with [`init_logging`], or build a [`Dispatch`] with
//! [`build_dispatch`] and hand it to a device through
//! [`SoundbarConfig::with_log_sink`](crate::SoundbarConfig::with_log_sink).

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output for development
    Development,
    /// Verbose diagnostics with thread ids and source locations
    Debug,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

/// Build a logging sink for `mode` without installing it.
///
/// Returns `None` for [`LoggingMode::Silent`].
///
/// # Environment Variables
///
/// - `SOUNDBAR_LOG_LEVEL`: filter directives, e.g. `soundbar_sdk=debug`
/// - `RUST_LOG`: used when `SOUNDBAR_LOG_LEVEL` is unset
pub fn build_dispatch(mode: LoggingMode) -> Result<Option<Dispatch>, LoggingError> {
    match mode {
        LoggingMode::Silent => Ok(None),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter);

            Ok(Some(Dispatch::new(subscriber)))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            let subscriber = Registry::default()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .pretty()
                        .with_thread_names(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter);

            Ok(Some(Dispatch::new(subscriber)))
        }
    }
}

/// Install the logging sink for `mode` as the global default.
///
/// ```rust,no_run
/// use soundbar_sdk::logging::{init_logging, LoggingMode};
///
/// init_logging(LoggingMode::Development)?;
/// # Ok::<(), soundbar_sdk::logging::LoggingError>(())
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    match build_dispatch(mode)? {
        Some(dispatch) => tracing::dispatcher::set_global_default(dispatch)
            .map_err(|e| LoggingError::TracingInit(e.to_string())),
        None => Ok(()),
    }
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directives = std::env::var("SOUNDBAR_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidFilter(format!("{}: {}", directives, e)))
}
