//! Structured telemetry initialisation for processes embedding the engine.
//!
//! The engine itself only logs through its injected [`Logger`]; the default
//! [`TracingLogger`] emits `tracing` events, and this module installs the
//! subscriber that renders them.
//!
//! Every engine record is emitted under [`LOG_TARGET`], so the configured
//! `log_filter` can tune the engine apart from the embedding process: a
//! filter of `warn,switchyard-engine::engine=debug` keeps the host quiet while
//! showing session and routing detail. [`engine_directive`] builds that
//! directive from a [`LogLevel`]. The `level_name` field on each event keeps
//! the engine's own level, since `silly`, `verbose` and `http` have no
//! `tracing` equivalent.
//!
//! [`Logger`]: crate::Logger
//! [`TracingLogger`]: crate::TracingLogger

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use switchyard_config::{Config, LogFormat};

use crate::logger::{LOG_TARGET, LogLevel};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Filter directive that admits engine records at `level` and above.
///
/// ```rust
/// use switchyard_engine::{LogLevel, telemetry};
///
/// assert_eq!(
///     telemetry::engine_directive(LogLevel::Http),
///     "switchyard-engine::engine=info"
/// );
/// ```
#[must_use]
pub fn engine_directive(level: LogLevel) -> String {
    format!("{LOG_TARGET}={}", tracing_level(level))
}

const fn tracing_level(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Silly | LogLevel::Verbose => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info | LogLevel::Http => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

/// Installs the global tracing subscriber the first time it is called.
///
/// Later calls return a fresh [`TelemetryHandle`] without touching the
/// global state.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparseable filter and
/// [`TelemetryError::Subscriber`] when another subscriber is already
/// installed.
///
/// # Examples
///
/// ```rust
/// use switchyard_config::Config;
/// use switchyard_engine::telemetry;
///
/// # fn main() -> Result<(), switchyard_engine::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// drop(first);
/// drop(second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| install_subscriber(config))
        .map(|_| TelemetryHandle)
}

fn install_subscriber(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let builder = |filter: EnvFilter| {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_timer(fmt::time::UtcTime::rfc_3339())
    };

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.log_format() {
        LogFormat::Json => Box::new(builder(filter).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder(filter).compact().finish()),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
