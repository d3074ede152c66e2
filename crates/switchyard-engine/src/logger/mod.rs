//! Injected, leveled logging for the engine core.
//!
//! Core components never reach for a global logger: every [`Engine`] is built
//! with an `Arc<dyn Logger>` and logs only through it. [`TracingLogger`] is
//! the default adapter; it forwards records to `tracing`, which
//! [`telemetry::initialise`] wires to a subscriber once per process.
//!
//! [`Engine`]: crate::Engine
//! [`telemetry::initialise`]: crate::telemetry::initialise


use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use strum::{Display, EnumString};

use crate::dispatch::DispatchError;

/// Tracing target used by [`TracingLogger`].
pub const LOG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::engine");

/// Severity of a log record, from chattiest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    /// Very fine-grained tracing.
    Silly,
    /// Detailed progress.
    Verbose,
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Request and response traffic.
    Http,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    /// Every level, chattiest first.
    pub const ALL: [Self; 7] = [
        Self::Silly,
        Self::Verbose,
        Self::Debug,
        Self::Info,
        Self::Http,
        Self::Warn,
        Self::Error,
    ];
}

/// Leveled logger consumed by the engine.
///
/// Implementors supply [`Logger::log`]; the leveled helpers forward to it.
pub trait Logger: Send + Sync {
    /// Records `message` at `level`.
    fn log(&self, level: LogLevel, message: &str);

    /// Records a [`LogLevel::Silly`] message.
    fn silly(&self, message: &str) {
        self.log(LogLevel::Silly, message);
    }

    /// Records a [`LogLevel::Verbose`] message.
    fn verbose(&self, message: &str) {
        self.log(LogLevel::Verbose, message);
    }

    /// Records a [`LogLevel::Debug`] message.
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Records a [`LogLevel::Info`] message.
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Records a [`LogLevel::Http`] message.
    fn http(&self, message: &str) {
        self.log(LogLevel::Http, message);
    }

    /// Records a [`LogLevel::Warn`] message.
    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    /// Records a [`LogLevel::Error`] message.
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    /// Logs `error` at [`LogLevel::Error`] and hands it back for returning.
    ///
    /// ```
    /// use switchyard_engine::{DispatchError, Logger, TracingLogger};
    ///
    /// fn lookup(logger: &dyn Logger) -> Result<(), DispatchError> {
    ///     Err(logger.error_and_fail(DispatchError::session_not_found("abc")))
    /// }
    ///
    /// assert!(lookup(&TracingLogger::new()).is_err());
    /// ```
    fn error_and_fail(&self, error: DispatchError) -> DispatchError {
        self.error(&error.to_string());
        error
    }
}

impl<T> Logger for Arc<T>
where
    T: Logger + ?Sized,
{
    fn log(&self, level: LogLevel, message: &str) {
        (**self).log(level, message);
    }
}

/// Source of the prefix attached to each record.
#[derive(Clone)]
enum Prefix {
    Fixed(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

impl Prefix {
    fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Fixed(prefix) => Cow::Borrowed(prefix.as_str()),
            Self::Computed(prefix) => Cow::Owned(prefix()),
        }
    }
}

/// Default logger that records messages using `tracing`.
///
/// `silly` and `verbose` map to `TRACE`, `http` to `INFO`; the original level
/// name is kept in the `level_name` field. Records below the logger's own
/// [`level`](Self::level) are dropped before they reach `tracing`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use switchyard_engine::{LogLevel, TracingLogger};
///
/// let commands = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&commands);
/// let logger = TracingLogger::with_prefix_fn(move || {
///     format!("AndroidDriver@{}", counter.load(Ordering::Relaxed))
/// })
/// .with_level(LogLevel::Info);
///
/// commands.store(3, Ordering::Relaxed);
/// assert_eq!(logger.prefix().as_deref(), Some("AndroidDriver@3"));
/// assert_eq!(logger.level(), LogLevel::Info);
/// ```
#[derive(Clone)]
pub struct TracingLogger {
    prefix: Option<Prefix>,
    level: LogLevel,
}

impl TracingLogger {
    /// Builds a logger without a prefix that forwards every level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a logger whose records carry `prefix`, typically the name of
    /// the component or session they concern.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(Prefix::Fixed(prefix.into())),
            ..Self::default()
        }
    }

    /// Builds a logger whose prefix is recomputed for every record.
    #[must_use]
    pub fn with_prefix_fn<F>(prefix: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            prefix: Some(Prefix::Computed(Arc::new(prefix))),
            ..Self::default()
        }
    }

    /// Drops records less severe than `level`.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Current prefix, rendered now.
    #[must_use]
    pub fn prefix(&self) -> Option<String> {
        self.prefix.as_ref().map(|prefix| prefix.render().into_owned())
    }

    /// Least severe level forwarded to `tracing`.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }

    /// Every level this logger understands, chattiest first.
    #[must_use]
    pub const fn levels(&self) -> &'static [LogLevel] {
        &LogLevel::ALL
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self {
            prefix: None,
            level: LogLevel::Silly,
        }
    }
}

impl fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogger")
            .field("prefix", &self.prefix())
            .field("level", &self.level)
            .finish()
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        if level < self.level {
            return;
        }
        let rendered = self.prefix.as_ref().map(Prefix::render);
        let prefix = rendered.as_deref().unwrap_or_default();
        match level {
            LogLevel::Silly | LogLevel::Verbose => tracing::trace!(
                target: LOG_TARGET,
                level_name = %level,
                prefix,
                "{message}"
            ),
            LogLevel::Debug => tracing::debug!(
                target: LOG_TARGET,
                level_name = %level,
                prefix,
                "{message}"
            ),
            LogLevel::Info | LogLevel::Http => tracing::info!(
                target: LOG_TARGET,
                level_name = %level,
                prefix,
                "{message}"
            ),
            LogLevel::Warn => tracing::warn!(
                target: LOG_TARGET,
                level_name = %level,
                prefix,
                "{message}"
            ),
            LogLevel::Error => tracing::error!(
                target: LOG_TARGET,
                level_name = %level,
                prefix,
                "{message}"
            ),
        }
    }
}
