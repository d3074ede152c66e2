//! Shared configuration for the Switchyard routing engine.
//!
//! The engine itself never discovers configuration files or parses command
//! lines; the hosting server does that and hands the resulting text (or a
//! ready [`Config`]) to the engine. This crate owns the typed record, its
//! defaults, and TOML decoding so every host agrees on the same keys.
//!
//! ```
//! use switchyard_config::{Config, LogFormat, RouteOverridePolicy};
//!
//! let config = Config::from_toml_str(
//!     "log_format = \"compact\"\nroute_override_policy = \"last_wins\"\n",
//! )
//! .expect("valid configuration");
//! assert_eq!(config.log_format(), LogFormat::Compact);
//! assert_eq!(config.route_override_policy(), RouteOverridePolicy::LastWins);
//! ```

mod defaults;
mod logging;
mod policy;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::defaults::{
    DEFAULT_COMMAND_QUEUE_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_NEW_COMMAND_TIMEOUT_SECS,
    DEFAULT_PROTOCOL, default_command_queue_timeout_secs, default_log_filter,
    default_log_filter_string, default_log_format, default_new_command_timeout_secs,
    default_protocol_string, default_route_override_policy,
};
pub use self::logging::{LogFormat, LogFormatParseError};
pub use self::policy::{RouteOverridePolicy, RouteOverridePolicyParseError};

/// Errors raised while decoding configuration text.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed or did not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration consumed by the engine and its telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `tracing` filter expression, e.g. `info` or `switchyard_engine=debug`.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format of the installed subscriber.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// What happens when an extension declares a route twice.
    #[serde(default = "default_route_override_policy")]
    pub route_override_policy: RouteOverridePolicy,
    /// Idle seconds after which a session is expired; `0` disables expiry.
    #[serde(default = "default_new_command_timeout_secs")]
    pub new_command_timeout_secs: u64,
    /// Seconds a queued command waits for its session; `0` waits forever.
    #[serde(default = "default_command_queue_timeout_secs")]
    pub command_queue_timeout_secs: u64,
    /// Protocol identifier passed to payload validators.
    #[serde(default = "default_protocol_string")]
    pub protocol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            route_override_policy: default_route_override_policy(),
            new_command_timeout_secs: default_new_command_timeout_secs(),
            command_queue_timeout_secs: default_command_queue_timeout_secs(),
            protocol: default_protocol_string(),
        }
    }
}

impl Config {
    /// Decodes a configuration from TOML text, applying defaults for any
    /// missing key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not valid TOML, holds
    /// an unknown key, or a value has the wrong type.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Returns the log filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns the duplicate-route policy.
    #[must_use]
    pub const fn route_override_policy(&self) -> RouteOverridePolicy {
        self.route_override_policy
    }

    /// Returns the session idle timeout, or `None` when expiry is disabled.
    #[must_use]
    pub const fn new_command_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.new_command_timeout_secs)
    }

    /// Returns the command queue timeout, or `None` to wait indefinitely.
    #[must_use]
    pub const fn command_queue_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.command_queue_timeout_secs)
    }

    /// Returns the protocol identifier given to payload validators.
    #[must_use]
    pub const fn protocol(&self) -> &str {
        self.protocol.as_str()
    }
}

const fn non_zero_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}
