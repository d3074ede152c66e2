use crate::logging::LogFormat;
use crate::policy::RouteOverridePolicy;

/// Default log filter expression used by the engine.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds a session may sit idle before it is expired.
pub const DEFAULT_NEW_COMMAND_TIMEOUT_SECS: u64 = 60;

/// Seconds a command may wait for its session to become free.
pub const DEFAULT_COMMAND_QUEUE_TIMEOUT_SECS: u64 = 300;

/// Protocol identifier handed to payload validators.
pub const DEFAULT_PROTOCOL: &str = "W3C";

/// Default log filter expression used by the engine.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default duplicate-route policy.
#[must_use]
pub const fn default_route_override_policy() -> RouteOverridePolicy {
    RouteOverridePolicy::Reject
}

/// Default idle timeout for sessions, in seconds.
#[must_use]
pub const fn default_new_command_timeout_secs() -> u64 {
    DEFAULT_NEW_COMMAND_TIMEOUT_SECS
}

/// Default queue timeout for commands, in seconds.
#[must_use]
pub const fn default_command_queue_timeout_secs() -> u64 {
    DEFAULT_COMMAND_QUEUE_TIMEOUT_SECS
}

/// Owned protocol identifier used by serde defaults.
#[must_use]
pub fn default_protocol_string() -> String {
    DEFAULT_PROTOCOL.to_owned()
}
