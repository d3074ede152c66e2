//! Proxy decisions for in-session commands.
//!
//! Some drivers front a remote WebDriver endpoint and relay most commands to
//! it. The engine never forwards bytes itself: when the injected
//! [`ProxyPolicy`] names a target for a command, dispatch ends with a
//! [`ProxyDirective`] that the transport executes.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use switchyard_extensions::{Capabilities, HttpVerb};

/// Route parameter rewritten to the upstream session id.
pub const SESSION_ID_PARAM: &str = "sessionId";

/// Remote endpoint a command is relayed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyTarget {
    base_url: String,
    upstream_session_id: Option<String>,
}

impl ProxyTarget {
    /// Target at `base_url` that shares the local session id.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            upstream_session_id: None,
        }
    }

    /// Uses a different session id on the remote side.
    #[must_use]
    pub fn with_upstream_session(mut self, session_id: impl Into<String>) -> Self {
        self.upstream_session_id = Some(session_id.into());
        self
    }

    /// Base URL of the remote endpoint.
    #[must_use]
    pub const fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Session id on the remote side, when it differs from the local one.
    #[must_use]
    pub fn upstream_session_id(&self) -> Option<&str> {
        self.upstream_session_id.as_deref()
    }
}

/// Decides whether a command for a session is relayed.
///
/// Consulted only for commands whose method is not marked `never_proxy`.
pub trait ProxyPolicy: Send + Sync {
    /// Returns the relay target, or `None` to run the command locally.
    fn proxy_target(
        &self,
        session_id: &str,
        driver: &str,
        command: &str,
        capabilities: &Capabilities,
    ) -> Option<ProxyTarget>;
}

/// Policy that keeps every command local.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProxy;

impl ProxyPolicy for NoProxy {
    fn proxy_target(
        &self,
        _session_id: &str,
        _driver: &str,
        _command: &str,
        _capabilities: &Capabilities,
    ) -> Option<ProxyTarget> {
        None
    }
}

/// Instruction for the transport to relay a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyDirective {
    /// Remote endpoint.
    pub target: ProxyTarget,
    /// Verb to relay with.
    pub verb: HttpVerb,
    /// Concrete path with route parameters filled in.
    pub path: String,
    /// Body to relay.
    pub payload: Value,
}

/// Fills `:name` segments of `route` from `params`.
///
/// `:sessionId` takes `session_id`; unknown parameters are left in place.
///
/// ```
/// use std::collections::BTreeMap;
///
/// use switchyard_engine::dispatch::rewrite_path;
///
/// let params = BTreeMap::from([("elementId".to_owned(), "e-7".to_owned())]);
/// let path = rewrite_path("/session/:sessionId/element/:elementId/click", "up-1", &params);
/// assert_eq!(path, "/session/up-1/element/e-7/click");
/// ```
#[must_use]
pub fn rewrite_path(route: &str, session_id: &str, params: &BTreeMap<String, String>) -> String {
    route
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(SESSION_ID_PARAM) => session_id,
            Some(name) => params.get(name).map_or(segment, String::as_str),
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Points a top-level `sessionId` member of `payload` at `session_id`.
///
/// Bodies without that member are returned unchanged.
#[must_use]
pub fn rewrite_payload(mut payload: Value, session_id: &str) -> Value {
    if let Value::Object(members) = &mut payload {
        if let Some(value) = members.get_mut(SESSION_ID_PARAM) {
            *value = Value::String(session_id.to_owned());
        }
    }
    payload
}
