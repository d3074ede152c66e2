//! Request and outcome types exchanged with the transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchyard_extensions::{Capabilities, HttpVerb};

use super::proxy::ProxyDirective;

/// Command a driver maps to its session-termination route. Running it
/// through [`Engine::dispatch`](crate::Engine::dispatch) also destroys the
/// session.
pub const DELETE_SESSION_COMMAND: &str = "deleteSession";

/// One inbound command, already matched to a route template by the
/// transport.
///
/// The request mirrors what the transport's path router extracts: the
/// optional session id, the route template and verb, any other route
/// parameters, and the raw JSON body.
///
/// ```
/// use serde_json::json;
/// use switchyard_engine::CommandRequest;
/// use switchyard_extensions::HttpVerb;
///
/// let request = CommandRequest::new(HttpVerb::Post, "/session/:sessionId/url")
///     .for_session("abc")
///     .with_body(json!({"url": "https://example.test"}));
/// assert_eq!(request.session_id(), Some("abc"));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    session_id: Option<String>,
    route: String,
    verb: HttpVerb,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    path_params: BTreeMap<String, String>,
}

impl CommandRequest {
    /// Session-less request for `verb route` with an empty body.
    #[must_use]
    pub fn new(verb: HttpVerb, route: impl Into<String>) -> Self {
        Self {
            session_id: None,
            route: route.into(),
            verb,
            body: Value::Null,
            path_params: BTreeMap::new(),
        }
    }

    /// Addresses the request to a session.
    #[must_use]
    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Records a route parameter such as `elementId`.
    ///
    /// Parameters are passed to the command as named arguments and are used
    /// to fill in the path of a [`ProxyDirective`].
    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Session the request addresses.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Route template.
    #[must_use]
    pub const fn route(&self) -> &str {
        self.route.as_str()
    }

    /// Verb.
    #[must_use]
    pub const fn verb(&self) -> HttpVerb {
        self.verb
    }

    /// Raw body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Route parameters other than the session id.
    #[must_use]
    pub const fn path_params(&self) -> &BTreeMap<String, String> {
        &self.path_params
    }

    pub(crate) fn take_body(&mut self) -> Value {
        std::mem::take(&mut self.body)
    }
}

/// Terminal result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The command ran locally and produced a value.
    Value {
        /// Unwrapped backend result.
        value: Value,
    },
    /// The transport must relay the command.
    Proxy {
        /// Relay instruction.
        directive: ProxyDirective,
    },
}

impl DispatchOutcome {
    /// Returns the value of a locally run command.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Value { value } => Some(value),
            Self::Proxy { .. } => None,
        }
    }

    /// Returns the relay instruction of a proxied command.
    #[must_use]
    pub const fn directive(&self) -> Option<&ProxyDirective> {
        match self {
            Self::Value { .. } => None,
            Self::Proxy { directive } => Some(directive),
        }
    }
}

/// Result of a successful session creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    /// Identifier of the new session.
    pub session_id: String,
    /// Driver serving the session.
    #[serde(skip)]
    pub driver: String,
    /// Merged capabilities the driver accepted.
    pub capabilities: Capabilities,
}
