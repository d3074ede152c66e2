//! Error types for session creation and command dispatch.
//!
//! Every [`DispatchError`] carries enough structure for the transport to
//! render a protocol-correct response: a W3C error code, an HTTP status, and
//! the offending parameter names where relevant. The engine never retries;
//! retry policy belongs to the client.

use std::fmt;
use std::time::Duration;

use serde_json::{Value, json};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use switchyard_extensions::{HttpVerb, InvocationError, PayloadError};

use crate::resolver::NegotiationAttempt;

/// W3C WebDriver error codes produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
pub enum ErrorCode {
    /// The request arguments are invalid.
    #[strum(serialize = "invalid argument")]
    InvalidArgument,
    /// The addressed session does not exist.
    #[strum(serialize = "invalid session id")]
    InvalidSessionId,
    /// No session could be created.
    #[strum(serialize = "session not created")]
    SessionNotCreated,
    /// No extension answers the route.
    #[strum(serialize = "unknown command")]
    UnknownCommand,
    /// Any other failure.
    #[strum(serialize = "unknown error")]
    UnknownError,
    /// The request timed out.
    #[strum(serialize = "timeout")]
    Timeout,
}

impl ErrorCode {
    /// HTTP status the W3C protocol assigns to the code.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::InvalidSessionId | Self::UnknownCommand => 404,
            Self::SessionNotCreated | Self::UnknownError | Self::Timeout => 500,
        }
    }

    /// Canonical protocol string, e.g. `invalid session id`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Why a queued request was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller cancelled the request.
    Cancelled,
    /// The request waited longer than the configured queue timeout.
    QueueTimeout {
        /// Time spent waiting.
        waited: Duration,
    },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled by the caller"),
            Self::QueueTimeout { waited } => {
                write!(f, "timed out after {}ms in the session queue", waited.as_millis())
            }
        }
    }
}

/// Errors surfaced while creating sessions and dispatching commands.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// No extension mounts the route and verb.
    #[error("unknown command: no extension handles {verb} {route}")]
    RouteNotFound {
        /// Request verb.
        verb: HttpVerb,
        /// Route template.
        route: String,
    },

    /// The addressed session does not exist or has been destroyed.
    #[error("invalid session id: session '{session_id}' does not exist")]
    SessionNotFound {
        /// Session identifier from the request.
        session_id: String,
    },

    /// No driver could serve the requested capabilities.
    #[error("session not created: {message}")]
    SessionNotCreated {
        /// Summary of the failure.
        message: String,
        /// Every `firstMatch` entry that was tried, for diagnostics.
        attempts: Vec<NegotiationAttempt>,
    },

    /// The request payload or backend result had the wrong shape.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The backend failed while running the command.
    #[error("{extension} failed to run '{command}': {source}")]
    BackendInvocation {
        /// Extension that raised the error.
        extension: String,
        /// Command being run.
        command: String,
        /// Error reported by the backend.
        #[source]
        source: InvocationError,
    },

    /// The request was abandoned while queued for its session.
    #[error("request for session '{session_id}' {reason}")]
    RequestCancelled {
        /// Session the request was queued for.
        session_id: String,
        /// Why it was abandoned.
        reason: CancelReason,
    },

    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl DispatchError {
    /// Creates a route not found error.
    #[must_use]
    pub fn route_not_found(verb: HttpVerb, route: impl Into<String>) -> Self {
        Self::RouteNotFound {
            verb,
            route: route.into(),
        }
    }

    /// Creates a session not found error.
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates a session not created error without negotiation attempts.
    #[must_use]
    pub fn session_not_created(message: impl Into<String>) -> Self {
        Self::SessionNotCreated {
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    /// Creates a backend invocation error.
    #[must_use]
    pub fn backend_invocation(
        extension: impl Into<String>,
        command: impl Into<String>,
        source: InvocationError,
    ) -> Self {
        Self::BackendInvocation {
            extension: extension.into(),
            command: command.into(),
            source,
        }
    }

    /// Creates a request cancelled error.
    #[must_use]
    pub fn request_cancelled(session_id: impl Into<String>, reason: CancelReason) -> Self {
        Self::RequestCancelled {
            session_id: session_id.into(),
            reason,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// W3C error code for the failure.
    ///
    /// Backend errors carrying a recognised protocol code keep it; the rest
    /// report `unknown error`.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::RouteNotFound { .. } => ErrorCode::UnknownCommand,
            Self::SessionNotFound { .. } => ErrorCode::InvalidSessionId,
            Self::SessionNotCreated { .. } => ErrorCode::SessionNotCreated,
            Self::Payload(PayloadError::InvalidResponseShape { .. }) => ErrorCode::UnknownError,
            Self::Payload(_) => ErrorCode::InvalidArgument,
            Self::BackendInvocation { source, .. } => source
                .code()
                .and_then(|code| code.parse().ok())
                .unwrap_or(ErrorCode::UnknownError),
            Self::RequestCancelled {
                reason: CancelReason::QueueTimeout { .. },
                ..
            } => ErrorCode::Timeout,
            Self::RequestCancelled { .. } | Self::Internal { .. } => ErrorCode::UnknownError,
        }
    }

    /// Protocol error string sent to the client.
    ///
    /// Backend-supplied codes are passed through verbatim even when the
    /// engine does not recognise them.
    #[must_use]
    pub fn protocol_error(&self) -> &str {
        match self {
            Self::BackendInvocation { source, .. } => source
                .code()
                .unwrap_or_else(|| ErrorCode::UnknownError.as_str()),
            _ => self.error_code().as_str(),
        }
    }

    /// HTTP status for the failure.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.error_code().http_status()
    }

    /// Names of the request parameters involved, when the failure concerns
    /// the payload.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        match self {
            Self::Payload(error) => error.parameter_names(),
            _ => Vec::new(),
        }
    }

    /// Renders the W3C error body: `{"value": {"error", "message",
    /// "stacktrace"}}`.
    #[must_use]
    pub fn to_response_body(&self) -> Value {
        json!({
            "value": {
                "error": self.protocol_error(),
                "message": self.to_string(),
                "stacktrace": "",
            }
        })
    }
}
