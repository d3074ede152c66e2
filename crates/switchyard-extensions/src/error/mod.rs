//! Domain errors raised while registering extensions, shaping command
//! payloads, and invoking extension instances.
//!
//! All errors use `thiserror`-derived types with structured context so the
//! engine can render protocol-correct responses without string matching.

use thiserror::Error;

use crate::method::HttpVerb;

/// An extension could not be registered.
///
/// Every variant is fatal at startup: the server must not come up with a
/// misconfigured extension.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The extension metadata failed validation.
    #[error("invalid registration: {message}")]
    InvalidMetadata {
        /// Description of the validation failure.
        message: String,
    },

    /// An extension with the same name is already registered.
    #[error("invalid registration: extension '{name}' is already registered")]
    DuplicateExtension {
        /// Name of the rejected extension.
        name: String,
    },

    /// A method names a command the extension's instances do not expose.
    #[error(
        "invalid registration: extension '{extension}' maps {verb} {route} to \
         '{command}', which its instances do not expose"
    )]
    UnknownCommand {
        /// Extension declaring the method.
        extension: String,
        /// Route template of the method.
        route: String,
        /// Verb of the method.
        verb: HttpVerb,
        /// Command name that could not be resolved.
        command: String,
    },

    /// The same route and verb were declared twice without an override policy.
    #[error("invalid registration: extension '{extension}' declares {verb} {route} more than once")]
    DuplicateRoute {
        /// Extension declaring the route.
        extension: String,
        /// Route template declared twice.
        route: String,
        /// Verb declared twice.
        verb: HttpVerb,
    },

    /// A payload descriptor is internally inconsistent.
    #[error("invalid registration: {verb} {route} of extension '{extension}': {message}")]
    InvalidPayload {
        /// Extension declaring the method.
        extension: String,
        /// Route template of the method.
        route: String,
        /// Verb of the method.
        verb: HttpVerb,
        /// Description of the inconsistency.
        message: String,
    },
}

/// A request payload or backend result did not have the declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// None of the required parameter groups was fully present.
    #[error("missing required parameters: expected {}", describe_groups(.missing))]
    MissingRequiredParameter {
        /// Every required group that was not satisfied.
        missing: Vec<Vec<String>>,
    },

    /// The descriptor's validator rejected the assembled arguments.
    #[error("parameter validation failed: {reason}")]
    ValidationFailed {
        /// Reason returned by the validator, or a generic description.
        reason: String,
    },

    /// The backend result lacked the key it should be unwrapped from.
    #[error("backend response is missing the '{key}' member")]
    InvalidResponseShape {
        /// Key the descriptor unwraps from.
        key: String,
    },

    /// The request body could not be interpreted as a parameter object.
    #[error("invalid request body: {message}")]
    InvalidBody {
        /// Description of the problem.
        message: String,
    },
}

impl PayloadError {
    /// Names of the parameters involved in the failure, for client
    /// diagnostics.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        match self {
            Self::MissingRequiredParameter { missing } => missing
                .iter()
                .flatten()
                .map(String::as_str)
                .collect(),
            Self::InvalidResponseShape { key } => vec![key.as_str()],
            Self::ValidationFailed { .. } | Self::InvalidBody { .. } => Vec::new(),
        }
    }
}

fn describe_groups(groups: &[Vec<String>]) -> String {
    groups
        .iter()
        .map(|group| format!("[{}]", group.join(", ")))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// A client-supplied capability payload is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid capabilities: {message}")]
pub struct CapabilityError {
    message: String,
}

impl CapabilityError {
    /// Creates an error with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable description of the problem.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// An extension instance failed while running a command.
///
/// The message and optional protocol error code are surfaced to the client
/// verbatim; the engine never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InvocationError {
    code: Option<String>,
    message: String,
}

impl InvocationError {
    /// Creates an error without a protocol error code.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error carrying a protocol error code such as
    /// `no such element`.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Protocol error code supplied by the backend, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Message supplied by the backend.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }
}
