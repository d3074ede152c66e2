//! Extension type system: the contracts every driver and plugin satisfies.
//!
//! An extension is described by two separate contracts that are registered
//! together as one value:
//!
//! - [`ExtensionClass`] is the type-level record: identity, the set of
//!   command names its instances expose, the method map, the static
//!   capability-matching predicate, and the constructor.
//! - [`Extension`] is the instance behaviour: executing commands,
//!   intercepting commands on their way to a driver, and terminating.
//!
//! The registry, resolver, and engine depend only on these traits, so new
//! backends are added by implementing them.


use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::Capabilities;
use crate::error::{InvocationError, RegistrationError};
use crate::method::MethodMap;
use crate::payload::JsonMap;

/// Category of an extension.
///
/// # Example
///
/// ```
/// use switchyard_extensions::ExtensionType;
///
/// assert_eq!(ExtensionType::Driver.as_str(), "driver");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionType {
    /// Automates a target platform and owns sessions.
    Driver,
    /// Wraps or augments driver behaviour without owning a session.
    Plugin,
}

impl ExtensionType {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Plugin => "plugin",
        }
    }
}

impl std::fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    name: String,
    version: String,
    extension_type: ExtensionType,
}

impl ExtensionMetadata {
    /// Creates a new metadata bundle.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        extension_type: ExtensionType,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extension_type,
        }
    }

    /// Shorthand for driver metadata.
    #[must_use]
    pub fn driver(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name, version, ExtensionType::Driver)
    }

    /// Shorthand for plugin metadata.
    #[must_use]
    pub fn plugin(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name, version, ExtensionType::Plugin)
    }

    /// Validates the metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidMetadata`] if the name is blank or
    /// contains whitespace, or the version is blank.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.name.trim().is_empty() {
            return Err(RegistrationError::InvalidMetadata {
                message: String::from("extension name must not be empty"),
            });
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(RegistrationError::InvalidMetadata {
                message: format!("extension name '{}' must not contain whitespace", self.name),
            });
        }
        if self.version.trim().is_empty() {
            return Err(RegistrationError::InvalidMetadata {
                message: format!("extension '{}' must declare a version", self.name),
            });
        }
        Ok(())
    }

    /// Returns the extension name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the extension version.
    #[must_use]
    pub const fn version(&self) -> &str {
        self.version.as_str()
    }

    /// Returns the extension category.
    #[must_use]
    pub const fn extension_type(&self) -> ExtensionType {
        self.extension_type
    }
}

/// Arguments a backend method receives.
///
/// Commands receive named parameters by default; an argument builder on the
/// payload descriptor may produce positional values instead (or as well).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandArgs {
    positional: Vec<Value>,
    named: JsonMap,
}

impl CommandArgs {
    /// Empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments made of named values only.
    #[must_use]
    pub fn from_named(named: JsonMap) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }

    /// Arguments made of positional values only.
    #[must_use]
    pub fn from_positional(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: JsonMap::new(),
        }
    }

    /// Appends a positional value.
    #[must_use]
    pub fn with_positional(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Sets a named value.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    /// Positional values in order.
    #[must_use]
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Named values.
    #[must_use]
    pub const fn named(&self) -> &JsonMap {
        &self.named
    }

    /// Looks up a named value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    /// Renders the arguments as a JSON body, as forwarded to a proxy target.
    ///
    /// Named values become object members; positional values, when present,
    /// are carried under `args`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = self.named.clone();
        if !self.positional.is_empty() {
            body.insert(String::from("args"), Value::Array(self.positional.clone()));
        }
        Value::Object(body)
    }
}

/// Construction context handed to [`ExtensionClass::instantiate`].
#[derive(Debug, Clone, Copy)]
pub struct ConstructorArgs<'a> {
    session_id: Option<&'a str>,
    capabilities: Option<&'a Capabilities>,
}

impl<'a> ConstructorArgs<'a> {
    /// Context for an instance bound to a session.
    #[must_use]
    pub const fn for_session(session_id: &'a str, capabilities: &'a Capabilities) -> Self {
        Self {
            session_id: Some(session_id),
            capabilities: Some(capabilities),
        }
    }

    /// Context for an instance that serves session-less routes.
    #[must_use]
    pub const fn sessionless() -> Self {
        Self {
            session_id: None,
            capabilities: None,
        }
    }

    /// Session the instance is created for.
    #[must_use]
    pub const fn session_id(&self) -> Option<&'a str> {
        self.session_id
    }

    /// Negotiated capabilities of that session.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&'a Capabilities> {
        self.capabilities
    }
}

/// Continuation handed to an interceptor; runs the rest of the chain.
pub struct Next<'a> {
    call: &'a mut dyn FnMut(CommandArgs) -> Result<Value, InvocationError>,
}

impl<'a> Next<'a> {
    /// Wraps the remainder of an interceptor chain.
    pub fn new(call: &'a mut dyn FnMut(CommandArgs) -> Result<Value, InvocationError>) -> Self {
        Self { call }
    }

    /// Runs the rest of the chain with `args`.
    ///
    /// # Errors
    ///
    /// Propagates the error of whichever interceptor or backend fails.
    pub fn run(self, args: CommandArgs) -> Result<Value, InvocationError> {
        (self.call)(args)
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Next")
    }
}

/// Instance behaviour of a driver or plugin.
///
/// Instances are not assumed to be thread-safe; the engine guarantees at
/// most one call at a time per session.
pub trait Extension: Send {
    /// Runs one of the commands this instance exposes.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] describing the backend failure.
    fn execute(&mut self, command: &str, args: CommandArgs) -> Result<Value, InvocationError>;

    /// Wraps a command that is ultimately handled elsewhere.
    ///
    /// Only called for commands the extension class declares. The default
    /// forwards to the rest of the chain untouched.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] raised here or further down the chain.
    fn intercept(
        &mut self,
        command: &str,
        args: CommandArgs,
        next: Next<'_>,
    ) -> Result<Value, InvocationError> {
        let _ = command;
        next.run(args)
    }

    /// Releases resources when the owning session ends.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] if cleanup fails; the session is
    /// removed regardless.
    fn terminate(&mut self) -> Result<(), InvocationError> {
        Ok(())
    }
}

/// Type-level record of an extension: identity, command set, routes,
/// capability predicate, and constructor.
pub trait ExtensionClass: Send + Sync {
    /// Identity of the extension.
    fn metadata(&self) -> &ExtensionMetadata;

    /// Every command name instances expose. Method maps may only reference
    /// these names.
    fn commands(&self) -> &[&str];

    /// Routes the extension answers.
    fn method_map(&self) -> MethodMap;

    /// Static predicate deciding whether a driver can serve the merged
    /// capabilities. Must be pure. Plugins keep the default.
    fn matches_capabilities(&self, capabilities: &Capabilities) -> bool {
        let _ = capabilities;
        false
    }

    /// Creates an instance.
    ///
    /// # Errors
    ///
    /// Returns an [`InvocationError`] when the instance cannot be built.
    fn instantiate(&self, args: ConstructorArgs<'_>) -> Result<Box<dyn Extension>, InvocationError>;

    /// Returns `true` when instances expose `command`.
    fn exposes(&self, command: &str) -> bool {
        self.commands().contains(&command)
    }
}
