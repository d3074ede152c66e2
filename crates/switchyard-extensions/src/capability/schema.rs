//! Declarative capability constraints used as driver matching predicates.
//!
//! A [`CapabilitySchema`] lists the capabilities a driver understands and
//! what values it accepts. Matching follows W3C conventions: declared
//! constraints must hold, undeclared standard capabilities are accepted, and
//! undeclared extension capabilities (normally vendor-prefixed, such as
//! `appium:deviceName`) are ignored or rejected according to the schema's
//! [`VendorKeyPolicy`].

use serde_json::Value;
use thiserror::Error;

use super::Capabilities;

/// Capability names defined by the W3C WebDriver specification.
pub const STANDARD_CAPABILITIES: &[&str] = &[
    "acceptInsecureCerts",
    "browserName",
    "browserVersion",
    "pageLoadStrategy",
    "platformName",
    "proxy",
    "setWindowRect",
    "strictFileInteractability",
    "timeouts",
    "unhandledPromptBehavior",
    "webSocketUrl",
];

/// JSON type a capability value must have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueKind {
    /// Any JSON value.
    #[default]
    Any,
    /// A string.
    String,
    /// A boolean.
    Boolean,
    /// A number.
    Number,
    /// An object.
    Object,
    /// An array.
    Array,
}

impl ValueKind {
    fn admits(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Number => value.is_number(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any value",
            Self::String => "a string",
            Self::Boolean => "a boolean",
            Self::Number => "a number",
            Self::Object => "an object",
            Self::Array => "an array",
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treatment of non-standard keys a schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VendorKeyPolicy {
    /// Accept and ignore them.
    #[default]
    Ignore,
    /// Decline the capability set.
    Reject,
}

/// Rules for a single capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityConstraint {
    required: bool,
    kind: ValueKind,
    one_of: Vec<Value>,
}

impl CapabilityConstraint {
    /// The capability must be present.
    #[must_use]
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// The capability may be absent.
    #[must_use]
    pub fn optional() -> Self {
        Self::default()
    }

    /// Restricts the JSON type.
    #[must_use]
    pub const fn of_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Restricts the value to a list; strings compare case-insensitively.
    #[must_use]
    pub fn one_of<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.one_of = values.into_iter().collect();
        self
    }

    fn check(&self, key: &str, value: Option<&Value>) -> Result<(), CapabilityMismatch> {
        let Some(value) = value else {
            return if self.required {
                Err(CapabilityMismatch::Missing {
                    key: key.to_owned(),
                })
            } else {
                Ok(())
            };
        };
        if !self.kind.admits(value) {
            return Err(CapabilityMismatch::WrongKind {
                key: key.to_owned(),
                expected: self.kind,
            });
        }
        if !self.one_of.is_empty() && !self.one_of.iter().any(|allowed| same_value(allowed, value))
        {
            return Err(CapabilityMismatch::NotAllowed {
                key: key.to_owned(),
                value: value.clone(),
            });
        }
        Ok(())
    }
}

fn same_value(allowed: &Value, candidate: &Value) -> bool {
    match (allowed, candidate) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        _ => allowed == candidate,
    }
}

/// Why a capability set does not satisfy a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityMismatch {
    /// A required capability is absent.
    #[error("capability '{key}' is required")]
    Missing {
        /// Capability name.
        key: String,
    },
    /// A capability has the wrong JSON type.
    #[error("capability '{key}' must be {expected}")]
    WrongKind {
        /// Capability name.
        key: String,
        /// Type the schema expects.
        expected: ValueKind,
    },
    /// A capability value is outside the accepted list.
    #[error("capability '{key}' does not accept {value}")]
    NotAllowed {
        /// Capability name.
        key: String,
        /// Offending value.
        value: Value,
    },
    /// An undeclared non-standard capability was supplied.
    #[error("vendor capability '{key}' is not supported")]
    UndeclaredVendorKey {
        /// Capability name.
        key: String,
    },
}

/// Ordered set of capability constraints.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use switchyard_extensions::{
///     Capabilities, CapabilityConstraint, CapabilitySchema, ValueKind,
/// };
///
/// let schema = CapabilitySchema::new()
///     .with(
///         "platformName",
///         CapabilityConstraint::required().one_of([json!("Android")]),
///     )
///     .with(
///         "appium:automationName",
///         CapabilityConstraint::optional().of_kind(ValueKind::String),
///     );
///
/// let caps = Capabilities::new().with("platformName", json!("android"));
/// assert!(schema.matches(&caps));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySchema {
    constraints: Vec<(String, CapabilityConstraint)>,
    vendor_keys: VendorKeyPolicy,
}

impl CapabilitySchema {
    /// Empty schema accepting every capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a constraint, replacing any earlier one for the same key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, constraint: CapabilityConstraint) -> Self {
        let key = key.into();
        self.constraints.retain(|(existing, _)| *existing != key);
        self.constraints.push((key, constraint));
        self
    }

    /// Sets the undeclared vendor key policy.
    #[must_use]
    pub const fn with_vendor_keys(mut self, policy: VendorKeyPolicy) -> Self {
        self.vendor_keys = policy;
        self
    }

    /// Checks `capabilities`, reporting the first mismatch.
    ///
    /// # Errors
    ///
    /// Returns the first [`CapabilityMismatch`] found, constraints first in
    /// declaration order, then undeclared vendor keys in key order.
    pub fn evaluate(&self, capabilities: &Capabilities) -> Result<(), CapabilityMismatch> {
        for (key, constraint) in &self.constraints {
            constraint.check(key, capabilities.get(key))?;
        }
        if self.vendor_keys == VendorKeyPolicy::Reject {
            if let Some((key, _)) = capabilities
                .iter()
                .find(|(key, _)| !is_standard_key(key) && !self.declares(key))
            {
                return Err(CapabilityMismatch::UndeclaredVendorKey { key: key.clone() });
            }
        }
        Ok(())
    }

    /// Returns `true` when `capabilities` satisfies the schema.
    #[must_use]
    pub fn matches(&self, capabilities: &Capabilities) -> bool {
        self.evaluate(capabilities).is_ok()
    }

    fn declares(&self, key: &str) -> bool {
        self.constraints.iter().any(|(declared, _)| declared == key)
    }
}

/// Returns `true` for `vendor:name` style keys.
#[must_use]
pub fn is_vendor_key(key: &str) -> bool {
    key.contains(':')
}

/// Returns `true` for W3C standard capability names.
#[must_use]
pub fn is_standard_key(key: &str) -> bool {
    STANDARD_CAPABILITIES.contains(&key)
}
