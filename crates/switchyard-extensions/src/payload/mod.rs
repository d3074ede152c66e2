//! Declarative payload rules for extension commands.
//!
//! A [`PayloadDescriptor`] states which parameters a command requires or
//! accepts, how the raw body is wrapped before resolution, how the result is
//! unwrapped afterwards, and which hooks validate or reshape the assembled
//! arguments. The [`pipeline`] module applies a descriptor to a request.

pub mod pipeline;


use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::extension::CommandArgs;

/// JSON object carrying named command parameters.
pub type JsonMap = Map<String, Value>;

/// Hook that checks the assembled parameters for a protocol.
pub type Validator = Arc<dyn Fn(&JsonMap, &str) -> ValidationOutcome + Send + Sync>;

/// Hook that turns the assembled parameters into the backend's arguments.
pub type ArgsBuilder = Arc<dyn Fn(JsonMap) -> CommandArgs + Send + Sync>;

/// Result of a payload validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The parameters are acceptable.
    Accepted,
    /// The parameters are rejected, optionally with a reason for the client.
    Rejected {
        /// Human-readable reason.
        reason: Option<String>,
    },
}

impl ValidationOutcome {
    /// Rejection carrying a reason.
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: Some(reason.into()),
        }
    }

    /// Rejection without a reason.
    #[must_use]
    pub const fn rejected_without_reason() -> Self {
        Self::Rejected { reason: None }
    }
}

/// Ordered alternatives of parameter names.
///
/// Each group is a set of names that must all be present together. With
/// several groups the first fully-present group is used, so
/// `one_of([["a", "b"], ["c"]])` reads "either `a` and `b`, or `c`".
///
/// # Example
///
/// ```
/// use switchyard_extensions::ParamGroups;
///
/// let flat = ParamGroups::all(["using", "value"]);
/// assert_eq!(flat.groups().len(), 1);
///
/// let either = ParamGroups::one_of([vec!["a", "b"], vec!["c"]]);
/// assert_eq!(either.groups().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamGroups(Vec<Vec<String>>);

impl ParamGroups {
    /// No parameters.
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// A single group whose names are all needed together.
    #[must_use]
    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: Vec<String> = names.into_iter().map(Into::into).collect();
        if group.is_empty() {
            Self::none()
        } else {
            Self(vec![group])
        }
    }

    /// Alternative groups, tried in order.
    #[must_use]
    pub fn one_of<G, I, S>(groups: G) -> Self
    where
        G: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            groups
                .into_iter()
                .map(|group| group.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    /// The groups in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.0
    }

    /// Returns `true` when no group is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every name across all groups.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flatten().map(String::as_str)
    }
}

/// Argument shape and transformation rules for one command.
///
/// # Example
///
/// ```
/// use switchyard_extensions::{ParamGroups, PayloadDescriptor, ValidationOutcome};
///
/// let descriptor = PayloadDescriptor::new()
///     .with_required(ParamGroups::all(["ms"]))
///     .with_validator(|params, _protocol| match params.get("ms").and_then(|v| v.as_u64()) {
///         Some(_) => ValidationOutcome::Accepted,
///         None => ValidationOutcome::rejected("'ms' must be a non-negative integer"),
///     });
/// assert!(descriptor.validate_shape().is_ok());
/// ```
#[derive(Clone, Default)]
pub struct PayloadDescriptor {
    wrap: Option<String>,
    unwrap: Option<String>,
    required: ParamGroups,
    optional: ParamGroups,
    validator: Option<Validator>,
    args_builder: Option<ArgsBuilder>,
}

impl PayloadDescriptor {
    /// Creates a descriptor that passes the body through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Nests the incoming body under `key` before resolving parameters.
    #[must_use]
    pub fn with_wrap(mut self, key: impl Into<String>) -> Self {
        self.wrap = Some(key.into());
        self
    }

    /// Extracts `key` from the backend result before returning it.
    #[must_use]
    pub fn with_unwrap(mut self, key: impl Into<String>) -> Self {
        self.unwrap = Some(key.into());
        self
    }

    /// Declares the required parameter groups.
    #[must_use]
    pub fn with_required(mut self, required: ParamGroups) -> Self {
        self.required = required;
        self
    }

    /// Declares the optional parameter groups.
    #[must_use]
    pub fn with_optional(mut self, optional: ParamGroups) -> Self {
        self.optional = optional;
        self
    }

    /// Installs a validator.
    #[must_use]
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&JsonMap, &str) -> ValidationOutcome + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Installs an argument builder.
    #[must_use]
    pub fn with_args_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(JsonMap) -> CommandArgs + Send + Sync + 'static,
    {
        self.args_builder = Some(Arc::new(builder));
        self
    }

    /// Wrap key, when declared.
    #[must_use]
    pub fn wrap(&self) -> Option<&str> {
        self.wrap.as_deref()
    }

    /// Unwrap key, when declared.
    #[must_use]
    pub fn unwrap(&self) -> Option<&str> {
        self.unwrap.as_deref()
    }

    /// Required parameter groups.
    #[must_use]
    pub const fn required(&self) -> &ParamGroups {
        &self.required
    }

    /// Optional parameter groups.
    #[must_use]
    pub const fn optional(&self) -> &ParamGroups {
        &self.optional
    }

    /// Validator hook, when installed.
    #[must_use]
    pub const fn validator(&self) -> Option<&Validator> {
        self.validator.as_ref()
    }

    /// Argument builder hook, when installed.
    #[must_use]
    pub const fn args_builder(&self) -> Option<&ArgsBuilder> {
        self.args_builder.as_ref()
    }

    /// Returns `true` when any required or optional name is declared.
    #[must_use]
    pub fn declares_params(&self) -> bool {
        !self.required.is_empty() || !self.optional.is_empty()
    }

    /// Checks the descriptor for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found: a blank wrap or
    /// unwrap key, an empty group, a blank name, or a name declared both
    /// required and optional.
    pub fn validate_shape(&self) -> Result<(), String> {
        for (label, key) in [("wrap", &self.wrap), ("unwrap", &self.unwrap)] {
            if key.as_deref().is_some_and(|k| k.trim().is_empty()) {
                return Err(format!("{label} key must not be blank"));
            }
        }
        for (label, groups) in [("required", &self.required), ("optional", &self.optional)] {
            if groups.groups().iter().any(Vec::is_empty) {
                return Err(format!("{label} parameters contain an empty group"));
            }
            if groups.names().any(|name| name.trim().is_empty()) {
                return Err(format!("{label} parameters contain a blank name"));
            }
        }
        let required: BTreeSet<&str> = self.required.names().collect();
        let overlap: Vec<&str> = self
            .optional
            .names()
            .filter(|name| required.contains(name))
            .collect();
        if overlap.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "parameters declared both required and optional: {}",
                overlap.join(", ")
            ))
        }
    }
}

impl fmt::Debug for PayloadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadDescriptor")
            .field("wrap", &self.wrap)
            .field("unwrap", &self.unwrap)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("validator", &self.validator.is_some())
            .field("args_builder", &self.args_builder.is_some())
            .finish()
    }
}
