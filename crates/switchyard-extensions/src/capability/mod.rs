//! W3C capability sets and the schema drivers match them against.
//!
//! Clients request a session with an `alwaysMatch` object and a list of
//! `firstMatch` alternatives. [`CapabilitySet`] parses that shape and merges
//! each alternative with `alwaysMatch`; [`CapabilitySchema`] is a declarative
//! predicate a driver can use to decide whether it serves a merged set.

pub mod schema;


use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityError;
use crate::payload::JsonMap;

pub use self::schema::{
    CapabilityConstraint, CapabilityMismatch, CapabilitySchema, STANDARD_CAPABILITIES, ValueKind,
    VendorKeyPolicy, is_standard_key, is_vendor_key,
};

/// A flat capability mapping.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use switchyard_extensions::Capabilities;
///
/// let caps = Capabilities::new().with("platformName", json!("Android"));
/// assert_eq!(caps.get("platformName"), Some(&json!("Android")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(JsonMap);

impl Capabilities {
    /// Empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a capability.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Looks up a capability.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` when `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates capabilities in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &JsonMap {
        &self.0
    }

    /// Renders the mapping as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<JsonMap> for Capabilities {
    fn from(map: JsonMap) -> Self {
        Self(map)
    }
}

/// The `alwaysMatch` / `firstMatch` structure a client submits.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use switchyard_extensions::CapabilitySet;
///
/// let set = CapabilitySet::from_payload(&json!({
///     "capabilities": {
///         "alwaysMatch": {"platformName": "iOS"},
///         "firstMatch": [{"appium:automationName": "XCUITest"}]
///     }
/// }))
/// .expect("valid capabilities");
/// let merged = set.merge_entry(&set.first_match()[0]).expect("no collision");
/// assert_eq!(merged.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilitySet {
    always_match: Capabilities,
    first_match: Vec<Capabilities>,
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::new(Capabilities::new(), Vec::new())
    }
}

impl CapabilitySet {
    /// Builds a set; an empty `first_match` becomes a single empty entry.
    #[must_use]
    pub fn new(always_match: Capabilities, first_match: Vec<Capabilities>) -> Self {
        let first_match = if first_match.is_empty() {
            vec![Capabilities::new()]
        } else {
            first_match
        };
        Self {
            always_match,
            first_match,
        }
    }

    /// Parses a new-session payload.
    ///
    /// Accepts either `{"capabilities": {...}}` or the bare
    /// `{"alwaysMatch": ..., "firstMatch": ...}` object. Missing or `null`
    /// members take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`CapabilityError`] when the payload or one of its members
    /// has the wrong JSON type, or the bare form carries unknown members.
    pub fn from_payload(payload: &Value) -> Result<Self, CapabilityError> {
        let outer = payload
            .as_object()
            .ok_or_else(|| CapabilityError::new("payload must be a JSON object"))?;
        let (object, strict) = match outer.get("capabilities") {
            Some(Value::Object(inner)) => (inner, false),
            Some(_) => return Err(CapabilityError::new("'capabilities' must be an object")),
            None => (outer, true),
        };
        if strict {
            if let Some(key) = object
                .keys()
                .find(|key| !matches!(key.as_str(), "alwaysMatch" | "firstMatch"))
            {
                return Err(CapabilityError::new(format!(
                    "unexpected member '{key}' in capabilities payload"
                )));
            }
        }

        let always_match = match object.get("alwaysMatch") {
            None | Some(Value::Null) => Capabilities::new(),
            Some(Value::Object(map)) => Capabilities::from(map.clone()),
            Some(_) => return Err(CapabilityError::new("'alwaysMatch' must be an object")),
        };
        let first_match = match object.get("firstMatch") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| match entry {
                    Value::Object(map) => Ok(Capabilities::from(map.clone())),
                    _ => Err(CapabilityError::new(format!(
                        "'firstMatch' entry {index} must be an object"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(CapabilityError::new("'firstMatch' must be an array")),
        };
        Ok(Self::new(always_match, first_match))
    }

    /// Capabilities every alternative shares.
    #[must_use]
    pub const fn always_match(&self) -> &Capabilities {
        &self.always_match
    }

    /// Alternatives, in client order; never empty.
    #[must_use]
    pub fn first_match(&self) -> &[Capabilities] {
        &self.first_match
    }

    /// Merges `alwaysMatch` with one alternative.
    ///
    /// # Errors
    ///
    /// Returns the colliding keys when the alternative redefines a key that
    /// `alwaysMatch` already sets.
    pub fn merge_entry(&self, entry: &Capabilities) -> Result<Capabilities, Vec<String>> {
        let collisions: Vec<String> = entry
            .iter()
            .filter(|(key, _)| self.always_match.contains_key(key))
            .map(|(key, _)| key.clone())
            .collect();
        if !collisions.is_empty() {
            return Err(collisions);
        }
        let mut merged = self.always_match.0.clone();
        merged.extend(entry.iter().map(|(key, value)| (key.clone(), value.clone())));
        Ok(Capabilities(merged))
    }
}
