//! Method descriptors and the per-extension method map.
//!
//! A [`MethodMap`] lists every route an extension answers, keyed by route
//! template and [`HttpVerb`]. Each entry is a [`MethodDescriptor`] naming the
//! instance command that handles it. Maps are plain declarations: duplicate
//! detection and command resolution happen when the map is handed to the
//! [`MethodRegistry`](crate::registry::MethodRegistry).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::payload::PayloadDescriptor;

/// Request verb a route is mounted under.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum HttpVerb {
    /// Read-only request.
    Get,
    /// Command carrying a body.
    Post,
    /// Destructive request.
    Delete,
    /// Replacement request.
    Put,
    /// Partial update.
    Patch,
}

/// One command an extension exposes on a route.
///
/// # Example
///
/// ```
/// use switchyard_extensions::{MethodDescriptor, ParamGroups, PayloadDescriptor};
///
/// let method = MethodDescriptor::new("setUrl")
///     .with_payload(PayloadDescriptor::new().with_required(ParamGroups::all(["url"])));
/// assert_eq!(method.command(), "setUrl");
/// assert!(!method.never_proxy());
/// ```
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    command: String,
    never_proxy: bool,
    payload: Option<PayloadDescriptor>,
}

impl MethodDescriptor {
    /// Creates a descriptor for `command` with no payload rules.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            never_proxy: false,
            payload: None,
        }
    }

    /// Keeps the command local even when the session is proxying.
    #[must_use]
    pub const fn with_never_proxy(mut self, never_proxy: bool) -> Self {
        self.never_proxy = never_proxy;
        self
    }

    /// Attaches payload rules.
    #[must_use]
    pub fn with_payload(mut self, payload: PayloadDescriptor) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Instance command that handles this method.
    #[must_use]
    pub const fn command(&self) -> &str {
        self.command.as_str()
    }

    /// Whether the command must never be proxied.
    #[must_use]
    pub const fn never_proxy(&self) -> bool {
        self.never_proxy
    }

    /// Payload rules, when declared.
    #[must_use]
    pub const fn payload(&self) -> Option<&PayloadDescriptor> {
        self.payload.as_ref()
    }
}

/// A single `route + verb → method` declaration.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    route: String,
    verb: HttpVerb,
    method: MethodDescriptor,
}

impl MethodEntry {
    /// Route template, e.g. `/session/:sessionId/url`.
    #[must_use]
    pub const fn route(&self) -> &str {
        self.route.as_str()
    }

    /// Verb the route is mounted under.
    #[must_use]
    pub const fn verb(&self) -> HttpVerb {
        self.verb
    }

    /// Method descriptor.
    #[must_use]
    pub const fn method(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Splits the declaration into its route, verb, and method.
    #[must_use]
    pub fn into_parts(self) -> (String, HttpVerb, MethodDescriptor) {
        (self.route, self.verb, self.method)
    }
}

/// Every route an extension declares, in declaration order.
///
/// # Example
///
/// ```
/// use switchyard_extensions::{HttpVerb, MethodDescriptor, MethodMap};
///
/// let map = MethodMap::new()
///     .with_route("/session/:sessionId/url", HttpVerb::Post, MethodDescriptor::new("setUrl"))
///     .with_route("/session/:sessionId/url", HttpVerb::Get, MethodDescriptor::new("getUrl"));
/// assert_eq!(map.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MethodMap {
    entries: Vec<MethodEntry>,
}

impl MethodMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a route.
    #[must_use]
    pub fn with_route(
        mut self,
        route: impl Into<String>,
        verb: HttpVerb,
        method: MethodDescriptor,
    ) -> Self {
        self.insert(route, verb, method);
        self
    }

    /// Declares a route in place.
    pub fn insert(&mut self, route: impl Into<String>, verb: HttpVerb, method: MethodDescriptor) {
        self.entries.push(MethodEntry {
            route: route.into(),
            verb,
            method,
        });
    }

    /// Iterates declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &MethodEntry> {
        self.entries.iter()
    }

    /// Number of declarations, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for MethodMap {
    type Item = MethodEntry;
    type IntoIter = std::vec::IntoIter<MethodEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
