//! Registration policies applied while the method registry is built.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Behaviour when an extension declares the same route and verb twice.
///
/// Duplicate registrations are a configuration error unless an operator
/// explicitly opts into letting the most recent declaration win.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RouteOverridePolicy {
    /// Reject the duplicate and abort startup.
    #[default]
    Reject,
    /// Replace the earlier declaration with the later one.
    LastWins,
}

impl RouteOverridePolicy {
    /// Returns `true` when a later declaration may replace an earlier one.
    #[must_use]
    pub const fn allows_override(self) -> bool {
        matches!(self, Self::LastWins)
    }
}

/// Errors encountered while parsing a [`RouteOverridePolicy`] from text.
pub type RouteOverridePolicyParseError = strum::ParseError;
