//! First-match capability negotiation.
//!
//! [`negotiate`] walks the client's `firstMatch` entries in order. Each entry
//! is merged with `alwaysMatch`; an entry whose keys collide is skipped and
//! recorded. Each merged set is offered to the drivers in registration order
//! and the first driver whose predicate accepts it wins. Ties are broken only
//! by entry order and registration order, so repeated calls with the same
//! inputs return the same result.
//!
//! The resolver is stateless and never sees plugins.


use std::fmt;
use std::sync::Arc;

use switchyard_extensions::{
    Capabilities, CapabilitySet, ExtensionClass, ExtensionType, is_standard_key, is_vendor_key,
};

/// The driver chosen for a new session.
#[derive(Clone)]
pub struct Negotiated {
    driver: Arc<dyn ExtensionClass>,
    capabilities: Capabilities,
    entry_index: usize,
}

impl Negotiated {
    /// Driver class that accepted the capabilities.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn ExtensionClass> {
        &self.driver
    }

    /// Merged capabilities the driver accepted.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Position of the winning `firstMatch` entry.
    #[must_use]
    pub const fn entry_index(&self) -> usize {
        self.entry_index
    }

    /// Splits the result into the driver and the merged capabilities.
    #[must_use]
    pub fn into_parts(self) -> (Arc<dyn ExtensionClass>, Capabilities) {
        (self.driver, self.capabilities)
    }
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("driver", &self.driver.metadata().name())
            .field("capabilities", &self.capabilities)
            .field("entry_index", &self.entry_index)
            .finish()
    }
}

/// What happened to one `firstMatch` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The entry redefined keys set by `alwaysMatch` and was skipped.
    Collision {
        /// Colliding capability names.
        keys: Vec<String>,
    },
    /// Every driver declined the merged capabilities.
    Declined {
        /// Drivers consulted, in registration order.
        drivers: Vec<String>,
    },
}

/// Diagnostic record for a failed `firstMatch` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationAttempt {
    /// Position of the entry in `firstMatch`.
    pub entry_index: usize,
    /// Outcome for that entry.
    pub outcome: AttemptOutcome,
}

impl fmt::Display for NegotiationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Collision { keys } => write!(
                f,
                "firstMatch[{}] collides with alwaysMatch on {}",
                self.entry_index,
                keys.join(", ")
            ),
            AttemptOutcome::Declined { drivers } if drivers.is_empty() => write!(
                f,
                "firstMatch[{}] had no driver to try",
                self.entry_index
            ),
            AttemptOutcome::Declined { drivers } => write!(
                f,
                "firstMatch[{}] was declined by {}",
                self.entry_index,
                drivers.join(", ")
            ),
        }
    }
}

/// Negotiation failed for every `firstMatch` entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no driver accepted the requested capabilities ({})", describe(.attempts))]
pub struct NegotiationFailure {
    attempts: Vec<NegotiationAttempt>,
}

impl NegotiationFailure {
    /// Every entry tried, in order.
    #[must_use]
    pub fn attempts(&self) -> &[NegotiationAttempt] {
        &self.attempts
    }

    /// Consumes the failure, returning the attempts.
    #[must_use]
    pub fn into_attempts(self) -> Vec<NegotiationAttempt> {
        self.attempts
    }
}

fn describe(attempts: &[NegotiationAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Selects the driver for a capability set.
///
/// Non-driver classes in `drivers` are ignored.
///
/// # Errors
///
/// Returns a [`NegotiationFailure`] listing every entry tried when no driver
/// accepts any merged entry.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use serde_json::json;
/// use switchyard_engine::resolver::negotiate;
/// use switchyard_extensions::{CapabilitySet, ExtensionClass};
///
/// let set = CapabilitySet::from_payload(&json!({"alwaysMatch": {"platformName": "iOS"}}))
///     .expect("valid capabilities");
/// let drivers: Vec<Arc<dyn ExtensionClass>> = Vec::new();
/// let failure = negotiate(&set, &drivers).expect_err("nothing registered");
/// assert_eq!(failure.attempts().len(), 1);
/// ```
pub fn negotiate(
    set: &CapabilitySet,
    drivers: &[Arc<dyn ExtensionClass>],
) -> Result<Negotiated, NegotiationFailure> {
    let candidates: Vec<&Arc<dyn ExtensionClass>> = drivers
        .iter()
        .filter(|class| class.metadata().extension_type() == ExtensionType::Driver)
        .collect();

    let mut attempts = Vec::new();
    for (entry_index, entry) in set.first_match().iter().enumerate() {
        let merged = match set.merge_entry(entry) {
            Ok(merged) => merged,
            Err(keys) => {
                attempts.push(NegotiationAttempt {
                    entry_index,
                    outcome: AttemptOutcome::Collision { keys },
                });
                continue;
            }
        };
        if let Some(driver) = candidates
            .iter()
            .find(|class| class.matches_capabilities(&merged))
        {
            return Ok(Negotiated {
                driver: Arc::clone(driver),
                capabilities: merged,
                entry_index,
            });
        }
        attempts.push(NegotiationAttempt {
            entry_index,
            outcome: AttemptOutcome::Declined {
                drivers: candidates
                    .iter()
                    .map(|class| class.metadata().name().to_owned())
                    .collect(),
            },
        });
    }
    Err(NegotiationFailure { attempts })
}

/// Capability names that are neither W3C standard nor vendor-prefixed.
///
/// Clients should prefix extension capabilities (`appium:deviceName`); the
/// engine warns about the rest.
#[must_use]
pub fn unprefixed_extension_keys(capabilities: &Capabilities) -> Vec<&str> {
    capabilities
        .iter()
        .map(|(key, _)| key.as_str())
        .filter(|key| !is_standard_key(key) && !is_vendor_key(key))
        .collect()
}
