//! Extension type system, method registry, and payload pipeline for
//! Switchyard.
//!
//! The `switchyard-extensions` crate defines everything the routing engine
//! needs to know about drivers and plugins without depending on any concrete
//! backend:
//!
//! - [`ExtensionClass`] and [`Extension`] are the type-level and instance
//!   contracts every driver and plugin implements.
//! - [`MethodMap`] and [`MethodDescriptor`] declare the routes an extension
//!   answers; [`MethodRegistry`] validates and stores them at startup.
//! - [`PayloadDescriptor`] describes a command's arguments, and the
//!   [`payload::pipeline`] module turns a request body into
//!   [`CommandArgs`] and a backend result into a response value.
//! - [`CapabilitySet`] parses W3C `alwaysMatch` / `firstMatch` capabilities,
//!   and [`CapabilitySchema`] gives drivers a declarative matching predicate.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use switchyard_extensions::payload::pipeline::build;
//! use switchyard_extensions::{
//!     HttpVerb, MethodDescriptor, MethodMap, ParamGroups, PayloadDescriptor,
//! };
//!
//! let map = MethodMap::new().with_route(
//!     "/session/:sessionId/url",
//!     HttpVerb::Post,
//!     MethodDescriptor::new("setUrl")
//!         .with_payload(PayloadDescriptor::new().with_required(ParamGroups::all(["url"]))),
//! );
//! let entry = map.iter().next().expect("one route");
//! let payload = entry.method().payload().expect("payload rules");
//! let args = build(payload, json!({"url": "https://example.test"}), "W3C")
//!     .expect("url is present");
//! assert_eq!(args.get("url"), Some(&json!("https://example.test")));
//! ```

pub mod capability;
pub mod error;
pub mod extension;
pub mod method;
pub mod payload;
pub mod registry;

#[cfg(test)]
mod tests;

pub use self::capability::{
    Capabilities, CapabilityConstraint, CapabilityMismatch, CapabilitySchema, CapabilitySet,
    ValueKind, VendorKeyPolicy, is_standard_key, is_vendor_key,
};
pub use self::error::{CapabilityError, InvocationError, PayloadError, RegistrationError};
pub use self::extension::{
    CommandArgs, ConstructorArgs, Extension, ExtensionClass, ExtensionMetadata, ExtensionType,
    Next,
};
pub use self::method::{HttpVerb, MethodDescriptor, MethodEntry, MethodMap};
pub use self::payload::{JsonMap, ParamGroups, PayloadDescriptor, ValidationOutcome};
pub use self::registry::{MethodRegistry, RouteListing};
