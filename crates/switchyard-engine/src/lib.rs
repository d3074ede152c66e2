//! Command routing and capability negotiation for Switchyard.
//!
//! The engine sits between a WebDriver-compatible transport and the loaded
//! extensions. It owns four responsibilities:
//!
//! - **Negotiation.** [`Engine::create_session`] parses a W3C capability
//!   payload and picks the first driver, in registration order, that accepts
//!   the first mergeable `firstMatch` entry (see [`resolver`]).
//! - **Routing.** [`Engine::dispatch`] resolves a route against plugins and
//!   then the session's driver, shapes the payload, and produces exactly one
//!   [`DispatchOutcome`] or [`DispatchError`].
//! - **Proxying.** An injected [`ProxyPolicy`] may turn a command into a
//!   [`ProxyDirective`] for the transport to relay. Commands marked
//!   `never_proxy` always run locally.
//! - **Serialisation.** Commands addressed to one session run strictly one
//!   at a time; different sessions proceed in parallel.
//!
//! Logging goes through an injected [`Logger`]; [`telemetry::initialise`]
//! installs the `tracing` subscriber behind the default [`TracingLogger`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::{Value, json};
//! use switchyard_config::Config;
//! use switchyard_engine::{CancellationToken, CommandRequest, EngineBuilder};
//! use switchyard_extensions::{
//!     Capabilities, CapabilityConstraint, CapabilitySchema, CommandArgs, ConstructorArgs,
//!     Extension, ExtensionClass, ExtensionMetadata, HttpVerb, InvocationError,
//!     MethodDescriptor, MethodMap,
//! };
//!
//! struct Browser {
//!     url: Value,
//! }
//!
//! impl Extension for Browser {
//!     fn execute(&mut self, command: &str, args: CommandArgs) -> Result<Value, InvocationError> {
//!         match command {
//!             "setUrl" => {
//!                 self.url = args.get("url").cloned().unwrap_or(Value::Null);
//!                 Ok(Value::Null)
//!             }
//!             "getUrl" => Ok(self.url.clone()),
//!             other => Err(InvocationError::new(format!("unsupported command {other}"))),
//!         }
//!     }
//! }
//!
//! struct BrowserDriver {
//!     metadata: ExtensionMetadata,
//!     schema: CapabilitySchema,
//! }
//!
//! impl ExtensionClass for BrowserDriver {
//!     fn metadata(&self) -> &ExtensionMetadata {
//!         &self.metadata
//!     }
//!     fn commands(&self) -> &[&str] {
//!         &["setUrl", "getUrl"]
//!     }
//!     fn method_map(&self) -> MethodMap {
//!         MethodMap::new()
//!             .with_route("/session/:sessionId/url", HttpVerb::Post, MethodDescriptor::new("setUrl"))
//!             .with_route("/session/:sessionId/url", HttpVerb::Get, MethodDescriptor::new("getUrl"))
//!     }
//!     fn matches_capabilities(&self, capabilities: &Capabilities) -> bool {
//!         self.schema.matches(capabilities)
//!     }
//!     fn instantiate(
//!         &self,
//!         _args: ConstructorArgs<'_>,
//!     ) -> Result<Box<dyn Extension>, InvocationError> {
//!         Ok(Box::new(Browser { url: Value::Null }))
//!     }
//! }
//!
//! let mut builder = EngineBuilder::new(&Config::default());
//! builder
//!     .register(Arc::new(BrowserDriver {
//!         metadata: ExtensionMetadata::driver("browser", "1.0.0"),
//!         schema: CapabilitySchema::new()
//!             .with("browserName", CapabilityConstraint::required().one_of([json!("chrome")])),
//!     }))
//!     .expect("driver registers");
//! let engine = builder.build();
//!
//! let session = engine
//!     .create_session(&json!({"capabilities": {"alwaysMatch": {"browserName": "chrome"}}}))
//!     .expect("driver accepts chrome");
//! let token = CancellationToken::new();
//! engine
//!     .dispatch(
//!         CommandRequest::new(HttpVerb::Post, "/session/:sessionId/url")
//!             .for_session(session.session_id.as_str())
//!             .with_body(json!({"url": "https://example.test"})),
//!         &token,
//!     )
//!     .expect("url set");
//! let outcome = engine
//!     .dispatch(
//!         CommandRequest::new(HttpVerb::Get, "/session/:sessionId/url")
//!             .for_session(session.session_id.as_str()),
//!         &token,
//!     )
//!     .expect("url read");
//! assert_eq!(outcome.value(), Some(&json!("https://example.test")));
//! ```

pub mod dispatch;
mod engine;
mod logger;
pub mod resolver;
mod session;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use self::dispatch::{
    CancelReason, CommandRequest, DELETE_SESSION_COMMAND, DispatchError, DispatchOutcome,
    ErrorCode, NoProxy, ProxyDirective, ProxyPolicy, ProxyTarget, SessionCreated,
};
pub use self::engine::{Engine, EngineBuilder};
pub use self::logger::{LOG_TARGET, LogLevel, Logger, TracingLogger};
pub use self::resolver::{AttemptOutcome, NegotiationAttempt, NegotiationFailure, Negotiated};
pub use self::session::CancellationToken;
pub use self::telemetry::{TelemetryError, TelemetryHandle};
