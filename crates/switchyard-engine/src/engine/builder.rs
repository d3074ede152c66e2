//! Startup-time assembly of an [`Engine`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use switchyard_config::Config;
use switchyard_extensions::{ExtensionClass, MethodRegistry, RegistrationError, RouteListing};

use super::{Engine, SessionlessPlugin};
use crate::dispatch::{NoProxy, ProxyPolicy};
use crate::logger::{Logger, TracingLogger};
use crate::session::SessionTable;

/// Collects extensions and collaborators, then freezes them into an
/// [`Engine`].
///
/// Registration is the only mutable phase: once [`build`](Self::build) runs,
/// the method registry is shared read-only.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use switchyard_config::Config;
/// use switchyard_engine::{EngineBuilder, TracingLogger};
///
/// let engine = EngineBuilder::new(&Config::default())
///     .with_logger(Arc::new(TracingLogger::with_prefix("switchyard")))
///     .build();
/// assert_eq!(engine.session_count().expect("table readable"), 0);
/// ```
pub struct EngineBuilder {
    registry: MethodRegistry,
    logger: Arc<dyn Logger>,
    proxy: Arc<dyn ProxyPolicy>,
    protocol: String,
    new_command_timeout: Option<Duration>,
    command_queue_timeout: Option<Duration>,
}

impl EngineBuilder {
    /// Starts a builder configured from `config`, logging through
    /// [`TracingLogger`] and never proxying.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            registry: MethodRegistry::with_policy(config.route_override_policy()),
            logger: Arc::new(TracingLogger::new()),
            proxy: Arc::new(NoProxy),
            protocol: config.protocol().to_owned(),
            new_command_timeout: config.new_command_timeout(),
            command_queue_timeout: config.command_queue_timeout(),
        }
    }

    /// Injects the logger every component uses.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Injects the proxy policy.
    #[must_use]
    pub fn with_proxy_policy(mut self, policy: Arc<dyn ProxyPolicy>) -> Self {
        self.proxy = policy;
        self
    }

    /// Overrides the idle timeout after which sessions expire.
    #[must_use]
    pub const fn with_new_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.new_command_timeout = timeout;
        self
    }

    /// Overrides how long a request may wait for its session.
    #[must_use]
    pub const fn with_command_queue_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_queue_timeout = timeout;
        self
    }

    /// Registers a driver or plugin.
    ///
    /// # Errors
    ///
    /// Returns the [`RegistrationError`] raised by the method registry. The
    /// error is startup-fatal; nothing from the rejected extension is kept.
    pub fn register(&mut self, class: Arc<dyn ExtensionClass>) -> Result<(), RegistrationError> {
        let metadata = class.metadata();
        let label = format!(
            "{} {}@{}",
            metadata.extension_type(),
            metadata.name(),
            metadata.version()
        );
        match self.registry.register(class) {
            Ok(()) => {
                self.logger.info(&format!("registered {label}"));
                Ok(())
            }
            Err(error) => {
                self.logger.error(&format!("could not register {label}: {error}"));
                Err(error)
            }
        }
    }

    /// Routes mounted so far.
    #[must_use]
    pub fn list_routes(&self) -> Vec<RouteListing> {
        self.registry.list_routes()
    }

    /// Freezes the registry and returns the engine.
    #[must_use]
    pub fn build(self) -> Engine {
        let drivers: Vec<Arc<dyn ExtensionClass>> = self.registry.drivers().cloned().collect();
        let sessionless = self
            .registry
            .plugins()
            .map(|class| SessionlessPlugin {
                class: Arc::clone(class),
                instance: Mutex::new(None),
            })
            .collect();
        self.logger.debug(&format!(
            "engine ready with {} driver(s) and {} extension(s) in total",
            drivers.len(),
            self.registry.len()
        ));
        Engine {
            registry: Arc::new(self.registry),
            drivers,
            sessionless,
            sessions: SessionTable::default(),
            logger: self.logger,
            proxy: self.proxy,
            protocol: self.protocol,
            new_command_timeout: self.new_command_timeout,
            command_queue_timeout: self.command_queue_timeout,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
