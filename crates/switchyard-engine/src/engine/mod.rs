//! The dispatch engine: session creation, command routing, and session
//! lifecycle.
//!
//! Every request follows the same path: resolve the route, find the session,
//! shape the payload, then either hand back a [`ProxyDirective`] or run the
//! command locally through the plugin chain and the owning extension. Each
//! request ends in exactly one [`DispatchOutcome`] or [`DispatchError`].
//!
//! [`ProxyDirective`]: crate::dispatch::ProxyDirective

mod builder;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use switchyard_extensions::payload::pipeline::{build, unwrap_result};
use switchyard_extensions::{
    Capabilities, CapabilitySet, CommandArgs, ConstructorArgs, Extension, ExtensionClass,
    ExtensionType, HttpVerb, MethodDescriptor, MethodRegistry, PayloadDescriptor, RouteListing,
};

use crate::dispatch::{
    CommandRequest, DELETE_SESSION_COMMAND, DispatchError, DispatchOutcome, ProxyDirective,
    ProxyPolicy, SessionCreated, Stage, rewrite_path, rewrite_payload, run_chain,
};
use crate::logger::Logger;
use crate::resolver::{negotiate, unprefixed_extension_keys};
use crate::session::{
    CancellationToken, PluginInstance, SessionBackend, SessionSlot, SessionTable,
};

pub use self::builder::EngineBuilder;

/// A plugin instance serving session-less routes, started on first use.
struct SessionlessPlugin {
    class: Arc<dyn ExtensionClass>,
    instance: Mutex<Option<Box<dyn Extension>>>,
}

/// The extension that owns a route, and its method.
struct ResolvedRoute<'r> {
    extension: &'r str,
    extension_type: ExtensionType,
    method: &'r MethodDescriptor,
}

/// Routes commands to drivers and plugins and owns every live session.
///
/// `Engine` is `Send + Sync`; share it behind an `Arc` and call it from as
/// many request threads as needed. Commands for one session run one at a
/// time; commands for different sessions run concurrently.
pub struct Engine {
    registry: Arc<MethodRegistry>,
    drivers: Vec<Arc<dyn ExtensionClass>>,
    sessionless: Vec<SessionlessPlugin>,
    sessions: SessionTable,
    logger: Arc<dyn Logger>,
    proxy: Arc<dyn ProxyPolicy>,
    protocol: String,
    new_command_timeout: Option<Duration>,
    command_queue_timeout: Option<Duration>,
}

impl Engine {
    /// Read-only view of the method registry.
    #[must_use]
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Every mounted route, for the transport's router.
    #[must_use]
    pub fn list_routes(&self) -> Vec<RouteListing> {
        self.registry.list_routes()
    }

    /// Creates a session from a new-session payload.
    ///
    /// Negotiates a driver, constructs it and one instance of every plugin
    /// for the session, and records the session.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionNotCreated`] when the payload is
    /// malformed, no driver accepts any `firstMatch` entry, or an instance
    /// cannot be constructed.
    pub fn create_session(&self, payload: &Value) -> Result<SessionCreated, DispatchError> {
        let set = CapabilitySet::from_payload(payload).map_err(|error| {
            self.logger
                .error_and_fail(DispatchError::session_not_created(error.to_string()))
        })?;
        let negotiated = negotiate(&set, &self.drivers).map_err(|failure| {
            self.logger.error_and_fail(DispatchError::SessionNotCreated {
                message: failure.to_string(),
                attempts: failure.into_attempts(),
            })
        })?;
        let (driver_class, capabilities) = negotiated.into_parts();
        let driver_name = driver_class.metadata().name().to_owned();

        let unprefixed = unprefixed_extension_keys(&capabilities);
        if !unprefixed.is_empty() {
            self.logger.warn(&format!(
                "capabilities {} are neither standard nor vendor-prefixed; prefix them, \
                 e.g. 'appium:{}'",
                unprefixed.join(", "),
                unprefixed.first().copied().unwrap_or_default()
            ));
        }

        let session_id = Uuid::new_v4().to_string();
        let backend = self
            .instantiate_backend(&driver_class, &session_id, &capabilities)
            .map_err(|error| self.logger.error_and_fail(error))?;
        let slot = Arc::new(SessionSlot::new(
            session_id.clone(),
            Arc::clone(&driver_class),
            capabilities.clone(),
            backend,
        ));
        self.sessions.insert(slot)?;
        self.logger.info(&format!(
            "created session {session_id} with driver {driver_name}"
        ));
        Ok(SessionCreated {
            session_id,
            driver: driver_name,
            capabilities,
        })
    }

    /// Dispatches one command.
    ///
    /// `token` is honoured only while the request waits for its session.
    ///
    /// A driver's [`DELETE_SESSION_COMMAND`] runs through the plugin chain
    /// and the driver like any other command, is never proxied, and then
    /// destroys the session as [`delete_session`](Self::delete_session) does.
    ///
    /// [`DELETE_SESSION_COMMAND`]: crate::DELETE_SESSION_COMMAND
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] describing the failing step: route
    /// resolution, session lookup, payload shaping, queueing, or the backend
    /// itself.
    pub fn dispatch(
        &self,
        mut request: CommandRequest,
        token: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let verb = request.verb();
        let route = request.route().to_owned();
        self.logger.http(&format!("--> {verb} {route}"));
        let result = self.dispatch_request(&mut request, token);
        match &result {
            Ok(DispatchOutcome::Value { .. }) => self.logger.http(&format!("<-- {verb} {route}")),
            Ok(DispatchOutcome::Proxy { directive }) => self.logger.http(&format!(
                "<-- {verb} {route} proxied to {}{}",
                directive.target.base_url(),
                directive.path
            )),
            Err(_) => {}
        }
        result.map_err(|error| self.fail(error))
    }

    fn dispatch_request(
        &self,
        request: &mut CommandRequest,
        token: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let slot = match request.session_id() {
            Some(id) => Some(self.sessions.get(id)?.ok_or_else(|| self.missing_session(request, id))?),
            None => None,
        };
        let resolved = self.resolve_route(request, slot.as_deref())?;
        let command = resolved.method.command();
        self.logger.debug(&format!(
            "{} {} handled by {} {}.{command}",
            request.verb(),
            request.route(),
            resolved.extension_type,
            resolved.extension
        ));

        let default_payload = PayloadDescriptor::new();
        let payload = resolved.method.payload().unwrap_or(&default_payload);
        let body = request.take_body();

        let Some(slot) = slot else {
            let args = with_path_params(build(payload, body, &self.protocol)?, request);
            let value = self.run_sessionless(resolved.extension, command, args)?;
            return Ok(DispatchOutcome::Value {
                value: unwrap_result(payload, value)?,
            });
        };

        let target = if is_proxy_candidate(&resolved) {
            self.proxy
                .proxy_target(slot.id(), slot.driver_name(), command, slot.capabilities())
        } else {
            None
        };
        if let Some(target) = target {
            build(payload, body.clone(), &self.protocol)?;
            let session_id = target.upstream_session_id().unwrap_or_else(|| slot.id());
            let path = rewrite_path(request.route(), session_id, request.path_params());
            let payload = rewrite_payload(body, session_id);
            return Ok(DispatchOutcome::Proxy {
                directive: ProxyDirective {
                    target,
                    verb: request.verb(),
                    path,
                    payload,
                },
            });
        }

        let args = with_path_params(build(payload, body, &self.protocol)?, request);
        let mut lease = slot.acquire(token, self.command_queue_timeout)?;
        let result = invoke_in_session(lease.backend_mut()?, slot.driver_name(), &resolved, args);
        drop(lease);
        if is_session_termination(&resolved) {
            self.sessions.remove_slot(&slot)?;
            self.destroy(&slot)?;
        }
        Ok(DispatchOutcome::Value {
            value: unwrap_result(payload, result?)?,
        })
    }

    /// Destroys a session after any in-flight command finishes.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionNotFound`] for unknown ids.
    pub fn delete_session(&self, session_id: &str) -> Result<(), DispatchError> {
        let slot = self
            .sessions
            .remove(session_id)?
            .ok_or_else(|| self.fail(DispatchError::session_not_found(session_id)))?;
        self.destroy(&slot)
    }

    /// Closes a slot already removed from the table and terminates its
    /// instances.
    fn destroy(&self, slot: &SessionSlot) -> Result<(), DispatchError> {
        if let Some(backend) = slot.close()? {
            self.terminate(slot, backend);
        }
        self.logger.info(&format!("deleted session {}", slot.id()));
        Ok(())
    }

    /// Destroys every idle session unused for longer than the new-command
    /// timeout, returning their ids in sorted order.
    ///
    /// Sessions with a command in flight or queued are left alone. Nothing
    /// expires when the timeout is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if a lock is poisoned.
    pub fn expire_idle_sessions(&self) -> Result<Vec<String>, DispatchError> {
        let Some(timeout) = self.new_command_timeout else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        let mut expired = Vec::new();
        for slot in self.sessions.snapshot()? {
            if let Some(backend) = slot.close_if_idle(timeout, now)? {
                self.sessions.remove_slot(&slot)?;
                self.logger.warn(&format!(
                    "shutting down session {} after {}ms without a command",
                    slot.id(),
                    timeout.as_millis()
                ));
                self.terminate(&slot, backend);
                expired.push(slot.id().to_owned());
            }
        }
        expired.sort();
        Ok(expired)
    }

    /// Destroys every session and terminates session-less plugin instances.
    ///
    /// Returns the number of sessions destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if a lock is poisoned.
    pub fn shutdown(&self) -> Result<usize, DispatchError> {
        let mut destroyed = 0;
        for slot in self.sessions.snapshot()? {
            self.sessions.remove_slot(&slot)?;
            if let Some(backend) = slot.close()? {
                self.terminate(&slot, backend);
                destroyed += 1;
            }
        }
        for plugin in &self.sessionless {
            let mut instance = plugin
                .instance
                .lock()
                .map_err(|_| DispatchError::internal("plugin lock poisoned"))?;
            if let Some(mut running) = instance.take() {
                if let Err(error) = running.terminate() {
                    self.logger.warn(&format!(
                        "plugin {} failed to terminate: {error}",
                        plugin.class.metadata().name()
                    ));
                }
            }
        }
        self.logger
            .info(&format!("shut down; destroyed {destroyed} session(s)"));
        Ok(destroyed)
    }

    /// Negotiated capabilities of a live session.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionNotFound`] for unknown ids.
    pub fn session_capabilities(&self, session_id: &str) -> Result<Capabilities, DispatchError> {
        self.sessions
            .get(session_id)?
            .map(|slot| slot.capabilities().clone())
            .ok_or_else(|| DispatchError::session_not_found(session_id))
    }

    /// Number of live sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Internal`] if the session table lock is
    /// poisoned.
    pub fn session_count(&self) -> Result<usize, DispatchError> {
        self.sessions.len()
    }

    fn instantiate_backend(
        &self,
        driver: &Arc<dyn ExtensionClass>,
        session_id: &str,
        capabilities: &Capabilities,
    ) -> Result<SessionBackend, DispatchError> {
        let args = ConstructorArgs::for_session(session_id, capabilities);
        let driver_instance = driver.instantiate(args).map_err(|error| {
            DispatchError::session_not_created(format!(
                "driver {} could not be constructed: {error}",
                driver.metadata().name()
            ))
        })?;
        let mut backend = SessionBackend {
            driver: driver_instance,
            plugins: Vec::new(),
        };
        for plugin in &self.sessionless {
            match plugin.class.instantiate(args) {
                Ok(instance) => backend.plugins.push(PluginInstance {
                    class: Arc::clone(&plugin.class),
                    instance,
                }),
                Err(error) => {
                    for (extension, message) in backend.terminate(driver.metadata().name()) {
                        self.logger
                            .warn(&format!("{extension} failed to terminate: {message}"));
                    }
                    return Err(DispatchError::session_not_created(format!(
                        "plugin {} could not be constructed: {error}",
                        plugin.class.metadata().name()
                    )));
                }
            }
        }
        Ok(backend)
    }

    /// Plugins are consulted in registration order, then the session's
    /// driver. Session-less requests only reach plugins.
    fn resolve_route(
        &self,
        request: &CommandRequest,
        slot: Option<&SessionSlot>,
    ) -> Result<ResolvedRoute<'_>, DispatchError> {
        let (route, verb) = (request.route(), request.verb());
        let driver = slot.and_then(|slot| self.registry.get(slot.driver_name()));
        let owners = self
            .registry
            .plugins()
            .chain(driver)
            .map(|class| class.metadata());
        for metadata in owners {
            if let Some(method) = self.registry.lookup(metadata.name(), route, verb) {
                return Ok(ResolvedRoute {
                    extension: metadata.name(),
                    extension_type: metadata.extension_type(),
                    method,
                });
            }
        }
        Err(DispatchError::route_not_found(verb, route))
    }

    /// Error for a request naming a session that does not exist: unknown
    /// routes stay unknown, everything else is an invalid session.
    fn missing_session(&self, request: &CommandRequest, session_id: &str) -> DispatchError {
        if self.route_is_mounted(request.route(), request.verb()) {
            DispatchError::session_not_found(session_id)
        } else {
            DispatchError::route_not_found(request.verb(), request.route())
        }
    }

    fn route_is_mounted(&self, route: &str, verb: HttpVerb) -> bool {
        self.registry
            .drivers()
            .chain(self.registry.plugins())
            .any(|class| {
                self.registry
                    .lookup(class.metadata().name(), route, verb)
                    .is_some()
            })
    }

    fn run_sessionless(
        &self,
        extension: &str,
        command: &str,
        args: CommandArgs,
    ) -> Result<Value, DispatchError> {
        let plugin = self
            .sessionless
            .iter()
            .find(|plugin| plugin.class.metadata().name() == extension)
            .ok_or_else(|| DispatchError::internal(format!("plugin {extension} is not loaded")))?;
        let mut instance = plugin
            .instance
            .lock()
            .map_err(|_| DispatchError::internal("plugin lock poisoned"))?;
        if instance.is_none() {
            let started = plugin
                .class
                .instantiate(ConstructorArgs::sessionless())
                .map_err(|error| DispatchError::backend_invocation(extension, command, error))?;
            self.logger
                .debug(&format!("started session-less instance of plugin {extension}"));
            *instance = Some(started);
        }
        let Some(running) = instance.as_mut() else {
            return Err(DispatchError::internal(format!(
                "plugin {extension} has no instance"
            )));
        };
        running
            .execute(command, args)
            .map_err(|error| DispatchError::backend_invocation(extension, command, error))
    }

    fn terminate(&self, slot: &SessionSlot, backend: SessionBackend) {
        for (extension, message) in backend.terminate(slot.driver_name()) {
            self.logger.warn(&format!(
                "{extension} failed to terminate session {}: {message}",
                slot.id()
            ));
        }
    }

    /// Logs a failed request: client errors as warnings, server errors
    /// through [`Logger::error_and_fail`].
    fn fail(&self, error: DispatchError) -> DispatchError {
        if error.http_status() < 500 {
            self.logger.warn(&error.to_string());
            error
        } else {
            self.logger.error_and_fail(error)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("protocol", &self.protocol)
            .field("new_command_timeout", &self.new_command_timeout)
            .field("command_queue_timeout", &self.command_queue_timeout)
            .finish_non_exhaustive()
    }
}

/// Only driver commands may be relayed upstream. Plugin routes, methods
/// marked `never_proxy`, and session termination always run locally.
fn is_proxy_candidate(resolved: &ResolvedRoute<'_>) -> bool {
    resolved.extension_type == ExtensionType::Driver
        && !resolved.method.never_proxy()
        && !is_session_termination(resolved)
}

fn is_session_termination(resolved: &ResolvedRoute<'_>) -> bool {
    resolved.extension_type == ExtensionType::Driver
        && resolved.method.command() == DELETE_SESSION_COMMAND
}

/// Adds route parameters to the arguments without overriding body values.
fn with_path_params(mut args: CommandArgs, request: &CommandRequest) -> CommandArgs {
    for (name, value) in request.path_params() {
        if args.get(name).is_none() {
            args = args.with_named(name.clone(), Value::String(value.clone()));
        }
    }
    args
}

fn invoke_in_session(
    backend: &mut SessionBackend,
    driver_name: &str,
    resolved: &ResolvedRoute<'_>,
    args: CommandArgs,
) -> Result<Value, DispatchError> {
    let command = resolved.method.command();
    let SessionBackend { driver, plugins } = backend;
    let mut owner = match resolved.extension_type {
        ExtensionType::Driver => Some(Stage::new(driver_name, &mut **driver)),
        ExtensionType::Plugin => None,
    };
    let mut interceptors = Vec::new();
    for PluginInstance { class, instance } in plugins.iter_mut() {
        let name = class.metadata().name();
        if resolved.extension_type == ExtensionType::Plugin && name == resolved.extension {
            owner = Some(Stage::new(name, &mut **instance));
        } else if class.exposes(command) {
            interceptors.push(Stage::new(name, &mut **instance));
        }
    }
    let Some(mut owner) = owner else {
        return Err(DispatchError::internal(format!(
            "{} {} has no instance in this session",
            resolved.extension_type, resolved.extension
        )));
    };
    run_chain(&mut interceptors, &mut owner, command, args)
}
