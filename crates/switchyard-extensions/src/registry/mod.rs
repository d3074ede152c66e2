//! Method registry mapping extensions to their routes.
//!
//! The [`MethodRegistry`] stores every loaded extension in registration
//! order together with its validated routes, keyed
//! `extension → route → verb`. It is built once at startup; afterwards it is
//! only read, so it can be shared behind an `Arc` without locking.
//!
//! Registration rejects an extension outright when any of its methods names
//! a command its instances do not expose, when a payload descriptor is
//! inconsistent, or when a route and verb are declared twice and the
//! [`RouteOverridePolicy`] does not allow the later declaration to win.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

use switchyard_config::RouteOverridePolicy;

use crate::error::RegistrationError;
use crate::extension::{ExtensionClass, ExtensionType};
use crate::method::{HttpVerb, MethodDescriptor};

type RouteTable = BTreeMap<String, BTreeMap<HttpVerb, MethodDescriptor>>;

struct RegisteredExtension {
    class: Arc<dyn ExtensionClass>,
    routes: RouteTable,
}

/// One mounted route, as reported by [`MethodRegistry::list_routes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteListing {
    /// Extension answering the route.
    pub extension: String,
    /// Category of that extension.
    pub extension_type: ExtensionType,
    /// Route template.
    pub route: String,
    /// Verb.
    pub verb: HttpVerb,
    /// Instance command handling the route.
    pub command: String,
}

/// Registry of extensions and their methods.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use serde_json::Value;
/// use switchyard_extensions::{
///     CommandArgs, ConstructorArgs, Extension, ExtensionClass, ExtensionMetadata, HttpVerb,
///     InvocationError, MethodDescriptor, MethodMap, MethodRegistry,
/// };
///
/// struct Echo;
///
/// impl Extension for Echo {
///     fn execute(&mut self, _command: &str, args: CommandArgs) -> Result<Value, InvocationError> {
///         Ok(args.to_json())
///     }
/// }
///
/// struct EchoClass(ExtensionMetadata);
///
/// impl ExtensionClass for EchoClass {
///     fn metadata(&self) -> &ExtensionMetadata {
///         &self.0
///     }
///     fn commands(&self) -> &[&str] {
///         &["echo"]
///     }
///     fn method_map(&self) -> MethodMap {
///         MethodMap::new().with_route(
///             "/session/:sessionId/echo",
///             HttpVerb::Post,
///             MethodDescriptor::new("echo"),
///         )
///     }
///     fn instantiate(
///         &self,
///         _args: ConstructorArgs<'_>,
///     ) -> Result<Box<dyn Extension>, InvocationError> {
///         Ok(Box::new(Echo))
///     }
/// }
///
/// let mut registry = MethodRegistry::new();
/// registry
///     .register(Arc::new(EchoClass(ExtensionMetadata::driver("echo", "1.0.0"))))
///     .expect("registration succeeds");
/// let method = registry
///     .lookup("echo", "/session/:sessionId/echo", HttpVerb::Post)
///     .expect("route is mounted");
/// assert_eq!(method.command(), "echo");
/// ```
#[derive(Default)]
pub struct MethodRegistry {
    policy: RouteOverridePolicy,
    extensions: Vec<RegisteredExtension>,
}

impl MethodRegistry {
    /// Creates an empty registry that rejects duplicate routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry with an explicit duplicate-route policy.
    #[must_use]
    pub fn with_policy(policy: RouteOverridePolicy) -> Self {
        Self {
            policy,
            extensions: Vec::new(),
        }
    }

    /// Validates and registers an extension.
    ///
    /// Nothing is registered when any check fails.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if the metadata is invalid, the name
    /// is taken, a method names an unexposed command, a payload descriptor
    /// is inconsistent, or a route is declared twice without
    /// [`RouteOverridePolicy::LastWins`].
    pub fn register(&mut self, class: Arc<dyn ExtensionClass>) -> Result<(), RegistrationError> {
        let metadata = class.metadata();
        metadata.validate()?;
        let name = metadata.name();
        if self.get(name).is_some() {
            return Err(RegistrationError::DuplicateExtension {
                name: name.to_owned(),
            });
        }

        let mut routes = RouteTable::new();
        for entry in class.method_map() {
            let (route, verb, method) = entry.into_parts();
            if !class.exposes(method.command()) {
                return Err(RegistrationError::UnknownCommand {
                    extension: name.to_owned(),
                    route,
                    verb,
                    command: method.command().to_owned(),
                });
            }
            if let Some(payload) = method.payload() {
                payload
                    .validate_shape()
                    .map_err(|message| RegistrationError::InvalidPayload {
                        extension: name.to_owned(),
                        route: route.clone(),
                        verb,
                        message,
                    })?;
            }
            match routes.entry(route.clone()).or_default().entry(verb) {
                Entry::Vacant(slot) => {
                    slot.insert(method);
                }
                Entry::Occupied(mut slot) if self.policy.allows_override() => {
                    slot.insert(method);
                }
                Entry::Occupied(_) => {
                    return Err(RegistrationError::DuplicateRoute {
                        extension: name.to_owned(),
                        route,
                        verb,
                    });
                }
            }
        }

        self.extensions.push(RegisteredExtension { class, routes });
        Ok(())
    }

    /// Looks up the method an extension mounts on `route` and `verb`.
    #[must_use]
    pub fn lookup(&self, extension: &str, route: &str, verb: HttpVerb) -> Option<&MethodDescriptor> {
        self.find(extension)?.routes.get(route)?.get(&verb)
    }

    /// Looks up an extension class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ExtensionClass>> {
        self.find(name).map(|registered| &registered.class)
    }

    /// Driver classes in registration order.
    pub fn drivers(&self) -> impl Iterator<Item = &Arc<dyn ExtensionClass>> {
        self.of_type(ExtensionType::Driver)
    }

    /// Plugin classes in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn ExtensionClass>> {
        self.of_type(ExtensionType::Plugin)
    }

    /// Every mounted route, extensions in registration order and routes
    /// sorted within each extension.
    #[must_use]
    pub fn list_routes(&self) -> Vec<RouteListing> {
        self.extensions
            .iter()
            .flat_map(|registered| {
                let metadata = registered.class.metadata();
                registered.routes.iter().flat_map(move |(route, verbs)| {
                    verbs.iter().map(move |(verb, method)| RouteListing {
                        extension: metadata.name().to_owned(),
                        extension_type: metadata.extension_type(),
                        route: route.clone(),
                        verb: *verb,
                        command: method.command().to_owned(),
                    })
                })
            })
            .collect()
    }

    /// Duplicate-route policy in force.
    #[must_use]
    pub const fn policy(&self) -> RouteOverridePolicy {
        self.policy
    }

    /// Number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    fn find(&self, name: &str) -> Option<&RegisteredExtension> {
        self.extensions
            .iter()
            .find(|registered| registered.class.metadata().name() == name)
    }

    fn of_type(&self, extension_type: ExtensionType) -> impl Iterator<Item = &Arc<dyn ExtensionClass>> {
        self.extensions
            .iter()
            .filter(move |registered| registered.class.metadata().extension_type() == extension_type)
            .map(|registered| &registered.class)
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("policy", &self.policy)
            .field(
                "extensions",
                &self
                    .extensions
                    .iter()
                    .map(|registered| registered.class.metadata().name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
