//! Shared test doubles and crate-level behaviour tests.


use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use switchyard_config::Config;
use switchyard_extensions::{
    Capabilities, CapabilityConstraint, CapabilitySchema, CommandArgs, ConstructorArgs,
    Extension, ExtensionClass, ExtensionMetadata, HttpVerb, InvocationError, MethodDescriptor,
    MethodMap, Next, ParamGroups, PayloadDescriptor,
};

use crate::engine::{Engine, EngineBuilder};
use crate::logger::{LogLevel, Logger};

pub(crate) const SESSION_ROUTE: &str = "/session/:sessionId";
pub(crate) const URL_ROUTE: &str = "/session/:sessionId/url";
pub(crate) const EXECUTE_ROUTE: &str = "/session/:sessionId/execute";
pub(crate) const SLOW_ROUTE: &str = "/session/:sessionId/slow";
pub(crate) const FAIL_ROUTE: &str = "/session/:sessionId/fail";
pub(crate) const TIMEOUTS_ROUTE: &str = "/session/:sessionId/timeouts";
pub(crate) const TEXT_ROUTE: &str = "/session/:sessionId/element/:elementId/text";
pub(crate) const STATUS_ROUTE: &str = "/status";
pub(crate) const PLUGIN_ROUTE: &str = "/session/:sessionId/recorder/events";

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Logger that keeps every record for assertions.
#[derive(Default)]
pub(crate) struct RecordingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub(crate) fn records(&self) -> Vec<(LogLevel, String)> {
        self.records
            .lock()
            .expect("recording logger mutex poisoned")
            .clone()
    }

    pub(crate) fn contains(&self, level: LogLevel, fragment: &str) -> bool {
        self.records()
            .iter()
            .any(|(recorded, message)| *recorded == level && message.contains(fragment))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        self.records
            .lock()
            .expect("recording logger mutex poisoned")
            .push((level, message.to_owned()));
    }
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// One observation made by a test backend.
#[derive(Debug, Clone)]
pub(crate) struct Event {
    pub(crate) who: String,
    pub(crate) what: String,
    pub(crate) at: Instant,
}

/// Shared, ordered record of backend activity.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub(crate) fn record(&self, who: &str, what: impl Into<String>) {
        self.events
            .lock()
            .expect("journal mutex poisoned")
            .push(Event {
                who: who.to_owned(),
                what: what.into(),
                at: Instant::now(),
            });
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().expect("journal mutex poisoned").clone()
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| format!("{}:{}", event.who, event.what))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

const DRIVER_COMMANDS: &[&str] = &[
    "setUrl",
    "getUrl",
    "execute",
    "slow",
    "fail",
    "setTimeouts",
    "getText",
    "deleteSession",
];

/// Driver instance backed by plain fields and the shared journal.
pub(crate) struct FakeDriver {
    label: String,
    url: Value,
    journal: Journal,
}

impl Extension for FakeDriver {
    fn execute(&mut self, command: &str, args: CommandArgs) -> Result<Value, InvocationError> {
        match command {
            "setUrl" => {
                self.url = args.get("url").cloned().unwrap_or(Value::Null);
                Ok(Value::Null)
            }
            "getUrl" => Ok(self.url.clone()),
            "execute" => {
                self.journal.record(&self.label, format!("execute {}", args.to_json()));
                Ok(json!({ "value": 42 }))
            }
            "slow" => {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(0);
                self.journal.record(&self.label, "start");
                thread::sleep(Duration::from_millis(ms));
                self.journal.record(&self.label, "end");
                Ok(Value::Null)
            }
            "fail" => Err(InvocationError::with_code(
                "no such element",
                "element could not be located",
            )),
            "setTimeouts" => Ok(args.to_json()),
            "getText" => Ok(args.get("elementId").cloned().unwrap_or(Value::Null)),
            "deleteSession" => {
                self.journal.record(&self.label, "deleteSession");
                Ok(Value::Null)
            }
            other => Err(InvocationError::new(format!("unsupported command {other}"))),
        }
    }

    fn terminate(&mut self) -> Result<(), InvocationError> {
        self.journal.record(&self.label, "terminate");
        Ok(())
    }
}

/// Driver class accepting one `platformName`.
pub(crate) struct FakeDriverClass {
    metadata: ExtensionMetadata,
    schema: CapabilitySchema,
    journal: Journal,
    failing_constructor: bool,
}

impl FakeDriverClass {
    pub(crate) fn new(name: &str, platform: &str, journal: &Journal) -> Self {
        Self {
            metadata: ExtensionMetadata::driver(name, "1.0.0"),
            schema: CapabilitySchema::new().with(
                "platformName",
                CapabilityConstraint::required().one_of([json!(platform)]),
            ),
            journal: journal.clone(),
            failing_constructor: false,
        }
    }

    pub(crate) fn with_failing_constructor(mut self) -> Self {
        self.failing_constructor = true;
        self
    }
}

impl ExtensionClass for FakeDriverClass {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn commands(&self) -> &[&str] {
        DRIVER_COMMANDS
    }

    fn method_map(&self) -> MethodMap {
        MethodMap::new()
            .with_route(
                URL_ROUTE,
                HttpVerb::Post,
                MethodDescriptor::new("setUrl").with_payload(
                    PayloadDescriptor::new().with_required(ParamGroups::all(["url"])),
                ),
            )
            .with_route(URL_ROUTE, HttpVerb::Get, MethodDescriptor::new("getUrl"))
            .with_route(
                EXECUTE_ROUTE,
                HttpVerb::Post,
                MethodDescriptor::new("execute").with_payload(
                    PayloadDescriptor::new()
                        .with_wrap("params")
                        .with_unwrap("value"),
                ),
            )
            .with_route(
                SLOW_ROUTE,
                HttpVerb::Post,
                MethodDescriptor::new("slow").with_payload(
                    PayloadDescriptor::new().with_optional(ParamGroups::all(["ms"])),
                ),
            )
            .with_route(FAIL_ROUTE, HttpVerb::Post, MethodDescriptor::new("fail"))
            .with_route(
                TIMEOUTS_ROUTE,
                HttpVerb::Post,
                MethodDescriptor::new("setTimeouts").with_never_proxy(true),
            )
            .with_route(TEXT_ROUTE, HttpVerb::Get, MethodDescriptor::new("getText"))
            .with_route(
                SESSION_ROUTE,
                HttpVerb::Delete,
                MethodDescriptor::new("deleteSession"),
            )
    }

    fn matches_capabilities(&self, capabilities: &Capabilities) -> bool {
        self.schema.matches(capabilities)
    }

    fn instantiate(&self, args: ConstructorArgs<'_>) -> Result<Box<dyn Extension>, InvocationError> {
        if self.failing_constructor {
            return Err(InvocationError::new("device is offline"));
        }
        let label = format!(
            "{}@{}",
            self.metadata.name(),
            args.session_id().unwrap_or("none")
        );
        self.journal.record(&label, "instantiate");
        Ok(Box::new(FakeDriver {
            label,
            url: Value::Null,
            journal: self.journal.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// How a recording plugin treats commands it intercepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterceptMode {
    /// Record and forward unchanged.
    PassThrough,
    /// Answer without calling the rest of the chain.
    ShortCircuit,
    /// Wrap the downstream result.
    Decorate,
}

/// Plugin instance that journals every interception.
pub(crate) struct RecorderPlugin {
    name: String,
    mode: InterceptMode,
    journal: Journal,
}

impl Extension for RecorderPlugin {
    fn execute(&mut self, command: &str, _args: CommandArgs) -> Result<Value, InvocationError> {
        self.journal.record(&self.name, format!("execute {command}"));
        match command {
            "status" => Ok(json!({ "ready": true, "plugin": self.name })),
            "events" => Ok(json!(self.journal.entries())),
            other => Err(InvocationError::new(format!("unsupported command {other}"))),
        }
    }

    fn intercept(
        &mut self,
        command: &str,
        args: CommandArgs,
        next: Next<'_>,
    ) -> Result<Value, InvocationError> {
        self.journal.record(&self.name, format!("before {command}"));
        let result = match self.mode {
            InterceptMode::PassThrough => next.run(args),
            InterceptMode::ShortCircuit => Ok(json!(format!("{} answered", self.name))),
            InterceptMode::Decorate => next
                .run(args)
                .map(|value| json!({ "by": self.name, "value": value })),
        };
        self.journal.record(&self.name, format!("after {command}"));
        result
    }

    fn terminate(&mut self) -> Result<(), InvocationError> {
        self.journal.record(&self.name, "terminate");
        Ok(())
    }
}

/// Plugin class that intercepts `getUrl` and mounts `/status`.
pub(crate) struct RecorderPluginClass {
    metadata: ExtensionMetadata,
    mode: InterceptMode,
    journal: Journal,
}

impl RecorderPluginClass {
    pub(crate) fn new(name: &str, mode: InterceptMode, journal: &Journal) -> Self {
        Self {
            metadata: ExtensionMetadata::plugin(name, "1.0.0"),
            mode,
            journal: journal.clone(),
        }
    }
}

impl ExtensionClass for RecorderPluginClass {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn commands(&self) -> &[&str] {
        &["getUrl", "status", "events"]
    }

    fn method_map(&self) -> MethodMap {
        MethodMap::new()
            .with_route(STATUS_ROUTE, HttpVerb::Get, MethodDescriptor::new("status"))
            .with_route(PLUGIN_ROUTE, HttpVerb::Get, MethodDescriptor::new("events"))
    }

    fn instantiate(&self, args: ConstructorArgs<'_>) -> Result<Box<dyn Extension>, InvocationError> {
        self.journal.record(
            self.metadata.name(),
            format!("instantiate {}", args.session_id().unwrap_or("sessionless")),
        );
        Ok(Box::new(RecorderPlugin {
            name: self.metadata.name().to_owned(),
            mode: self.mode,
            journal: self.journal.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Engine fixtures
// ---------------------------------------------------------------------------

/// Engine with one Android driver, observed through a journal and a
/// recording logger.
pub(crate) struct TestEngine {
    pub(crate) engine: Engine,
    pub(crate) journal: Journal,
    pub(crate) logger: Arc<RecordingLogger>,
}

impl TestEngine {
    pub(crate) fn builder(logger: &Arc<RecordingLogger>) -> EngineBuilder {
        EngineBuilder::new(&Config::default()).with_logger(Arc::clone(logger) as Arc<dyn Logger>)
    }

    pub(crate) fn with_driver() -> Self {
        Self::assemble(|builder, journal| {
            builder
                .register(Arc::new(FakeDriverClass::new("android", "Android", journal)))
                .expect("driver registers");
        })
    }

    pub(crate) fn assemble<F>(register: F) -> Self
    where
        F: FnOnce(&mut EngineBuilder, &Journal),
    {
        let journal = Journal::default();
        let logger = Arc::new(RecordingLogger::default());
        let mut builder = Self::builder(&logger);
        register(&mut builder, &journal);
        Self {
            engine: builder.build(),
            journal,
            logger,
        }
    }

    pub(crate) fn android_session(&self) -> String {
        self.engine
            .create_session(&json!({
                "capabilities": {"alwaysMatch": {"platformName": "Android"}}
            }))
            .expect("android session")
            .session_id
    }
}
