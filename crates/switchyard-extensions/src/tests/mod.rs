//! Crate-level test doubles and behaviour tests.

use serde_json::Value;

use crate::capability::{Capabilities, CapabilitySchema};
use crate::error::InvocationError;
use crate::extension::{CommandArgs, ConstructorArgs, Extension, ExtensionClass, ExtensionMetadata};
use crate::method::MethodMap;


/// Extension instance that echoes its arguments back.
pub(crate) struct EchoInstance;

impl Extension for EchoInstance {
    fn execute(&mut self, command: &str, args: CommandArgs) -> Result<Value, InvocationError> {
        Ok(serde_json::json!({ "command": command, "args": args.to_json() }))
    }
}

/// Extension class assembled from plain data.
pub(crate) struct StaticClass {
    metadata: ExtensionMetadata,
    commands: Vec<&'static str>,
    map: MethodMap,
    schema: CapabilitySchema,
}

impl StaticClass {
    pub(crate) fn new(metadata: ExtensionMetadata, commands: &[&'static str], map: MethodMap) -> Self {
        Self {
            metadata,
            commands: commands.to_vec(),
            map,
            schema: CapabilitySchema::new(),
        }
    }

    pub(crate) fn with_schema(mut self, schema: CapabilitySchema) -> Self {
        self.schema = schema;
        self
    }
}

impl ExtensionClass for StaticClass {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.metadata
    }

    fn commands(&self) -> &[&str] {
        &self.commands
    }

    fn method_map(&self) -> MethodMap {
        self.map.clone()
    }

    fn matches_capabilities(&self, capabilities: &Capabilities) -> bool {
        self.schema.matches(capabilities)
    }

    fn instantiate(&self, _args: ConstructorArgs<'_>) -> Result<Box<dyn Extension>, InvocationError> {
        Ok(Box::new(EchoInstance))
    }
}
