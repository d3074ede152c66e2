//! Plugin interception chain.
//!
//! Interceptors run in plugin registration order. Each receives a [`Next`]
//! continuation that runs the remaining interceptors and finally the
//! extension that owns the route. An interceptor may rewrite the arguments,
//! short-circuit with its own result, or post-process the result it gets
//! back.

use std::cell::Cell;

use serde_json::Value;

use switchyard_extensions::{CommandArgs, Extension, InvocationError, Next};

use super::errors::DispatchError;

/// One named instance taking part in a chain.
pub(crate) struct Stage<'a> {
    name: &'a str,
    instance: &'a mut dyn Extension,
}

impl<'a> Stage<'a> {
    pub(crate) fn new(name: &'a str, instance: &'a mut dyn Extension) -> Self {
        Self { name, instance }
    }
}

/// Runs `command` through `interceptors` and then `owner`.
///
/// A failure is attributed to the innermost stage that returned it.
pub(crate) fn run_chain<'a>(
    interceptors: &mut [Stage<'a>],
    owner: &mut Stage<'a>,
    command: &str,
    args: CommandArgs,
) -> Result<Value, DispatchError> {
    let failed = Cell::new(None);
    invoke(interceptors, owner, command, args, &failed).map_err(|source| {
        DispatchError::backend_invocation(failed.get().unwrap_or(owner.name), command, source)
    })
}

fn invoke<'a>(
    interceptors: &mut [Stage<'a>],
    owner: &mut Stage<'a>,
    command: &str,
    args: CommandArgs,
    failed: &Cell<Option<&'a str>>,
) -> Result<Value, InvocationError> {
    let Some((first, rest)) = interceptors.split_first_mut() else {
        let result = owner.instance.execute(command, args);
        record_failure(&result, owner.name, failed);
        return result;
    };
    let mut next = |forwarded: CommandArgs| invoke(&mut *rest, &mut *owner, command, forwarded, failed);
    let result = first.instance.intercept(command, args, Next::new(&mut next));
    record_failure(&result, first.name, failed);
    result
}

fn record_failure<'a>(
    result: &Result<Value, InvocationError>,
    name: &'a str,
    failed: &Cell<Option<&'a str>>,
) {
    if result.is_err() && failed.get().is_none() {
        failed.set(Some(name));
    }
}
