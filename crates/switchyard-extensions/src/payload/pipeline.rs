//! Applies a [`PayloadDescriptor`] to a request body and a backend result.
//!
//! Both functions are pure, so any number of requests may run them
//! concurrently.

use serde_json::Value;

use super::{JsonMap, PayloadDescriptor, ValidationOutcome};
use crate::error::PayloadError;
use crate::extension::CommandArgs;

const GENERIC_VALIDATION_FAILURE: &str = "parameters were rejected by the command validator";

/// Resolves the arguments a backend method receives from a raw body.
///
/// The body is wrapped when the descriptor says so, the first satisfiable
/// required group and every present optional name are collected, the
/// validator runs against the assembled object, and the argument builder (if
/// any) shapes the final [`CommandArgs`]. A descriptor that declares no
/// parameters passes the whole object through. `null` bodies read as `{}`.
///
/// # Errors
///
/// - [`PayloadError::InvalidBody`] if the body is not a JSON object.
/// - [`PayloadError::MissingRequiredParameter`] if no required group is
///   satisfied.
/// - [`PayloadError::ValidationFailed`] if the validator rejects the object.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use switchyard_extensions::payload::pipeline::build;
/// use switchyard_extensions::{ParamGroups, PayloadDescriptor};
///
/// let descriptor = PayloadDescriptor::new()
///     .with_required(ParamGroups::one_of([vec!["a", "b"], vec!["c"]]));
/// let args = build(&descriptor, json!({"c": 1}), "W3C").expect("second group satisfied");
/// assert_eq!(args.get("c"), Some(&json!(1)));
/// assert!(build(&descriptor, json!({"a": 1}), "W3C").is_err());
/// ```
pub fn build(
    descriptor: &PayloadDescriptor,
    body: Value,
    protocol: &str,
) -> Result<CommandArgs, PayloadError> {
    let wrapped = match descriptor.wrap() {
        Some(key) => {
            let mut outer = JsonMap::new();
            outer.insert(key.to_owned(), body);
            Value::Object(outer)
        }
        None => body,
    };
    let object = into_object(wrapped)?;
    let assembled = if descriptor.declares_params() {
        assemble(descriptor, object)?
    } else {
        object
    };

    if let Some(validator) = descriptor.validator() {
        if let ValidationOutcome::Rejected { reason } = validator(&assembled, protocol) {
            return Err(PayloadError::ValidationFailed {
                reason: reason.unwrap_or_else(|| GENERIC_VALIDATION_FAILURE.to_owned()),
            });
        }
    }

    Ok(match descriptor.args_builder() {
        Some(builder) => builder(assembled),
        None => CommandArgs::from_named(assembled),
    })
}

/// Extracts the declared unwrap key from a backend result.
///
/// Results pass through untouched when the descriptor declares no unwrap
/// key.
///
/// # Errors
///
/// Returns [`PayloadError::InvalidResponseShape`] when the result is not an
/// object or lacks the key.
pub fn unwrap_result(descriptor: &PayloadDescriptor, result: Value) -> Result<Value, PayloadError> {
    let Some(key) = descriptor.unwrap() else {
        return Ok(result);
    };
    match result {
        Value::Object(mut object) => {
            object
                .remove(key)
                .ok_or_else(|| PayloadError::InvalidResponseShape {
                    key: key.to_owned(),
                })
        }
        _ => Err(PayloadError::InvalidResponseShape {
            key: key.to_owned(),
        }),
    }
}

fn into_object(body: Value) -> Result<JsonMap, PayloadError> {
    match body {
        Value::Object(object) => Ok(object),
        Value::Null => Ok(JsonMap::new()),
        other => Err(PayloadError::InvalidBody {
            message: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
    }
}

fn assemble(descriptor: &PayloadDescriptor, mut object: JsonMap) -> Result<JsonMap, PayloadError> {
    let mut assembled = JsonMap::new();

    let required = descriptor.required().groups();
    if !required.is_empty() {
        let satisfied = required
            .iter()
            .find(|group| group.iter().all(|name| object.contains_key(name)))
            .ok_or_else(|| PayloadError::MissingRequiredParameter {
                missing: required.to_vec(),
            })?;
        for name in satisfied {
            if let Some(value) = object.remove(name) {
                assembled.insert(name.clone(), value);
            }
        }
    }

    for name in descriptor.optional().names() {
        if let Some(value) = object.remove(name) {
            assembled.insert(name.to_owned(), value);
        }
    }

    Ok(assembled)
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
