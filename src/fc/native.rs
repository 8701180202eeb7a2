//! Parsing of the backend's dedicated tool channel.
//!
//! `tool_call` events carry `{"name": ..., "arguments"|"parameters": {...}}`;
//! `tool_result` events carry arbitrary JSON, with `{"error": true}` marking a
//! failed execution.

use serde_json::Value;

use super::{ToolArguments, ToolCall};

/// Parse a native `tool_call` payload.
///
/// Requires a string `name`. Arguments come from `arguments`, then
/// `parameters`, and default to an empty mapping when neither is an object.
/// Any other shape yields `None`.
#[must_use]
pub fn parse_tool_call(json: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(json).ok()?;
    let Value::Object(mut object) = value else {
        return None;
    };
    let Some(Value::String(name)) = object.remove("name") else {
        return None;
    };
    let arguments = take_object(&mut object, "arguments")
        .or_else(|| take_object(&mut object, "parameters"))
        .unwrap_or_default();
    Some(ToolCall { name, arguments })
}

/// Whether a `tool_result` payload reports an error.
///
/// True only for an object whose `error` field is the boolean `true`.
#[must_use]
pub fn is_error_result(json: &str) -> bool {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(object)) => matches!(object.get("error"), Some(Value::Bool(true))),
        _ => false,
    }
}

fn take_object(object: &mut ToolArguments, key: &str) -> Option<ToolArguments> {
    match object.remove(key) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}
