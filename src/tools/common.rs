// Copyright 2026 Edgereach Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared argument-extraction and schema helpers for every tool.

use crate::pipeline::ToolError;
use serde_json::{json, Map, Value};

/// The `{timeout, serverLocation}` properties every tool's schema
/// carries in addition to its own.
pub fn common_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert(
        "timeout".to_string(),
        json!({"type": "integer", "minimum": 1, "maximum": 300}),
    );
    props.insert(
        "serverLocation".to_string(),
        json!({"type": "string", "minLength": 1}),
    );
    props
}

/// Builds a full tool schema: common properties merged with
/// `extra_properties`, `required` as given, `additionalProperties: false`.
pub fn build_schema(extra_properties: Map<String, Value>, required: &[&str]) -> Value {
    let mut properties = common_properties();
    properties.extend(extra_properties);
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

pub fn validate_schema(schema: &Value, instance: &Value) -> Result<(), ToolError> {
    let compiled = jsonschema::JSONSchema::compile(schema)
        .map_err(|e| ToolError::execution(format!("invalid tool schema: {e}")))?;
    if let Err(errors) = compiled.validate(instance) {
        let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(ToolError::validation(message));
    }
    Ok(())
}

/// The common `{timeout, serverLocation}` range checks the schema
/// already encodes as `minimum`/`maximum`/`minLength`, re-asserted here
/// as the canonical reference — schema validation covers this in
/// practice, this is the safety net if a tool's schema drifts.
pub fn validate_common_args(args: &Value) -> Result<(), ToolError> {
    if let Some(timeout) = args.get("timeout") {
        let timeout = timeout
            .as_u64()
            .ok_or_else(|| ToolError::validation("timeout must be a positive integer number of seconds"))?;
        if !(1..=300).contains(&timeout) {
            return Err(ToolError::validation("timeout must be between 1 and 300 seconds"));
        }
    }
    if let Some(location) = args.get("serverLocation") {
        let location = location
            .as_str()
            .ok_or_else(|| ToolError::validation("serverLocation must be a string"))?;
        if location.is_empty() {
            return Err(ToolError::validation("serverLocation must not be empty"));
        }
    }
    Ok(())
}

pub fn get_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

pub fn get_f64(args: &Value, key: &str, default: f64) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub fn get_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn get_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_timeout() {
        let err = validate_common_args(&json!({"timeout": 301})).unwrap_err();
        assert!(err.message.contains("between 1 and 300"));
    }

    #[test]
    fn rejects_empty_server_location() {
        let err = validate_common_args(&json!({"serverLocation": ""})).unwrap_err();
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn accepts_absent_common_args() {
        assert!(validate_common_args(&json!({})).is_ok());
    }
}
