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

//! The outer envelope every tool invocation emits, win or lose.

use crate::clock::unix_millis_now;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    RateLimitError,
    TimeoutError,
    NetworkError,
    ExecutionError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Wire shape matches the documented envelope exactly: `executionTime`,
/// `toolName`, `isError` in camelCase, since this is the payload an
/// external (likely JS/TS) controller parses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub execution_time: u64,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolEnvelope {
    pub fn success(data: Value, execution_time: u64) -> Self {
        ToolEnvelope {
            success: true,
            data: Some(data),
            error: None,
            execution_time,
            timestamp: unix_millis_now(),
            tool_name: None,
            is_error: None,
        }
    }

    pub fn failure(
        tool_name: &str,
        code: ErrorCode,
        message: String,
        details: Option<Value>,
        execution_time: u64,
    ) -> Self {
        ToolEnvelope {
            success: false,
            data: None,
            error: Some(EnvelopeError { code, message, details }),
            execution_time,
            timestamp: unix_millis_now(),
            tool_name: Some(tool_name.to_string()),
            is_error: Some(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_round_trips() {
        let env = ToolEnvelope::success(serde_json::json!({"a": 1}), 12);
        let text = serde_json::to_string(&env).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let reserialized = serde_json::to_string(&value).unwrap();
        let rehydrated: Value = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(value, rehydrated);
        assert_eq!(value["success"], true);
    }

    #[test]
    fn failure_envelope_sets_is_error_and_tool_name() {
        let env = ToolEnvelope::failure("test_latency", ErrorCode::TimeoutError, "deadline exceeded".into(), None, 5);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["isError"], true);
        assert_eq!(value["toolName"], "test_latency");
        assert_eq!(value["error"]["code"], "TIMEOUT_ERROR");
    }
}
