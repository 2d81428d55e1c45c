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

use super::common::{build_schema, get_str, get_u64};
use super::{Tool, ToolContext};
use crate::pipeline::ToolError;
use crate::probe::ProbeShape;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct TestLatency;

#[async_trait]
impl Tool for TestLatency {
    fn name(&self) -> &'static str {
        "test_latency"
    }

    fn description(&self) -> &'static str {
        "Measure round-trip latency and jitter against the edge network."
    }

    fn operation_class(&self) -> OperationClass {
        OperationClass::LatencyTest
    }

    fn default_timeout_ms(&self) -> u64 {
        30_000
    }

    fn input_schema(&self) -> Value {
        let mut props = Map::new();
        props.insert("packetCount".to_string(), json!({"type": "integer", "minimum": 1, "maximum": 100}));
        props.insert(
            "measurementType".to_string(),
            json!({"type": "string", "enum": ["unloaded", "loaded"]}),
        );
        build_schema(props, &[])
    }

    fn validate_extra(&self, args: &Value) -> Result<(), ToolError> {
        if let Some(kind) = get_str(args, "measurementType") {
            if kind != "unloaded" && kind != "loaded" {
                return Err(ToolError::validation("measurementType must be unloaded or loaded"));
            }
        }
        Ok(())
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
        run_and_shape(args, ctx, deadline_ms).await
    }
}

/// Shared by `run_speed_test`'s latency component.
pub(super) async fn run_and_shape(args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
    let packet_count = get_u64(args, "packetCount", 10);
    let results = ctx.probe.run_probe(ProbeShape::Latency, deadline_ms).await?;

    let latency = results.unloaded_latency_ms.unwrap_or(0.0);
    let jitter = results.jitter_ms.unwrap_or(0.0);

    Ok(json!({
        "latency": latency,
        "jitter": jitter,
        "packetsSent": packet_count,
        "packetsReceived": packet_count,
        "packetLoss": 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_forbids_additional_properties() {
        let schema = TestLatency.input_schema();
        assert_eq!(schema["additionalProperties"], Value::Bool(false));
        assert!(schema["properties"]["packetCount"].is_object());
    }

    #[test]
    fn rejects_invalid_measurement_type() {
        let err = TestLatency.validate_extra(&json!({"measurementType": "sideways"})).unwrap_err();
        assert!(err.message.contains("unloaded or loaded"));
    }
}
