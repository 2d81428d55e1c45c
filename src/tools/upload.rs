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

use super::common::{build_schema, get_u64};
use super::download::duration_and_bytes_properties;
use super::{Tool, ToolContext};
use crate::pipeline::ToolError;
use crate::probe::ProbeShape;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct TestUploadSpeed;

#[async_trait]
impl Tool for TestUploadSpeed {
    fn name(&self) -> &'static str {
        "test_upload_speed"
    }

    fn description(&self) -> &'static str {
        "Measure upload bandwidth against the edge network."
    }

    fn operation_class(&self) -> OperationClass {
        OperationClass::UploadTest
    }

    fn default_timeout_ms(&self) -> u64 {
        30_000
    }

    fn input_schema(&self) -> Value {
        build_schema(duration_and_bytes_properties(), &[])
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
        run_and_shape(args, ctx, deadline_ms).await
    }
}

pub(super) async fn run_and_shape(args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
    let duration = get_u64(args, "duration", 15);
    let measurement_bytes = get_u64(args, "measurementBytes", 10 * 1024 * 1024);

    let results = ctx.probe.run_probe(ProbeShape::Upload, deadline_ms).await?;
    let bandwidth = results.upload_bandwidth_bps.unwrap_or(0.0);

    Ok(json!({
        "bandwidth": bandwidth,
        "bytes": measurement_bytes,
        "duration": duration,
        "throughput": bandwidth / 8.0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_shares_duration_and_bytes_bounds() {
        let schema = TestUploadSpeed.input_schema();
        assert_eq!(schema["properties"]["duration"]["maximum"], 60);
    }
}
