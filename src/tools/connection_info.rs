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

use super::common::{build_schema, get_bool};
use super::{Tool, ToolContext};
use crate::pipeline::ToolError;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct GetConnectionInfo;

#[async_trait]
impl Tool for GetConnectionInfo {
    fn name(&self) -> &'static str {
        "get_connection_info"
    }

    fn description(&self) -> &'static str {
        "Report the caller's observed IP, ISP, and approximate location."
    }

    fn operation_class(&self) -> OperationClass {
        OperationClass::ConnectionInfo
    }

    fn default_timeout_ms(&self) -> u64 {
        30_000
    }

    fn input_schema(&self) -> Value {
        let mut props = Map::new();
        props.insert("includeLocation".to_string(), json!({"type": "boolean"}));
        props.insert("includeISP".to_string(), json!({"type": "boolean"}));
        build_schema(props, &[])
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
        let include_location = get_bool(args, "includeLocation", true);
        let include_isp = get_bool(args, "includeISP", true);

        let trace = ctx.probe.get_trace(deadline_ms).await?;

        let mut data = json!({
            "ip": trace.ip,
            "isp": if include_isp { trace.isp.clone() } else { "Hidden".to_string() },
            "connection": {
                "type": "unknown",
                "asn": "unknown",
                "organization": if include_isp { trace.isp.clone() } else { "Hidden".to_string() },
            },
        });

        if include_location {
            data["location"] = json!({
                "country": trace.country,
                "region": trace.region,
                "city": trace.city,
                "timezone": trace.timezone,
            });
        }

        Ok(data)
    }
}
