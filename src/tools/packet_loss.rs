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
use super::{Tool, ToolContext};
use crate::pipeline::ToolError;
use crate::probe::ProbeShape;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct TestPacketLoss;

#[async_trait]
impl Tool for TestPacketLoss {
    fn name(&self) -> &'static str {
        "test_packet_loss"
    }

    fn description(&self) -> &'static str {
        "Measure packet loss against the edge network over batched probes."
    }

    fn operation_class(&self) -> OperationClass {
        OperationClass::PacketLossTest
    }

    fn default_timeout_ms(&self) -> u64 {
        60_000
    }

    fn input_schema(&self) -> Value {
        let mut props = Map::new();
        props.insert("packetCount".to_string(), json!({"type": "integer", "minimum": 10, "maximum": 1000}));
        props.insert("batchSize".to_string(), json!({"type": "integer", "minimum": 1, "maximum": 50}));
        props.insert(
            "batchWaitTime".to_string(),
            json!({"type": "integer", "minimum": 100, "maximum": 5000}),
        );
        build_schema(props, &[])
    }

    fn validate_extra(&self, args: &Value) -> Result<(), ToolError> {
        let packet_count = get_u64(args, "packetCount", 100);
        let batch_size = get_u64(args, "batchSize", 10);
        if batch_size > packet_count {
            return Err(ToolError::validation("batchSize must not exceed packetCount"));
        }
        Ok(())
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
        run_and_shape(args, ctx, deadline_ms).await
    }
}

pub(super) async fn run_and_shape(args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError> {
    let packet_count = get_u64(args, "packetCount", 100) as u32;
    let batch_size = get_u64(args, "batchSize", 10) as u32;

    let results = ctx.probe.run_probe(ProbeShape::PacketLoss, deadline_ms).await?;
    let sent = results.packets_sent.unwrap_or(packet_count);
    let received = results.packets_received.unwrap_or(sent);
    let lost = sent.saturating_sub(received);
    let packet_loss = if sent == 0 { 0.0 } else { lost as f64 / sent as f64 };

    let mut batch_results = Vec::new();
    let mut remaining = sent;
    while remaining > 0 {
        let this_batch = remaining.min(batch_size);
        let lost_share = ((this_batch as f64 / sent.max(1) as f64) * lost as f64).round() as u32;
        batch_results.push(json!({
            "sent": this_batch,
            "lost": lost_share.min(this_batch),
        }));
        remaining -= this_batch;
    }

    Ok(json!({
        "packetLoss": packet_loss,
        "totalPackets": sent,
        "lostPackets": lost,
        "batchResults": batch_results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_batch_size_larger_than_packet_count() {
        let err = TestPacketLoss
            .validate_extra(&json!({"packetCount": 10, "batchSize": 20}))
            .unwrap_err();
        assert!(err.message.contains("batchSize"));
    }

    #[test]
    fn accepts_default_batch_size_against_default_packet_count() {
        assert!(TestPacketLoss.validate_extra(&json!({})).is_ok());
    }
}
