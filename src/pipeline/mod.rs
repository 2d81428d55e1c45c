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

//! The uniform tool lifecycle: validate -> admit -> run -> release ->
//! emit, applied identically to every tool in the catalog.

mod envelope;

pub use envelope::{EnvelopeError, ErrorCode, ToolEnvelope};

use crate::catalog::ServerCatalog;
use crate::probe::{ProbeClient, ProbeError};
use crate::rate_limiter::{DenyReason, RateLimiter, RateLimiterError};
use crate::tools::{Tool, ToolCatalog, ToolContext};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Carries enough to build an `EnvelopeError`: an optional pre-assigned
/// code (classifier rule (a)), a human message (classifier rule (b)
/// scans this), and optional machine-readable details.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: Option<ErrorCode>,
    pub message: String,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        ToolError {
            code: Some(ErrorCode::ValidationError),
            message: message.into(),
            details: None,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        ToolError {
            code: None,
            message: message.into(),
            details: None,
        }
    }
}

impl From<ProbeError> for ToolError {
    fn from(e: ProbeError) -> Self {
        match &e {
            ProbeError::TimeoutExceeded { .. } => ToolError {
                code: Some(ErrorCode::TimeoutError),
                message: e.to_string(),
                details: None,
            },
            ProbeError::Execution { .. } => ToolError {
                code: None,
                message: e.to_string(),
                details: None,
            },
        }
    }
}

impl From<RateLimiterError> for ToolError {
    fn from(e: RateLimiterError) -> Self {
        match e {
            RateLimiterError::RateLimitExceeded {
                op,
                wait_time_ms,
                reason,
            } => ToolError {
                code: Some(ErrorCode::RateLimitError),
                message: format!("rate limit exceeded for {op}"),
                details: Some(serde_json::json!({
                    "waitTimeMs": wait_time_ms,
                    "reason": reason_tag(reason),
                })),
            },
            RateLimiterError::InvalidOperation(op) => ToolError {
                code: None,
                message: format!("invalid operation class: {op}"),
                details: None,
            },
        }
    }
}

impl From<crate::catalog::CatalogError> for ToolError {
    fn from(e: crate::catalog::CatalogError) -> Self {
        match e {
            crate::catalog::CatalogError::AdmissionDenied(rl) => rl.into(),
            crate::catalog::CatalogError::Fetch(pe) => pe.into(),
        }
    }
}

fn reason_tag(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::TokenBucket => "token_bucket",
        DenyReason::DailyLimit => "daily_limit",
        DenyReason::ConcurrentLimit => "concurrent_limit",
    }
}

/// Derives the envelope error code in documented priority order: (a) a
/// code already attached to the error, (b) a substring match against
/// the message, (c) `EXECUTION_ERROR`.
pub fn classify(error: &ToolError) -> ErrorCode {
    if let Some(code) = error.code {
        return code;
    }
    let message = error.message.to_lowercase();
    if message.contains("timeout") {
        ErrorCode::TimeoutError
    } else if message.contains("rate limit") {
        ErrorCode::RateLimitError
    } else if message.contains("validation") || message.contains("invalid") {
        ErrorCode::ValidationError
    } else if message.contains("network") || message.contains("connection") {
        ErrorCode::NetworkError
    } else {
        ErrorCode::ExecutionError
    }
}

pub struct ToolPipeline {
    limiter: Arc<RateLimiter>,
    tools: Arc<ToolCatalog>,
    ctx: ToolContext,
}

impl ToolPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        catalog: Arc<ServerCatalog>,
        probe: Arc<dyn ProbeClient>,
        tools: Arc<ToolCatalog>,
    ) -> Self {
        ToolPipeline {
            limiter,
            tools,
            ctx: ToolContext { probe, catalog },
        }
    }

    pub fn tools(&self) -> &ToolCatalog {
        &self.tools
    }

    /// Runs one invocation end to end and always returns an envelope —
    /// no error path escapes as a Rust `Err`.
    pub async fn invoke(&self, tool_name: &str, arguments: Value) -> ToolEnvelope {
        let start = Instant::now();
        let outcome = self.invoke_inner(tool_name, arguments).await;
        let execution_time = start.elapsed().as_millis().max(1) as u64;

        match outcome {
            Ok(data) => ToolEnvelope::success(data, execution_time),
            Err(err) => {
                let code = classify(&err);
                tracing::info!(target: "pipeline", tool = tool_name, code = ?code, "tool invocation failed");
                ToolEnvelope::failure(tool_name, code, err.message, err.details, execution_time)
            }
        }
    }

    async fn invoke_inner(&self, tool_name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::validation(format!("invalid tool name: {tool_name}")))?;

        tool.validate(&arguments)?;

        let _guard = self.limiter.acquire(tool.operation_class())?;

        let deadline_ms = common_deadline_ms(&arguments).unwrap_or_else(|| tool.default_timeout_ms());

        tracing::info!(target: "pipeline", tool = tool_name, operation_class = %tool.operation_class(), "tool invocation admitted");
        tool.run(&arguments, &self.ctx, deadline_ms).await
    }
}

fn common_deadline_ms(arguments: &Value) -> Option<u64> {
    arguments.get("timeout").and_then(Value::as_u64).map(|s| s * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::test_support::StubProbeClient;
    use crate::rate_limiter::{default_bucket_configs, BackoffConfig};

    fn pipeline_with_probe(probe: Arc<dyn ProbeClient>) -> ToolPipeline {
        let limiter = RateLimiter::new(default_bucket_configs(), BackoffConfig::default());
        let catalog = ServerCatalog::new(probe.clone(), limiter.clone());
        let tools = Arc::new(ToolCatalog::with_defaults());
        ToolPipeline::new(limiter, catalog, probe, tools)
    }

    #[tokio::test]
    async fn unknown_tool_is_validation_error() {
        let probe: Arc<dyn ProbeClient> = Arc::new(StubProbeClient::with_servers(Vec::new()));
        let pipeline = pipeline_with_probe(probe);
        let envelope = pipeline.invoke("does_not_exist", serde_json::json!({})).await;
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_ref().unwrap().code, ErrorCode::ValidationError);
    }

    // E5 — timeout
    #[tokio::test]
    async fn e5_probe_timeout_surfaces_as_timeout_error() {
        let stub = Arc::new(StubProbeClient::with_servers(Vec::new()));
        // timeout arg is floored at 1s, so the delay must exceed 1000ms
        // to actually race past the deadline.
        stub.set_delay_ms(2000);
        let probe: Arc<dyn ProbeClient> = stub;
        let pipeline = pipeline_with_probe(probe);

        let envelope = pipeline
            .invoke("test_latency", serde_json::json!({"timeout": 1}))
            .await;
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_ref().unwrap().code, ErrorCode::TimeoutError);
        assert!(envelope.execution_time >= 1);
    }
}
