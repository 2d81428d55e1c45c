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

//! Method dispatch: `initialize`, `ping`, `tools/list`, `tools/call`.
//! Mirrors the teacher's `MCPHandler::handle_request` match-on-method
//! shape, trimmed to the four methods this server answers.

use crate::pipeline::ToolPipeline;
use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    ToolDescriptor,
};
use crate::transport::{encode_response, Transport, TransportError};
use std::sync::Arc;
use std::time::Duration;

pub struct McpServer {
    pipeline: Arc<ToolPipeline>,
}

impl McpServer {
    pub fn new(pipeline: Arc<ToolPipeline>) -> Self {
        McpServer { pipeline }
    }

    /// Dispatches one already-decoded request. Notifications (no
    /// meaningful id expected by the caller) still get a response here;
    /// the caller decides whether to write it.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, serde_json::to_value(InitializeResult::new()).unwrap()),
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "tools/list" => {
                let tools = self
                    .pipeline
                    .tools()
                    .list()
                    .into_iter()
                    .map(|entry| ToolDescriptor {
                        name: entry.name,
                        description: entry.description,
                        input_schema: entry.input_schema,
                    })
                    .collect();
                let result = ListToolsResult { tools };
                JsonRpcResponse::success(id, serde_json::to_value(result).unwrap())
            }
            "tools/call" => self.handle_tools_call(id, request.params).await,
            other => JsonRpcResponse::error(id, JsonRpcError::method_not_found(other)),
        }
    }

    async fn handle_tools_call(&self, id: JsonRpcId, params: Option<serde_json::Value>) -> JsonRpcResponse {
        let params = match params {
            Some(p) => p,
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("tools/call requires params"));
            }
        };
        let call: CallToolParams = match serde_json::from_value(params) {
            Ok(c) => c,
            Err(e) => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string()));
            }
        };

        let envelope = self.pipeline.invoke(&call.name, call.arguments).await;
        JsonRpcResponse::success(id, serde_json::to_value(envelope).unwrap())
    }

    /// Reads newline-delimited JSON-RPC requests from `transport` until
    /// EOF or `shutdown` fires, dispatching each one. On shutdown,
    /// in-flight invocations are allowed up to `drain_timeout` to finish
    /// before the loop returns.
    pub async fn run(
        &self,
        mut transport: impl Transport,
        shutdown: impl std::future::Future<Output = ()>,
        drain_timeout: Duration,
    ) -> Result<(), TransportError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                line = transport.recv_line() => {
                    match line? {
                        Some(line) => self.handle_line(&mut transport, &line).await?,
                        None => break,
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!(target: "server", "shutdown signal received, draining in-flight work");
                    break;
                }
            }
        }

        let _ = tokio::time::timeout(drain_timeout, drain_in_flight()).await;
        Ok(())
    }

    async fn handle_line(&self, transport: &mut impl Transport, line: &str) -> Result<(), TransportError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                let response = JsonRpcResponse::error(JsonRpcId::Null, JsonRpcError::parse_error(e.to_string()));
                transport.send_line(&encode_response(&response)?).await?;
                return Ok(());
            }
        };
        let response = self.handle_request(request).await;
        transport.send_line(&encode_response(&response)?).await
    }
}

/// Placeholder drain point: with no background task handle to await,
/// the bounded window simply elapses as a no-op. Kept as a distinct
/// function so a future in-flight-task registry has one call site to
/// extend.
async fn drain_in_flight() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServerCatalog;
    use crate::probe::test_support::StubProbeClient;
    use crate::probe::ProbeClient;
    use crate::rate_limiter::{default_bucket_configs, BackoffConfig, RateLimiter};
    use crate::tools::ToolCatalog;

    fn server() -> McpServer {
        let probe: Arc<dyn ProbeClient> = Arc::new(StubProbeClient::with_servers(Vec::new()));
        let limiter = RateLimiter::new(default_bucket_configs(), BackoffConfig::default());
        let catalog = ServerCatalog::new(probe.clone(), limiter.clone());
        let tools = Arc::new(ToolCatalog::with_defaults());
        let pipeline = Arc::new(ToolPipeline::new(limiter, catalog, probe, tools));
        McpServer::new(pipeline)
    }

    #[tokio::test]
    async fn initialize_reports_tools_capability() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "initialize".to_string(),
            params: None,
            id: JsonRpcId::Number(1),
        };
        let response = server.handle_request(request).await;
        assert!(response.error.is_none());
        assert!(response.result.unwrap()["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_returns_seven_entries() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/list".to_string(),
            params: None,
            id: JsonRpcId::Number(2),
        };
        let response = server.handle_request(request).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert_eq!(tools, 7);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "resources/list".to_string(),
            params: None,
            id: JsonRpcId::Null,
        };
        let response = server.handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_pipeline() {
        let server = server();
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "tools/call".to_string(),
            params: Some(serde_json::json!({"name": "test_latency", "arguments": {}})),
            id: JsonRpcId::Number(3),
        };
        let response = server.handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["success"], true);
    }
}
