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

//! An MCP tool server exposing seven network-diagnostic tools against
//! an edge network's speed-test infrastructure, over a newline-
//! delimited JSON-RPC channel on stdio.

pub mod catalog;
pub mod clock;
pub mod config;
pub mod pipeline;
pub mod probe;
pub mod protocol;
pub mod rate_limiter;
pub mod server;
pub mod tools;
pub mod transport;

use crate::catalog::ServerCatalog;
use crate::config::ServerConfig;
use crate::pipeline::ToolPipeline;
use crate::probe::{HttpProbeClient, ProbeClient};
use crate::rate_limiter::RateLimiter;
use crate::server::McpServer;
use crate::tools::ToolCatalog;
use crate::transport::StdioTransport;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Drain window given to in-flight tool invocations once shutdown is
/// requested, per spec.md §5's shutdown contract.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Assembles every subsystem in leaves-first order (Rate Limiter ->
/// Probe Client Adapter -> Server Catalog -> Tool Pipeline, per
/// SPEC_FULL.md §4.10) and runs the stdio server loop until stdin
/// closes or a shutdown signal arrives.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    config.validate()?;

    let limiter = RateLimiter::new(config.rate_limiter.bucket_configs(), config.rate_limiter.backoff);

    let probe: Arc<dyn ProbeClient> = Arc::new(HttpProbeClient::new(config.probe.into()));

    let catalog = ServerCatalog::new(probe.clone(), limiter.clone());

    let tools = Arc::new(ToolCatalog::with_defaults());
    let pipeline = Arc::new(ToolPipeline::new(limiter, catalog, probe, tools));

    let server = McpServer::new(pipeline);
    let transport = StdioTransport::new();

    server.run(transport, shutdown_signal(), DRAIN_TIMEOUT).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(target: "server", error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }
}
