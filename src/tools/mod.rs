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

//! The seven concrete tools: schema, operation-class binding, and
//! result shaping, registered by stable name in a `ToolCatalog`.

mod common;
mod connection_info;
mod download;
mod latency;
mod packet_loss;
mod server_info;
mod upload;

use crate::catalog::ServerCatalog;
use crate::pipeline::ToolError;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Handles a tool needs to do its work: the probe adapter and the
/// server catalog. Shared by every `Tool::run` implementation.
#[derive(Clone)]
pub struct ToolContext {
    pub probe: Arc<dyn crate::probe::ProbeClient>,
    pub catalog: Arc<ServerCatalog>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn operation_class(&self) -> OperationClass;
    fn default_timeout_ms(&self) -> u64;
    fn input_schema(&self) -> Value;

    /// Invariants a JSON Schema can't express (cross-field constraints,
    /// enum membership derived at runtime). Default: none.
    fn validate_extra(&self, _args: &Value) -> Result<(), ToolError> {
        Ok(())
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, deadline_ms: u64) -> Result<Value, ToolError>;

    /// Schema validation, then the common `{timeout, serverLocation}`
    /// range checks, then tool-specific invariants.
    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        common::validate_schema(&self.input_schema(), args)?;
        common::validate_common_args(args)?;
        self.validate_extra(args)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolListEntry {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Registry of the seven tools, by stable name.
pub struct ToolCatalog {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn with_defaults() -> Self {
        let catalog = ToolCatalog { tools: DashMap::new() };
        catalog.register(Arc::new(latency::TestLatency));
        catalog.register(Arc::new(download::TestDownloadSpeed));
        catalog.register(Arc::new(upload::TestUploadSpeed));
        catalog.register(Arc::new(packet_loss::TestPacketLoss));
        catalog.register(Arc::new(speed_test::RunSpeedTest));
        catalog.register(Arc::new(connection_info::GetConnectionInfo));
        catalog.register(Arc::new(server_info::GetServerInfo));
        catalog
    }

    fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<ToolListEntry> {
        self.tools
            .iter()
            .map(|entry| ToolListEntry {
                name: entry.key().clone(),
                description: entry.value().description().to_string(),
                input_schema: entry.value().input_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_seven_tools_with_unique_names() {
        let catalog = ToolCatalog::with_defaults();
        let entries = catalog.list();
        assert_eq!(entries.len(), 7);
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 7);
    }

    #[test]
    fn schemas_disallow_additional_properties() {
        let catalog = ToolCatalog::with_defaults();
        for entry in catalog.list() {
            assert_eq!(entry.input_schema["additionalProperties"], Value::Bool(false));
        }
    }
}
