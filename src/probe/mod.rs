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

//! Narrow interface over the edge network's probe engine: `run_probe`,
//! `get_trace`, `list_servers`, `health_check`. This is the only
//! subsystem permitted to perform network I/O; everything above it
//! depends only on the `ProbeClient` trait, never on `HttpProbeClient`
//! directly, so tests can swap in a stub.

mod http;
#[cfg(test)]
pub mod test_support;

pub use http::{HttpProbeClient, ProbeClientConfig};

use crate::catalog::ServerEntry;
use async_trait::async_trait;
use thiserror::Error;

/// Which measurement `run_probe` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeShape {
    Latency,
    Download,
    Upload,
    PacketLoss,
    Full,
}

/// Everything a probe run can report. Fields the requested `ProbeShape`
/// doesn't cover are `None`; the Tool Pipeline's shapers turn `None`
/// into the documented `null`/`0` sentinels, never leaving them absent.
#[derive(Debug, Clone, Default)]
pub struct ProbeResults {
    pub download_bandwidth_bps: Option<f64>,
    pub upload_bandwidth_bps: Option<f64>,
    pub unloaded_latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub packet_loss_fraction: Option<f64>,
    pub packets_sent: Option<u32>,
    pub packets_received: Option<u32>,
}

/// Fields default to the literal `"unknown"` when the upstream trace is
/// missing them, per contract.
#[derive(Debug, Clone)]
pub struct ConnectionTrace {
    pub ip: String,
    pub isp: String,
    pub country: String,
    pub region: String,
    pub city: String,
    pub timezone: String,
}

impl Default for ConnectionTrace {
    fn default() -> Self {
        let unknown = || "unknown".to_string();
        ConnectionTrace {
            ip: unknown(),
            isp: unknown(),
            country: unknown(),
            region: unknown(),
            city: unknown(),
            timezone: unknown(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("probe execution failed: {message}")]
    Execution { message: String, retryable: bool },
    #[error("probe deadline of {deadline_ms}ms exceeded")]
    TimeoutExceeded { deadline_ms: u64 },
}

impl ProbeError {
    /// Whether the transport-level retry loop should try again. A
    /// `TimeoutExceeded` is the overall-deadline outcome, never itself
    /// retried — retries happen inside the deadline, not around it.
    fn retryable(&self) -> bool {
        matches!(self, ProbeError::Execution { retryable: true, .. })
    }
}

/// Substrings (or `error.code`-equivalents) that mark a transport
/// failure as transient and worth retrying.
const RETRYABLE_MARKERS: [&str; 6] = [
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "ECONNREFUSED",
    "NETWORK_ERROR",
    "TIMEOUT_ERROR",
];

fn is_retryable_message(message: &str) -> bool {
    RETRYABLE_MARKERS.iter().any(|m| message.contains(m))
}

#[async_trait]
pub trait ProbeClient: Send + Sync {
    async fn run_probe(&self, shape: ProbeShape, deadline_ms: u64) -> Result<ProbeResults, ProbeError>;
    async fn get_trace(&self, deadline_ms: u64) -> Result<ConnectionTrace, ProbeError>;
    async fn list_servers(&self, deadline_ms: u64) -> Result<Vec<ServerEntry>, ProbeError>;
    async fn health_check(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_markers_match_documented_set() {
        assert!(is_retryable_message("dial tcp: ECONNREFUSED"));
        assert!(is_retryable_message("request TIMEOUT_ERROR after 3 attempts"));
        assert!(!is_retryable_message("schema validation failed"));
    }
}
