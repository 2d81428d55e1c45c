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

//! In-memory `ProbeClient` for unit tests elsewhere in the crate —
//! configurable latency, one-shot failure injection, and canned
//! server/trace/results payloads.

use super::{ConnectionTrace, ProbeClient, ProbeError, ProbeResults, ProbeShape};
use crate::catalog::ServerEntry;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

pub struct StubProbeClient {
    servers: Mutex<Vec<ServerEntry>>,
    trace: Mutex<ConnectionTrace>,
    results: Mutex<ProbeResults>,
    fail_once: AtomicBool,
    delay_ms: AtomicU64,
    healthy: AtomicBool,
}

impl StubProbeClient {
    pub fn with_servers(servers: Vec<ServerEntry>) -> Self {
        StubProbeClient {
            servers: Mutex::new(servers),
            trace: Mutex::new(ConnectionTrace::default()),
            results: Mutex::new(ProbeResults::default()),
            fail_once: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn with_results(results: ProbeResults) -> Self {
        let stub = StubProbeClient::with_servers(Vec::new());
        *stub.results.lock().unwrap() = results;
        stub
    }

    /// The next call that can fail, fails once with a retryable error.
    pub fn fail_next(&self) {
        self.fail_once.store(true, Ordering::SeqCst);
    }

    /// Makes every call sleep this long before responding, to exercise
    /// deadline racing deterministically.
    pub fn set_delay_ms(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    async fn maybe_delay_and_fail(&self) -> Result<(), ProbeError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_once.swap(false, Ordering::SeqCst) {
            return Err(ProbeError::Execution {
                message: "NETWORK_ERROR: stub induced failure".to_string(),
                retryable: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ProbeClient for StubProbeClient {
    async fn run_probe(&self, _shape: ProbeShape, deadline_ms: u64) -> Result<ProbeResults, ProbeError> {
        match tokio::time::timeout(
            std::time::Duration::from_millis(deadline_ms),
            self.maybe_delay_and_fail(),
        )
        .await
        {
            Ok(Ok(())) => Ok(self.results.lock().unwrap().clone()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProbeError::TimeoutExceeded { deadline_ms }),
        }
    }

    async fn get_trace(&self, _deadline_ms: u64) -> Result<ConnectionTrace, ProbeError> {
        self.maybe_delay_and_fail().await?;
        Ok(self.trace.lock().unwrap().clone())
    }

    async fn list_servers(&self, _deadline_ms: u64) -> Result<Vec<ServerEntry>, ProbeError> {
        self.maybe_delay_and_fail().await?;
        Ok(self.servers.lock().unwrap().clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}
