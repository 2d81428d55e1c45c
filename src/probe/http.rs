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

//! HTTP-backed `ProbeClient`: a plaintext trace endpoint, a JSON
//! locations endpoint, and a pair of throughput endpoints the edge
//! network exposes for download/upload measurement.

use super::{is_retryable_message, ConnectionTrace, ProbeClient, ProbeError, ProbeResults, ProbeShape};
use crate::catalog::ServerEntry;
use crate::clock::{backoff_with_jitter, unix_millis_now};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 1_000;
const RETRY_MAX_DELAY_MS: u64 = 10_000;
const RETRY_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct ProbeClientConfig {
    pub trace_url: String,
    pub locations_url: String,
    pub speed_test_base_url: String,
}

impl Default for ProbeClientConfig {
    fn default() -> Self {
        ProbeClientConfig {
            trace_url: "https://speed.cloudflare.com/cdn-cgi/trace".to_string(),
            locations_url: "https://speed.cloudflare.com/locations".to_string(),
            speed_test_base_url: "https://speed.cloudflare.com".to_string(),
        }
    }
}

pub struct HttpProbeClient {
    client: reqwest::Client,
    config: ProbeClientConfig,
}

impl HttpProbeClient {
    pub fn new(config: ProbeClientConfig) -> Self {
        HttpProbeClient {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Races `fut` against `deadline_ms`, retrying transient failures
    /// inside the deadline with exponential backoff. The overall
    /// deadline wraps the whole retry loop: one `TimeoutExceeded` per
    /// call, never one per attempt.
    async fn with_deadline_and_retries<T, F, Fut>(&self, deadline_ms: u64, mut attempt_fn: F) -> Result<T, ProbeError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProbeError>>,
    {
        let body = async {
            let mut attempt: u32 = 0;
            loop {
                match attempt_fn().await {
                    Ok(v) => return Ok(v),
                    Err(e) if attempt + 1 < MAX_ATTEMPTS && e.retryable() => {
                        let delay_ms = backoff_with_jitter(
                            RETRY_BASE_DELAY_MS,
                            RETRY_MAX_DELAY_MS,
                            RETRY_MULTIPLIER,
                            0.0,
                            attempt,
                        );
                        tracing::warn!(target: "probe", attempt, delay_ms, error = %e, "retrying probe call");
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match tokio::time::timeout(Duration::from_millis(deadline_ms), body).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::TimeoutExceeded { deadline_ms }),
        }
    }

    fn classify_reqwest_error(e: &reqwest::Error) -> ProbeError {
        let code = if e.is_timeout() {
            "TIMEOUT_ERROR"
        } else if e.is_connect() {
            "ECONNREFUSED"
        } else if e.is_request() {
            "NETWORK_ERROR"
        } else {
            "EXECUTION_ERROR"
        };
        let message = format!("{code}: {e}");
        ProbeError::Execution {
            retryable: is_retryable_message(&message),
            message,
        }
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    async fn run_probe(&self, shape: ProbeShape, deadline_ms: u64) -> Result<ProbeResults, ProbeError> {
        self.with_deadline_and_retries(deadline_ms, || async {
            let mut results = ProbeResults::default();

            if matches!(shape, ProbeShape::Latency | ProbeShape::Full) {
                let (latency, jitter) = self.measure_latency().await?;
                results.unloaded_latency_ms = Some(latency);
                results.jitter_ms = Some(jitter);
            }
            if matches!(shape, ProbeShape::Download | ProbeShape::Full) {
                results.download_bandwidth_bps = Some(self.measure_throughput(true, 10 * 1024 * 1024).await?);
            }
            if matches!(shape, ProbeShape::Upload | ProbeShape::Full) {
                results.upload_bandwidth_bps = Some(self.measure_throughput(false, 10 * 1024 * 1024).await?);
            }
            if matches!(shape, ProbeShape::PacketLoss | ProbeShape::Full) {
                let (sent, received) = self.measure_packet_loss(20).await?;
                results.packets_sent = Some(sent);
                results.packets_received = Some(received);
                results.packet_loss_fraction =
                    Some(1.0 - (received as f64 / sent.max(1) as f64));
            }

            Ok(results)
        })
        .await
    }

    async fn get_trace(&self, deadline_ms: u64) -> Result<ConnectionTrace, ProbeError> {
        self.with_deadline_and_retries(deadline_ms, || async {
            let resp = self
                .client
                .get(&self.config.trace_url)
                .send()
                .await
                .map_err(|e| Self::classify_reqwest_error(&e))?;
            let body = resp.text().await.map_err(|e| Self::classify_reqwest_error(&e))?;
            Ok(parse_trace(&body))
        })
        .await
    }

    async fn list_servers(&self, deadline_ms: u64) -> Result<Vec<ServerEntry>, ProbeError> {
        self.with_deadline_and_retries(deadline_ms, || async {
            let resp = self
                .client
                .get(&self.config.locations_url)
                .send()
                .await
                .map_err(|e| Self::classify_reqwest_error(&e))?;
            let raw: Vec<RawLocation> = resp.json().await.map_err(|e| Self::classify_reqwest_error(&e))?;
            let now = unix_millis_now();
            Ok(raw.into_iter().map(|r| r.into_entry(now)).collect())
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(&self.config.trace_url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

impl HttpProbeClient {
    async fn measure_latency(&self) -> Result<(f64, f64), ProbeError> {
        const SAMPLES: usize = 5;
        let mut samples = Vec::with_capacity(SAMPLES);
        for _ in 0..SAMPLES {
            let start = Instant::now();
            self.client
                .head(&self.config.trace_url)
                .send()
                .await
                .map_err(|e| Self::classify_reqwest_error(&e))?;
            samples.push(start.elapsed().as_secs_f64() * 1000.0);
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        Ok((mean, variance.sqrt()))
    }

    async fn measure_throughput(&self, download: bool, bytes: u64) -> Result<f64, ProbeError> {
        let start = Instant::now();
        if download {
            let url = format!("{}/__down?bytes={bytes}", self.config.speed_test_base_url);
            let resp = self.client.get(&url).send().await.map_err(|e| Self::classify_reqwest_error(&e))?;
            let body = resp.bytes().await.map_err(|e| Self::classify_reqwest_error(&e))?;
            let elapsed = start.elapsed().as_secs_f64().max(0.001);
            Ok((body.len() as f64 * 8.0) / elapsed)
        } else {
            let url = format!("{}/__up", self.config.speed_test_base_url);
            let payload = vec![0u8; bytes as usize];
            self.client
                .post(&url)
                .body(payload)
                .send()
                .await
                .map_err(|e| Self::classify_reqwest_error(&e))?;
            let elapsed = start.elapsed().as_secs_f64().max(0.001);
            Ok((bytes as f64 * 8.0) / elapsed)
        }
    }

    async fn measure_packet_loss(&self, count: u32) -> Result<(u32, u32), ProbeError> {
        let url = format!("{}/__down?bytes=0", self.config.speed_test_base_url);
        let mut received = 0u32;
        for _ in 0..count {
            if self.client.get(&url).send().await.map(|r| r.status().is_success()).unwrap_or(false) {
                received += 1;
            }
        }
        Ok((count, received))
    }
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    iata: String,
    city: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    cca2: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl RawLocation {
    fn into_entry(self, now_unix_ms: i64) -> ServerEntry {
        ServerEntry::raw(
            self.iata,
            self.city,
            self.region.unwrap_or_default(),
            self.cca2.unwrap_or_else(|| "unknown".to_string()),
            self.lat,
            self.lon,
            now_unix_ms,
        )
    }
}

/// Parses the plaintext `key=value` trace body the edge network serves,
/// one assignment per line. Fields absent from the body default to
/// `"unknown"` rather than being omitted.
fn parse_trace(body: &str) -> ConnectionTrace {
    let mut trace = ConnectionTrace::default();
    for line in body.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key {
            "ip" => trace.ip = value.to_string(),
            "isp" => trace.isp = value.to_string(),
            "loc" => trace.country = value.to_string(),
            "region" => trace.region = value.to_string(),
            "city" => trace.city = value.to_string(),
            "timezone" => trace.timezone = value.to_string(),
            _ => {}
        }
    }
    trace
}

#[cfg(test)]
mod tests {
    use super::*;

    // E6 — connection trace parse
    #[test]
    fn e6_parses_trace_body() {
        let body = "ip=1.2.3.4\nisp=Test ISP\nloc=US\nregion=CA\ncity=San Francisco\ntimezone=America/Los_Angeles";
        let trace = parse_trace(body);
        assert_eq!(trace.ip, "1.2.3.4");
        assert_eq!(trace.isp, "Test ISP");
        assert_eq!(trace.country, "US");
        assert_eq!(trace.region, "CA");
        assert_eq!(trace.city, "San Francisco");
        assert_eq!(trace.timezone, "America/Los_Angeles");
    }

    #[test]
    fn missing_trace_fields_default_to_unknown() {
        let trace = parse_trace("ip=1.2.3.4");
        assert_eq!(trace.ip, "1.2.3.4");
        assert_eq!(trace.isp, "unknown");
        assert_eq!(trace.timezone, "unknown");
    }
}
