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

//! Compiled-in defaults for every bucket and the shared backoff curve.
//! Overridable per class via environment variables at the
//! `<CLASS>_*` names documented for `ServerConfig::load`.

use serde::{Deserialize, Serialize};

use super::OperationClass;

/// Per-operation-class bucket shape. Every field here is independently
/// overridable from the environment; see `config::env_overrides`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub tokens_per_interval: u32,
    pub interval_ms: u64,
    pub max_bucket_size: u32,
    pub max_daily_requests: u32,
    pub max_concurrent_requests: u32,
    pub concurrent_limit_wait_ms: u64,
}

impl BucketConfig {
    const fn new(
        tokens_per_interval: u32,
        interval_ms: u64,
        max_bucket_size: u32,
        max_daily_requests: u32,
        max_concurrent_requests: u32,
    ) -> Self {
        BucketConfig {
            tokens_per_interval,
            interval_ms,
            max_bucket_size,
            max_daily_requests,
            max_concurrent_requests,
            concurrent_limit_wait_ms: 1000,
        }
    }
}

/// Shared exponential-backoff-with-jitter curve applied on repeated
/// denial, independent of which gate denied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Compiled-in `(class, config)` rows for the six tool-bound classes.
/// `Ping`/`Traceroute` are deliberately absent: no tool ever binds to
/// them, so no bucket is ever constructed for them.
pub fn default_bucket_configs() -> Vec<(OperationClass, BucketConfig)> {
    vec![
        (
            OperationClass::SpeedTest,
            BucketConfig::new(1, 180_000, 2, 50, 1),
        ),
        (
            OperationClass::LatencyTest,
            BucketConfig::new(10, 60_000, 15, 500, 3),
        ),
        (
            OperationClass::DownloadTest,
            BucketConfig::new(2, 120_000, 3, 100, 2),
        ),
        (
            OperationClass::UploadTest,
            BucketConfig::new(2, 120_000, 3, 100, 2),
        ),
        (
            OperationClass::PacketLossTest,
            BucketConfig::new(5, 90_000, 8, 200, 2),
        ),
        (
            OperationClass::ConnectionInfo,
            BucketConfig::new(20, 60_000, 30, 1_000, 5),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_one_row_per_bindable_class() {
        let configs = default_bucket_configs();
        assert_eq!(configs.len(), OperationClass::bindable().len());
        for class in OperationClass::bindable() {
            assert!(configs.iter().any(|(c, _)| *c == class), "missing {class}");
        }
    }

    #[test]
    fn speed_test_row_matches_documented_defaults() {
        let configs = default_bucket_configs();
        let (_, cfg) = configs
            .iter()
            .find(|(c, _)| *c == OperationClass::SpeedTest)
            .unwrap();
        assert_eq!(cfg.tokens_per_interval, 1);
        assert_eq!(cfg.interval_ms, 180_000);
        assert_eq!(cfg.max_bucket_size, 2);
        assert_eq!(cfg.max_daily_requests, 50);
        assert_eq!(cfg.max_concurrent_requests, 1);
        assert_eq!(cfg.concurrent_limit_wait_ms, 1000);
    }

    #[test]
    fn backoff_defaults_match_documented_curve() {
        let b = BackoffConfig::default();
        assert_eq!(b.base_delay_ms, 1_000);
        assert_eq!(b.max_delay_ms, 60_000);
        assert_eq!(b.backoff_multiplier, 2.0);
        assert_eq!(b.jitter_factor, 0.1);
    }
}
