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

//! Process-wide configuration, resolved with ascending precedence:
//! compiled-in defaults, an optional TOML file, then environment
//! variables. CLI flag overrides are applied by `main.rs` on top of the
//! result of `ServerConfig::load`.

use crate::probe::ProbeClientConfig;
use crate::rate_limiter::{default_bucket_configs, BackoffConfig, BucketConfig, OperationClass};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub rate_limiter: RateLimiterConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Keyed by `OperationClass::tag()` rather than the enum itself: most
/// serde-backed formats (TOML included) require string map keys.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimiterConfig {
    pub buckets: HashMap<String, BucketConfig>,
    pub backoff: BackoffConfig,
}

impl RateLimiterConfig {
    pub fn bucket_configs(&self) -> Vec<(OperationClass, BucketConfig)> {
        OperationClass::bindable()
            .into_iter()
            .filter_map(|class| self.buckets.get(class.tag()).map(|c| (class, *c)))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    pub trace_url: String,
    pub locations_url: String,
    pub speed_test_base_url: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let defaults = ProbeClientConfig::default();
        ProbeConfig {
            trace_url: defaults.trace_url,
            locations_url: defaults.locations_url,
            speed_test_base_url: defaults.speed_test_base_url,
        }
    }
}

impl From<ProbeConfig> for ProbeClientConfig {
    fn from(c: ProbeConfig) -> Self {
        ProbeClientConfig {
            trace_url: c.trace_url,
            locations_url: c.locations_url,
            speed_test_base_url: c.speed_test_base_url,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            rate_limiter: RateLimiterConfig {
                buckets: default_bucket_configs()
                    .into_iter()
                    .map(|(class, config)| (class.tag().to_string(), config))
                    .collect(),
                backoff: BackoffConfig::default(),
            },
            probe: ProbeConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Upper bounds from spec.md §6, enforced uniformly on every env var.
mod bounds {
    pub const TOKENS_PER_INTERVAL: u32 = 1000;
    pub const INTERVAL_MS: u64 = 24 * 3600 * 1000;
    pub const MAX_BUCKET_SIZE: u32 = 10_000;
    pub const MAX_DAILY_REQUESTS: u32 = 100_000;
    pub const MAX_CONCURRENT_REQUESTS: u32 = 100;
    pub const BACKOFF_BASE_DELAY_MS: u64 = 60_000;
    pub const BACKOFF_MAX_DELAY_MS: u64 = 600_000;
    pub const BACKOFF_MULTIPLIER: f64 = 10.0;
    pub const BACKOFF_JITTER_FACTOR: f64 = 1.0;
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Applies every `RATE_LIMIT_<CLASS>_*`, `RATE_LIMIT_BACKOFF_*`, and
    /// `LOG_LEVEL` env var found, in place. A malformed or out-of-bound
    /// value is rejected with `tracing::warn!` and the existing
    /// (compiled-in or file-loaded) value is kept.
    pub fn apply_env(&mut self) {
        for class in OperationClass::bindable() {
            let Some(bucket) = self.rate_limiter.buckets.get_mut(class.tag()) else {
                continue;
            };
            let prefix = format!("RATE_LIMIT_{}", class.env_segment());
            apply_bounded_u32(&mut bucket.tokens_per_interval, &format!("{prefix}_TOKENS_PER_INTERVAL"), bounds::TOKENS_PER_INTERVAL);
            apply_bounded_u64(&mut bucket.interval_ms, &format!("{prefix}_INTERVAL_MS"), bounds::INTERVAL_MS);
            apply_bounded_u32(&mut bucket.max_bucket_size, &format!("{prefix}_MAX_BUCKET_SIZE"), bounds::MAX_BUCKET_SIZE);
            apply_bounded_u32(&mut bucket.max_daily_requests, &format!("{prefix}_MAX_DAILY_REQUESTS"), bounds::MAX_DAILY_REQUESTS);
            apply_bounded_u32(
                &mut bucket.max_concurrent_requests,
                &format!("{prefix}_MAX_CONCURRENT_REQUESTS"),
                bounds::MAX_CONCURRENT_REQUESTS,
            );
        }

        apply_bounded_u64(
            &mut self.rate_limiter.backoff.base_delay_ms,
            "RATE_LIMIT_BACKOFF_BASE_DELAY_MS",
            bounds::BACKOFF_BASE_DELAY_MS,
        );
        apply_bounded_u64(
            &mut self.rate_limiter.backoff.max_delay_ms,
            "RATE_LIMIT_BACKOFF_MAX_DELAY_MS",
            bounds::BACKOFF_MAX_DELAY_MS,
        );
        apply_bounded_f64(
            &mut self.rate_limiter.backoff.backoff_multiplier,
            "RATE_LIMIT_BACKOFF_MULTIPLIER",
            bounds::BACKOFF_MULTIPLIER,
        );
        apply_bounded_f64(
            &mut self.rate_limiter.backoff.jitter_factor,
            "RATE_LIMIT_BACKOFF_JITTER_FACTOR",
            bounds::BACKOFF_JITTER_FACTOR,
        );

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if ["debug", "info", "warn", "error"].contains(&level.as_str()) {
                self.log_level = level;
            } else {
                tracing::warn!(target: "config", value = %level, "LOG_LEVEL invalid, keeping default");
            }
        }
    }

    /// Compiled-in defaults, then an optional file, then environment
    /// variables — ascending precedence.
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = match config_file {
            Some(path) if path.exists() => {
                tracing::info!(target: "config", path = %path.display(), "loading configuration file");
                Self::from_file(&path)?
            }
            Some(path) => {
                tracing::warn!(target: "config", path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !["debug", "info", "warn", "error"].contains(&self.log_level.as_str()) {
            anyhow::bail!("invalid log_level: {}", self.log_level);
        }
        for class in OperationClass::bindable() {
            if !self.rate_limiter.buckets.contains_key(class.tag()) {
                anyhow::bail!("missing bucket configuration for {class}");
            }
        }
        Ok(())
    }
}

fn apply_bounded_u32(target: &mut u32, var: &str, max: u32) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u32>() {
            Ok(value) if value <= max => *target = value,
            _ => tracing::warn!(target: "config", var, value = %raw, "rejected out-of-bound env value, keeping default"),
        }
    }
}

fn apply_bounded_u64(target: &mut u64, var: &str, max: u64) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<u64>() {
            Ok(value) if value <= max => *target = value,
            _ => tracing::warn!(target: "config", var, value = %raw, "rejected out-of-bound env value, keeping default"),
        }
    }
}

fn apply_bounded_f64(target: &mut f64, var: &str, max: f64) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 && value <= max => *target = value,
            _ => tracing::warn!(target: "config", var, value = %raw, "rejected out-of-bound env value, keeping default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_has_one_bucket_per_bindable_class() {
        let config = ServerConfig::default();
        assert_eq!(config.rate_limiter.buckets.len(), OperationClass::bindable().len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_override_within_bounds_is_applied() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("RATE_LIMIT_SPEED_TEST_MAX_DAILY_REQUESTS", "5");
        let mut config = ServerConfig::default();
        config.apply_env();
        std::env::remove_var("RATE_LIMIT_SPEED_TEST_MAX_DAILY_REQUESTS");
        assert_eq!(config.rate_limiter.buckets["speed_test"].max_daily_requests, 5);
    }

    #[test]
    fn env_override_above_bound_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let original = ServerConfig::default().rate_limiter.buckets["speed_test"].max_daily_requests;
        std::env::set_var("RATE_LIMIT_SPEED_TEST_MAX_DAILY_REQUESTS", "999999999");
        let mut config = ServerConfig::default();
        config.apply_env();
        std::env::remove_var("RATE_LIMIT_SPEED_TEST_MAX_DAILY_REQUESTS");
        assert_eq!(config.rate_limiter.buckets["speed_test"].max_daily_requests, original);
    }

    #[test]
    fn invalid_log_level_env_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LOG_LEVEL", "verbose");
        let mut config = ServerConfig::default();
        config.apply_env();
        std::env::remove_var("LOG_LEVEL");
        assert_eq!(config.log_level, "info");
    }
}
