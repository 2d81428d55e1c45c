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

//! Per-operation-class admission control: token bucket + daily cap +
//! concurrent-invocation cap + backoff-with-jitter on repeated denial.
//!
//! The limiter never blocks, never schedules, and never performs I/O —
//! it is a pure state machine behind a per-bucket `parking_lot::Mutex`,
//! grounded on `admission.rs`'s `TokenBucket` (refill-on-touch, a
//! `Mutex`-guarded refill anchor) from the teacher crate.

mod config;

pub use config::{default_bucket_configs, BackoffConfig, BucketConfig};

use crate::clock::{backoff_with_jitter, start_of_next_local_day, unix_millis_now, Clock, SystemClock};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Rate-limit bucket identity. Every tool binds statically to exactly
/// one. `Ping` and `Traceroute` are reserved for future tools and are
/// never bound — invoking the limiter with them fails with
/// `InvalidOperation` because no bucket is registered for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    SpeedTest,
    LatencyTest,
    DownloadTest,
    UploadTest,
    PacketLossTest,
    ConnectionInfo,
    Ping,
    Traceroute,
}

impl OperationClass {
    /// The lowercase-underscore tag used in config, logs, and schemas.
    pub fn tag(&self) -> &'static str {
        match self {
            OperationClass::SpeedTest => "speed_test",
            OperationClass::LatencyTest => "latency_test",
            OperationClass::DownloadTest => "download_test",
            OperationClass::UploadTest => "upload_test",
            OperationClass::PacketLossTest => "packet_loss_test",
            OperationClass::ConnectionInfo => "connection_info",
            OperationClass::Ping => "ping",
            OperationClass::Traceroute => "traceroute",
        }
    }

    /// Deterministic env-var derivation (spec.md §9, open question 2):
    /// `tag.to_uppercase()`, applied uniformly.
    pub fn env_segment(&self) -> String {
        self.tag().to_uppercase()
    }

    /// The six classes a tool can actually bind to.
    pub fn bindable() -> [OperationClass; 6] {
        [
            OperationClass::SpeedTest,
            OperationClass::LatencyTest,
            OperationClass::DownloadTest,
            OperationClass::UploadTest,
            OperationClass::PacketLossTest,
            OperationClass::ConnectionInfo,
        ]
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Why an admission was denied. Order here matches the gate-evaluation
/// order (concurrent -> daily -> token) and is part of the documented
/// contract: concurrency pressure is transient, daily is slow-reset,
/// token is medium-reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    TokenBucket,
    DailyLimit,
    ConcurrentLimit,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionResult {
    pub allowed: bool,
    pub remaining_tokens: Option<u32>,
    pub wait_time_ms: Option<u64>,
    pub daily_requests_remaining: Option<u32>,
    pub reason: Option<DenyReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub tokens_remaining: u32,
    pub daily_requests_remaining: u32,
    pub concurrent_requests: u32,
    pub next_token_refill_ms: u64,
    pub daily_reset_time_ms: i64,
}

#[derive(Debug, Error)]
pub enum RateLimiterError {
    #[error("rate limit exceeded for {op}: reason={reason:?} wait_ms={wait_time_ms}")]
    RateLimitExceeded {
        op: OperationClass,
        wait_time_ms: u64,
        reason: DenyReason,
    },
    #[error("unknown operation class: {0}")]
    InvalidOperation(String),
}

/// Mutable bucket state, one per `OperationClass`. See spec.md §3 for
/// the invariants this struct upholds.
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    daily_request_count: u32,
    daily_reset_time_ms: i64,
    concurrent_requests: u32,
    consecutive_failures: u32,
}

impl BucketState {
    fn fresh(config: &BucketConfig, now: Instant, now_unix_ms: i64) -> Self {
        Self {
            tokens: config.max_bucket_size as f64,
            last_refill: now,
            daily_request_count: 0,
            daily_reset_time_ms: start_of_next_local_day(now_unix_ms),
            concurrent_requests: 0,
            consecutive_failures: 0,
        }
    }
}

struct Bucket {
    config: BucketConfig,
    state: Mutex<BucketState>,
}

pub struct RateLimiter {
    buckets: DashMap<OperationClass, Bucket>,
    backoff: BackoffConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(configs: impl IntoIterator<Item = (OperationClass, BucketConfig)>, backoff: BackoffConfig) -> Arc<Self> {
        Self::with_clock(configs, backoff, Arc::new(SystemClock))
    }

    pub fn with_clock(
        configs: impl IntoIterator<Item = (OperationClass, BucketConfig)>,
        backoff: BackoffConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let now = clock.now();
        let now_unix = unix_millis_now();
        let buckets = DashMap::new();
        for (op, config) in configs {
            let state = Mutex::new(BucketState::fresh(&config, now, now_unix));
            buckets.insert(op, Bucket { config, state });
        }
        Arc::new(Self { buckets, backoff, clock })
    }

    /// Refill stale tokens, reset the daily count if past boundary, and
    /// evaluate concurrent -> daily -> token gates in order. On success,
    /// consumes one token, increments the daily count, and clears
    /// `consecutive_failures`. Never increments `concurrent_requests` —
    /// that is `acquire`'s job, performed under this same lock.
    pub fn check_and_consume(&self, op: OperationClass) -> Result<AdmissionResult, RateLimiterError> {
        let bucket = self
            .buckets
            .get(&op)
            .ok_or_else(|| RateLimiterError::InvalidOperation(op.tag().to_string()))?;
        let now = self.clock.now();
        let now_unix = unix_millis_now();
        let mut state = bucket.state.lock();
        Ok(Self::admit_locked(&mut state, &bucket.config, now, now_unix))
    }

    /// The gate evaluation shared by `check_and_consume` and `acquire`,
    /// run against an already-locked `state`. Kept as one function so
    /// the concurrent-gate check and any subsequent `concurrent_requests`
    /// increment happen under a single critical section — never two
    /// separate lock acquisitions, which would let two callers both pass
    /// the gate before either increments.
    fn admit_locked(state: &mut BucketState, config: &BucketConfig, now: Instant, now_unix: i64) -> AdmissionResult {
        refill(state, config, now);
        if now_unix >= state.daily_reset_time_ms {
            state.daily_request_count = 0;
            state.daily_reset_time_ms = start_of_next_local_day(now_unix);
        }

        if state.concurrent_requests >= config.max_concurrent_requests {
            return AdmissionResult {
                allowed: false,
                remaining_tokens: Some(state.tokens as u32),
                wait_time_ms: Some(config.concurrent_limit_wait_ms),
                daily_requests_remaining: Some(config.max_daily_requests.saturating_sub(state.daily_request_count)),
                reason: Some(DenyReason::ConcurrentLimit),
            };
        }

        if state.daily_request_count >= config.max_daily_requests {
            let wait = (state.daily_reset_time_ms - now_unix).max(0) as u64;
            return AdmissionResult {
                allowed: false,
                remaining_tokens: Some(state.tokens as u32),
                wait_time_ms: Some(wait),
                daily_requests_remaining: Some(0),
                reason: Some(DenyReason::DailyLimit),
            };
        }

        if state.tokens < 1.0 {
            let elapsed_in_interval = now.duration_since(state.last_refill).as_millis() as u64 % config.interval_ms;
            let wait = config.interval_ms - elapsed_in_interval;
            return AdmissionResult {
                allowed: false,
                remaining_tokens: Some(0),
                wait_time_ms: Some(wait),
                daily_requests_remaining: Some(config.max_daily_requests.saturating_sub(state.daily_request_count)),
                reason: Some(DenyReason::TokenBucket),
            };
        }

        state.tokens -= 1.0;
        state.daily_request_count += 1;
        state.consecutive_failures = 0;

        AdmissionResult {
            allowed: true,
            remaining_tokens: Some(state.tokens as u32),
            wait_time_ms: None,
            daily_requests_remaining: Some(config.max_daily_requests.saturating_sub(state.daily_request_count)),
            reason: None,
        }
    }

    /// Admit, or fail with `RateLimitExceeded` carrying an advisory wait
    /// hint (the larger of the admission wait and the backoff delay).
    /// On success, returns a scoped guard whose `Drop` calls `release`
    /// exactly once — never release manually on a held guard. The gate
    /// evaluation and the `concurrent_requests` increment happen under
    /// one lock acquisition, so two racing callers can never both pass
    /// the concurrency gate.
    pub fn acquire(self: &Arc<Self>, op: OperationClass) -> Result<ReleaseGuard, RateLimiterError> {
        let bucket = self
            .buckets
            .get(&op)
            .ok_or_else(|| RateLimiterError::InvalidOperation(op.tag().to_string()))?;
        let now = self.clock.now();
        let now_unix = unix_millis_now();

        let mut state = bucket.state.lock();
        let admission = Self::admit_locked(&mut state, &bucket.config, now, now_unix);

        if admission.allowed {
            state.concurrent_requests += 1;
            drop(state);
            drop(bucket);
            Ok(ReleaseGuard {
                limiter: Arc::clone(self),
                op,
                released: false,
            })
        } else {
            let attempts = state.consecutive_failures;
            let backoff_delay = backoff_with_jitter(
                self.backoff.base_delay_ms,
                self.backoff.max_delay_ms,
                self.backoff.backoff_multiplier,
                self.backoff.jitter_factor,
                attempts,
            );
            state.consecutive_failures = attempts.saturating_add(1);
            drop(state);
            drop(bucket);

            let wait_time_ms = admission.wait_time_ms.unwrap_or(0).max(backoff_delay);
            tracing::warn!(
                target: "rate_limiter",
                op = %op,
                reason = ?admission.reason,
                wait_time_ms,
                "admission denied"
            );
            Err(RateLimiterError::RateLimitExceeded {
                op,
                wait_time_ms,
                reason: admission.reason.expect("denied admission always carries a reason"),
            })
        }
    }

    /// Decrement `concurrent_requests`, clamped at 0. Called by
    /// `ReleaseGuard::drop`; exposed directly only for tests.
    fn release(&self, op: OperationClass) {
        if let Some(bucket) = self.buckets.get(&op) {
            let mut state = bucket.state.lock();
            state.concurrent_requests = state.concurrent_requests.saturating_sub(1);
        }
    }

    /// Non-mutating (from the caller's perspective — internally still
    /// refills so the snapshot is accurate) status read.
    pub fn status(&self, op: OperationClass) -> Result<BucketStatus, RateLimiterError> {
        let bucket = self
            .buckets
            .get(&op)
            .ok_or_else(|| RateLimiterError::InvalidOperation(op.tag().to_string()))?;
        let now = self.clock.now();
        let now_unix = unix_millis_now();
        let mut state = bucket.state.lock();
        refill(&mut state, &bucket.config, now);
        if now_unix >= state.daily_reset_time_ms {
            state.daily_request_count = 0;
            state.daily_reset_time_ms = start_of_next_local_day(now_unix);
        }

        let next_refill_ms = if state.tokens >= bucket.config.max_bucket_size as f64 {
            0
        } else {
            let elapsed = now.duration_since(state.last_refill).as_millis() as u64 % bucket.config.interval_ms;
            bucket.config.interval_ms - elapsed
        };

        Ok(BucketStatus {
            tokens_remaining: state.tokens as u32,
            daily_requests_remaining: bucket.config.max_daily_requests.saturating_sub(state.daily_request_count),
            concurrent_requests: state.concurrent_requests,
            next_token_refill_ms: next_refill_ms,
            daily_reset_time_ms: state.daily_reset_time_ms,
        })
    }

    /// Reinitialize one bucket, or all bound buckets when `op` is `None`.
    pub fn reset(&self, op: Option<OperationClass>) {
        let now = self.clock.now();
        let now_unix = unix_millis_now();
        match op {
            Some(op) => {
                if let Some(bucket) = self.buckets.get(&op) {
                    *bucket.state.lock() = BucketState::fresh(&bucket.config, now, now_unix);
                }
            }
            None => {
                for entry in self.buckets.iter() {
                    *entry.state.lock() = BucketState::fresh(&entry.config, now, now_unix);
                }
            }
        }
    }
}

/// Continuous, integer-tick refill: `k = floor(delta / interval_ms)`
/// whole intervals are added and the anchor advances by exactly
/// `k * interval_ms`, never by the full elapsed delta — this is what
/// keeps refill free of fractional drift (spec.md §4.1).
fn refill(state: &mut BucketState, config: &BucketConfig, now: Instant) {
    let delta_ms = now.duration_since(state.last_refill).as_millis() as u64;
    if delta_ms < config.interval_ms {
        return;
    }
    let k = delta_ms / config.interval_ms;
    let room = (config.max_bucket_size as f64 - state.tokens).max(0.0);
    let added = ((k * config.tokens_per_interval as u64) as f64).min(room);
    state.tokens += added;
    state.last_refill += Duration::from_millis(k * config.interval_ms);
}

/// Scoped release — the only correct way to guarantee a `release` for
/// every successful `acquire` on all exit paths (spec.md §8, property 3;
/// "Scoped release" in spec.md §9). Never call `RateLimiter::release`
/// directly; let this guard drop.
pub struct ReleaseGuard {
    limiter: Arc<RateLimiter>,
    op: OperationClass,
    released: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.released {
            self.limiter.release(self.op);
            self.released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// A clock that only advances when told to, for deterministic tests.
    struct FakeClock {
        start: Instant,
        offset_ms: AtomicU64,
    }

    impl FakeClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                start: Instant::now(),
                offset_ms: AtomicU64::new(0),
            })
        }
        fn advance_ms(&self, ms: u64) {
            self.offset_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.start + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
        }
    }

    fn speed_test_config() -> BucketConfig {
        BucketConfig {
            tokens_per_interval: 1,
            interval_ms: 180_000,
            max_bucket_size: 2,
            max_daily_requests: 50,
            max_concurrent_requests: 1,
            concurrent_limit_wait_ms: 1000,
        }
    }

    fn backoff() -> BackoffConfig {
        BackoffConfig {
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    // E1 — token denial
    #[test]
    fn e1_token_denial_and_refill() {
        let clock = FakeClock::new();
        let limiter = RateLimiter::with_clock(
            [(OperationClass::SpeedTest, speed_test_config())],
            backoff(),
            clock.clone(),
        );

        let a1 = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(a1.allowed);
        assert_eq!(a1.remaining_tokens, Some(1));

        let a2 = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(a2.allowed);
        assert_eq!(a2.remaining_tokens, Some(0));

        let a3 = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(!a3.allowed);
        assert_eq!(a3.reason, Some(DenyReason::TokenBucket));
        assert_eq!(a3.wait_time_ms, Some(180_000));

        clock.advance_ms(180_000);
        let a4 = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(a4.allowed);
        assert_eq!(a4.remaining_tokens, Some(0));
    }

    // E2 — daily reset (scaled down from 50 admissions for test speed;
    // same mechanics, smaller cap)
    #[test]
    fn e2_daily_cap_denies_then_resets() {
        let clock = FakeClock::new();
        let mut config = speed_test_config();
        config.max_daily_requests = 2;
        config.interval_ms = 1; // token bucket must not be the bottleneck here
        config.max_bucket_size = 1000;
        config.tokens_per_interval = 1000;
        let limiter = RateLimiter::with_clock(
            [(OperationClass::SpeedTest, config)],
            backoff(),
            clock.clone(),
        );

        assert!(limiter.check_and_consume(OperationClass::SpeedTest).unwrap().allowed);
        assert!(limiter.check_and_consume(OperationClass::SpeedTest).unwrap().allowed);
        let denied = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, Some(DenyReason::DailyLimit));

        let status = limiter.status(OperationClass::SpeedTest).unwrap();
        assert_eq!(status.daily_requests_remaining, 0);
    }

    // E3 — concurrency
    #[test]
    fn e3_concurrency_denies_then_allows_after_release() {
        let limiter = RateLimiter::new([(OperationClass::SpeedTest, speed_test_config())], backoff());

        let guard1 = limiter.acquire(OperationClass::SpeedTest).unwrap();
        let err = limiter.acquire(OperationClass::SpeedTest).unwrap_err();
        match err {
            RateLimiterError::RateLimitExceeded { reason, wait_time_ms, .. } => {
                assert_eq!(reason, DenyReason::ConcurrentLimit);
                assert!(wait_time_ms >= 1000);
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }

        drop(guard1);
        let guard2 = limiter.acquire(OperationClass::SpeedTest);
        assert!(guard2.is_ok());
    }

    #[test]
    fn invalid_operation_for_unbound_class() {
        let limiter = RateLimiter::new([(OperationClass::SpeedTest, speed_test_config())], backoff());
        let err = limiter.check_and_consume(OperationClass::Ping).unwrap_err();
        assert!(matches!(err, RateLimiterError::InvalidOperation(_)));
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let limiter = RateLimiter::new([(OperationClass::SpeedTest, speed_test_config())], backoff());
        limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        let _ = limiter.acquire(OperationClass::SpeedTest); // denied, bumps consecutive_failures
        limiter.reset(Some(OperationClass::SpeedTest));
        let a = limiter.check_and_consume(OperationClass::SpeedTest).unwrap();
        assert!(a.allowed);
    }

    #[test]
    fn release_never_goes_negative() {
        let limiter = RateLimiter::new([(OperationClass::SpeedTest, speed_test_config())], backoff());
        limiter.release(OperationClass::SpeedTest);
        limiter.release(OperationClass::SpeedTest);
        let status = limiter.status(OperationClass::SpeedTest).unwrap();
        assert_eq!(status.concurrent_requests, 0);
    }
}
