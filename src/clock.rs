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

//! Monotonic time source and shared math: day boundaries, great-circle
//! distance, backoff-with-jitter. Kept dependency-free of any one
//! subsystem so the rate limiter and catalog can be tested without a
//! fake clock beyond the injection points below.

use chrono::{Local, TimeZone};
use std::time::Instant;

/// Injectable monotonic clock. Production code uses `Instant::now()`;
/// tests can swap in a fake that advances deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real wall/monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The wall-clock timestamp (Unix millis) of the next local-midnight
/// boundary strictly after `now`.
pub fn start_of_next_local_day(now_unix_ms: i64) -> i64 {
    let now = Local
        .timestamp_millis_opt(now_unix_ms)
        .single()
        .unwrap_or_else(Local::now);
    let next_midnight = (now + chrono::Duration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    Local
        .from_local_datetime(&next_midnight)
        .single()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(now_unix_ms + 86_400_000)
}

/// Current Unix time in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in decimal degrees, in km.
/// Returns `None` for out-of-range coordinates rather than erroring, per
/// spec (`|lat| <= 90 && |lon| <= 180`).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    if !is_valid_coord(lat1, lon1) || !is_valid_coord(lat2, lon2) {
        return None;
    }
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    Some(EARTH_RADIUS_KM * c)
}

fn is_valid_coord(lat: f64, lon: f64) -> bool {
    lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
}

/// `delay = min(base * multiplier^attempts, max) + jitter`, where
/// `jitter = delay * jitter_factor * (U(0,1) - 0.5)`, clamped at 0.
/// `attempts` is `consecutive_failures` pre-increment (0 on the first
/// denial yields exactly `base_delay_ms`).
pub fn backoff_with_jitter(
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: f64,
    jitter_factor: f64,
    attempts: u32,
) -> u64 {
    let raw = (base_delay_ms as f64) * multiplier.powi(attempts as i32);
    let capped = raw.min(max_delay_ms as f64);

    let spread = rand::random::<f64>() - 0.5;
    let jitter = capped * jitter_factor * spread;
    (capped + jitter).max(0.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_symmetric_and_bounded() {
        let la = (34.0522, -118.2437);
        let ny = (40.7128, -74.0060);
        let d1 = haversine_km(la.0, la.1, ny.0, ny.1).unwrap();
        let d2 = haversine_km(ny.0, ny.1, la.0, la.1).unwrap();
        assert!((d1 - d2).abs() < 1e-6);
        assert!(d1 > 0.0);
        assert!(d1 <= std::f64::consts::PI * EARTH_RADIUS_KM + 1.0);
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let d = haversine_km(10.0, 10.0, 10.0, 10.0).unwrap();
        assert!(d < 1e-9);
    }

    #[test]
    fn haversine_rejects_invalid_coordinates() {
        assert!(haversine_km(91.0, 0.0, 0.0, 0.0).is_none());
        assert!(haversine_km(0.0, 0.0, 0.0, 181.0).is_none());
    }

    #[test]
    fn backoff_zero_attempts_is_base_delay_within_jitter() {
        let d = backoff_with_jitter(1000, 60_000, 2.0, 0.0, 0);
        assert_eq!(d, 1000);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let d = backoff_with_jitter(1000, 5000, 2.0, 0.0, 10);
        assert_eq!(d, 5000);
    }

    #[test]
    fn next_local_day_is_strictly_after_now() {
        let now = unix_millis_now();
        let next = start_of_next_local_day(now);
        assert!(next > now);
        assert!(next - now <= 86_400_000 + 1);
    }
}
