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

//! Fetch-once-then-cache catalog of edge servers: single-flight refresh,
//! 5-minute TTL, stale-on-error, continent inference, and distance-based
//! filtering/sorting.

mod continent;

pub use continent::infer_continent;

use crate::clock::haversine_km;
use crate::probe::{ProbeClient, ProbeError};
use crate::rate_limiter::{OperationClass, RateLimiter, RateLimiterError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

/// One edge server, raw fields plus the enrichment the catalog fills in
/// once it has a user location to compare against.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEntry {
    pub name: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub continent: Option<String>,
    pub distance_km: Option<f64>,
    pub status: ServerStatus,
    pub last_checked: i64,
}

impl ServerEntry {
    /// Construct a raw entry as returned by `ProbeClient::list_servers`,
    /// pre-enrichment: no continent, no distance, status unknown.
    pub fn raw(
        name: impl Into<String>,
        city: impl Into<String>,
        region: impl Into<String>,
        country: impl Into<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        now_unix_ms: i64,
    ) -> Self {
        let city = city.into();
        let region = region.into();
        ServerEntry {
            name: name.into(),
            location: format!("{city}, {region}"),
            city,
            region,
            country: country.into(),
            latitude,
            longitude,
            continent: None,
            distance_km: None,
            status: ServerStatus::Unknown,
            last_checked: now_unix_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Online,
    Offline,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct UserLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Conjunctive filter over `list`. Every `Some` field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct ServerFilter {
    pub name: Option<String>,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub max_distance_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Valid,
    Stale,
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub by_continent: HashMap<String, usize>,
    pub by_country: HashMap<String, usize>,
    pub cache_status: CacheStatus,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog discovery denied: {0}")]
    AdmissionDenied(#[from] RateLimiterError),
    #[error("catalog fetch failed: {0}")]
    Fetch(#[from] ProbeError),
}

const CACHE_TTL_MS: u64 = 300_000;
/// Deadline given to the `connection_info`-classed fetch itself; the
/// catalog is not a tool invocation so it does not inherit a caller's
/// per-call timeout.
const FETCH_DEADLINE_MS: u64 = 30_000;

struct CacheCell {
    entries: Vec<ServerEntry>,
    fetched_at: Option<Instant>,
}

/// Singleton edge-server cache. Cheap to clone (`Arc` internally held by
/// callers); construct once and share.
pub struct ServerCatalog {
    probe: Arc<dyn ProbeClient>,
    limiter: Arc<RateLimiter>,
    cache: AsyncMutex<CacheCell>,
}

impl ServerCatalog {
    pub fn new(probe: Arc<dyn ProbeClient>, limiter: Arc<RateLimiter>) -> Arc<Self> {
        Arc::new(Self {
            probe,
            limiter,
            cache: AsyncMutex::new(CacheCell {
                entries: Vec::new(),
                fetched_at: None,
            }),
        })
    }

    /// Returns cached entries (refreshing first if stale/empty), filtered
    /// and, when `user_location` is given, distance-enriched and sorted
    /// ascending by distance (undistanced entries sort last).
    pub async fn list(
        &self,
        filter: Option<&ServerFilter>,
        user_location: Option<UserLocation>,
    ) -> Result<Vec<ServerEntry>, CatalogError> {
        let mut entries = self.ensure_fresh().await?;

        if let Some(loc) = user_location {
            for entry in &mut entries {
                entry.distance_km = match (entry.latitude, entry.longitude) {
                    (Some(lat), Some(lon)) => haversine_km(loc.latitude, loc.longitude, lat, lon),
                    _ => None,
                };
            }
        }

        if let Some(filter) = filter {
            entries.retain(|e| matches_filter(e, filter));
        }

        entries.sort_by(|a, b| match (a.distance_km, b.distance_km) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(entries)
    }

    /// Exact, case-sensitive lookup by code.
    pub async fn get(&self, name: &str) -> Result<Option<ServerEntry>, CatalogError> {
        let entries = self.ensure_fresh().await?;
        Ok(entries.into_iter().find(|e| e.name == name))
    }

    /// Conjunctive match on the provided fields only.
    pub async fn by_location(
        &self,
        city: Option<&str>,
        country: Option<&str>,
        region: Option<&str>,
    ) -> Result<Vec<ServerEntry>, CatalogError> {
        let entries = self.ensure_fresh().await?;
        Ok(entries
            .into_iter()
            .filter(|e| {
                city.map_or(true, |c| e.city == c)
                    && country.map_or(true, |c| e.country == c)
                    && region.map_or(true, |r| e.region == r)
            })
            .collect())
    }

    pub async fn stats(&self) -> CatalogStats {
        let cache = self.cache.lock().await;
        let mut by_continent = HashMap::new();
        let mut by_country = HashMap::new();
        for entry in &cache.entries {
            let continent = entry
                .continent
                .clone()
                .unwrap_or_else(|| infer_continent(&entry.country).unwrap_or("unknown").to_string());
            *by_continent.entry(continent).or_insert(0) += 1;
            *by_country.entry(entry.country.clone()).or_insert(0) += 1;
        }
        CatalogStats {
            total: cache.entries.len(),
            by_continent,
            by_country,
            cache_status: cache_status(&cache),
        }
    }

    /// Invalidate the cache; the next call refetches.
    pub async fn clear(&self) {
        let mut cache = self.cache.lock().await;
        cache.entries.clear();
        cache.fetched_at = None;
    }

    /// Single-flight refresh: holds the cache mutex across the fetch, so
    /// a second concurrent caller simply waits on the same lock rather
    /// than issuing its own upstream request.
    async fn ensure_fresh(&self) -> Result<Vec<ServerEntry>, CatalogError> {
        let mut cache = self.cache.lock().await;
        if is_fresh(&cache) {
            return Ok(cache.entries.clone());
        }

        let admission = self.limiter.check_and_consume(OperationClass::ConnectionInfo)?;
        if !admission.allowed {
            return Err(CatalogError::AdmissionDenied(RateLimiterError::RateLimitExceeded {
                op: OperationClass::ConnectionInfo,
                wait_time_ms: admission.wait_time_ms.unwrap_or(0),
                reason: admission.reason.expect("denied admission always carries a reason"),
            }));
        }

        match self.probe.list_servers(FETCH_DEADLINE_MS).await {
            Ok(mut raw) => {
                for entry in &mut raw {
                    entry.continent = infer_continent(&entry.country).map(str::to_string);
                }
                cache.entries = raw;
                cache.fetched_at = Some(Instant::now());
                Ok(cache.entries.clone())
            }
            Err(e) => {
                if !cache.entries.is_empty() {
                    tracing::warn!(target: "catalog", error = %e, "serving stale catalog after fetch failure");
                    Ok(cache.entries.clone())
                } else {
                    Err(CatalogError::Fetch(e))
                }
            }
        }
    }
}

fn is_fresh(cache: &CacheCell) -> bool {
    match cache.fetched_at {
        Some(t) => t.elapsed() < Duration::from_millis(CACHE_TTL_MS) && !cache.entries.is_empty(),
        None => false,
    }
}

fn cache_status(cache: &CacheCell) -> CacheStatus {
    match cache.fetched_at {
        None => CacheStatus::Empty,
        Some(_) if cache.entries.is_empty() => CacheStatus::Empty,
        Some(t) if t.elapsed() < Duration::from_millis(CACHE_TTL_MS) => CacheStatus::Valid,
        Some(_) => CacheStatus::Stale,
    }
}

fn matches_filter(entry: &ServerEntry, filter: &ServerFilter) -> bool {
    if let Some(name) = &filter.name {
        if &entry.name != name {
            return false;
        }
    }
    if let Some(continent) = &filter.continent {
        if entry.continent.as_deref() != Some(continent.as_str()) {
            return false;
        }
    }
    if let Some(country) = &filter.country {
        if &entry.country != country {
            return false;
        }
    }
    if let Some(region) = &filter.region {
        if &entry.region != region {
            return false;
        }
    }
    if let Some(max_distance) = filter.max_distance_km {
        if let Some(distance) = entry.distance_km {
            if distance > max_distance {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::test_support::StubProbeClient;
    use crate::rate_limiter::BackoffConfig;

    fn four_us_servers() -> Vec<ServerEntry> {
        vec![
            ServerEntry::raw("LAX", "Los Angeles", "CA", "US", Some(33.94), Some(-118.41), 0),
            ServerEntry::raw("SFO", "San Francisco", "CA", "US", Some(37.62), Some(-122.38), 0),
            ServerEntry::raw("JFK", "New York", "NY", "US", Some(40.64), Some(-73.78), 0),
            ServerEntry::raw("EWR", "Newark", "NJ", "US", Some(40.69), Some(-74.17), 0),
        ]
    }

    fn limiter() -> Arc<RateLimiter> {
        RateLimiter::new(crate::rate_limiter::default_bucket_configs(), BackoffConfig::default())
    }

    // E4 — catalog filter
    #[tokio::test]
    async fn e4_filters_by_country_and_region() {
        let probe = Arc::new(StubProbeClient::with_servers(four_us_servers()));
        let catalog = ServerCatalog::new(probe, limiter());

        let filter = ServerFilter {
            country: Some("US".to_string()),
            region: Some("CA".to_string()),
            ..Default::default()
        };
        let result = catalog.list(Some(&filter), None).await.unwrap();
        let mut names: Vec<_> = result.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["LAX", "SFO"]);
    }

    #[tokio::test]
    async fn get_is_exact_and_case_sensitive() {
        let probe = Arc::new(StubProbeClient::with_servers(four_us_servers()));
        let catalog = ServerCatalog::new(probe, limiter());
        assert!(catalog.get("LAX").await.unwrap().is_some());
        assert!(catalog.get("lax").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_sorts_by_distance_with_undistanced_last() {
        let mut servers = four_us_servers();
        servers.push(ServerEntry::raw("XXX", "Nowhere", "", "ZZ", None, None, 0));
        let probe = Arc::new(StubProbeClient::with_servers(servers));
        let catalog = ServerCatalog::new(probe, limiter());

        let result = catalog
            .list(
                None,
                Some(UserLocation {
                    latitude: 34.0522,
                    longitude: -118.2437,
                }),
            )
            .await
            .unwrap();
        assert_eq!(result.last().unwrap().name, "XXX");
        assert_eq!(result.first().unwrap().name, "LAX");
    }

    #[tokio::test]
    async fn stale_cache_served_on_fetch_failure() {
        let probe = Arc::new(StubProbeClient::with_servers(four_us_servers()));
        let catalog = ServerCatalog::new(probe.clone(), limiter());
        catalog.list(None, None).await.unwrap();

        probe.fail_next();
        let result = catalog.list(None, None).await.unwrap();
        assert_eq!(result.len(), 4);
    }

    #[tokio::test]
    async fn empty_cache_propagates_fetch_error() {
        let probe = Arc::new(StubProbeClient::with_servers(Vec::new()));
        probe.fail_next();
        let catalog = ServerCatalog::new(probe, limiter());
        assert!(catalog.list(None, None).await.is_err());
    }
}
