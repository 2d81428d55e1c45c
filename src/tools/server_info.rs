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

use super::common::{build_schema, get_bool, get_f64, get_str, get_u64};
use super::{Tool, ToolContext};
use crate::catalog::ServerFilter;
use crate::pipeline::ToolError;
use crate::rate_limiter::OperationClass;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

pub struct GetServerInfo;

#[async_trait]
impl Tool for GetServerInfo {
    fn name(&self) -> &'static str {
        "get_server_info"
    }

    fn description(&self) -> &'static str {
        "List and filter known edge servers, optionally ranked by distance."
    }

    fn operation_class(&self) -> OperationClass {
        OperationClass::ConnectionInfo
    }

    fn default_timeout_ms(&self) -> u64 {
        15_000
    }

    fn input_schema(&self) -> Value {
        let mut props = Map::new();
        props.insert("continent".to_string(), json!({"type": "string"}));
        props.insert("country".to_string(), json!({"type": "string", "pattern": "^[A-Z]{2}$"}));
        props.insert("region".to_string(), json!({"type": "string"}));
        props.insert("maxDistance".to_string(), json!({"type": "number", "minimum": 0}));
        props.insert("includeDistance".to_string(), json!({"type": "boolean"}));
        props.insert("limit".to_string(), json!({"type": "integer", "minimum": 1, "maximum": 100}));
        build_schema(props, &[])
    }

    fn validate_extra(&self, args: &Value) -> Result<(), ToolError> {
        if let Some(country) = get_str(args, "country") {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(ToolError::validation("country must be a two-letter uppercase code"));
            }
        }
        Ok(())
    }

    async fn run(&self, args: &Value, ctx: &ToolContext, _deadline_ms: u64) -> Result<Value, ToolError> {
        let limit = get_u64(args, "limit", 20) as usize;
        let include_distance = get_bool(args, "includeDistance", false);

        let filter = ServerFilter {
            name: None,
            continent: get_str(args, "continent").map(str::to_string),
            country: get_str(args, "country").map(str::to_string),
            region: get_str(args, "region").map(str::to_string),
            max_distance_km: args.get("maxDistance").and_then(Value::as_f64),
        };
        let filter_applied = filter.continent.is_some()
            || filter.country.is_some()
            || filter.region.is_some()
            || filter.max_distance_km.is_some();

        let user_location = match (args.get("latitude"), args.get("longitude")) {
            (Some(_), Some(_)) => Some(crate::catalog::UserLocation {
                latitude: get_f64(args, "latitude", 0.0),
                longitude: get_f64(args, "longitude", 0.0),
            }),
            _ => None,
        };

        let mut servers = ctx.catalog.list(Some(&filter), user_location).await?;
        let total_servers = servers.len();
        servers.truncate(limit);

        let shaped: Vec<Value> = servers
            .iter()
            .map(|s| {
                let mut entry = json!({
                    "name": s.name,
                    "location": s.location,
                    "city": s.city,
                    "region": s.region,
                    "country": s.country,
                    "continent": s.continent,
                    "status": s.status,
                });
                if include_distance {
                    entry["distanceKm"] = json!(s.distance_km);
                }
                entry
            })
            .collect();

        let mut data = json!({
            "servers": shaped,
            "totalServers": total_servers,
            "filterApplied": filter_applied,
        });

        if let Some(loc) = user_location {
            data["userLocation"] = json!({"latitude": loc.latitude, "longitude": loc.longitude});
        }

        let stats = ctx.catalog.stats().await;
        data["stats"] = json!({
            "total": stats.total,
            "byContinent": stats.by_continent,
            "byCountry": stats.by_country,
            "cacheStatus": stats.cache_status,
        });

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_lowercase_country_code() {
        let err = GetServerInfo.validate_extra(&json!({"country": "us"})).unwrap_err();
        assert!(err.message.contains("two-letter"));
    }

    #[test]
    fn accepts_uppercase_country_code() {
        assert!(GetServerInfo.validate_extra(&json!({"country": "US"})).is_ok());
    }
}
