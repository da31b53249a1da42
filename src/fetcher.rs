//! Cache-first retrieval of tennis payloads.

use chrono::{Duration, Utc};
use serde_json::Value;

use crate::api_client::{ApiClient, ApiError};
use crate::database::Database;
use crate::models::SportsData;

pub const SPORT: &str = "tennis";
const SOURCE: &str = "rapidapi";

const PLAYER_STATS: &str = "player_stats";
const HEAD_TO_HEAD: &str = "h2h";
const PLAYER_MATCHES: &str = "player_matches";

fn player_ttl() -> Duration {
    Duration::hours(24)
}

fn h2h_ttl() -> Duration {
    Duration::days(7)
}

fn matches_ttl() -> Duration {
    Duration::hours(1)
}

/// `tennis:{prefix}:{k}_{v}_...` with params sorted by key.
pub fn cache_key(prefix: &str, params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort();
    let body = sorted
        .iter()
        .map(|(k, v)| format!("{k}_{v}"))
        .collect::<Vec<_>>()
        .join("_");
    format!("{SPORT}:{prefix}:{body}")
}

pub struct TennisFetcher<C: ApiClient> {
    client: C,
    db: Database,
}

impl<C: ApiClient> TennisFetcher<C> {
    pub fn new(client: C, db: Database) -> Self {
        Self { client, db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    pub fn fetch_player_stats(&mut self, player_id: u64) -> Result<Value, ApiError> {
        let id = player_id.to_string();
        let endpoint = format!("/api/tennis/player/{player_id}");
        self.cached_or_fetch(PLAYER_STATS, &id, &endpoint, player_ttl())
    }

    /// Ids are ordered so (a, b) and (b, a) share one cache entry.
    pub fn fetch_head_to_head(&mut self, a: u64, b: u64) -> Result<Value, ApiError> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let key = format!("{lo}-{hi}");
        let endpoint = format!("/api/tennis/h2h/{lo}/{hi}");
        self.cached_or_fetch(HEAD_TO_HEAD, &key, &endpoint, h2h_ttl())
    }

    pub fn fetch_matches(&mut self, player_id: u64) -> Result<Value, ApiError> {
        let id = player_id.to_string();
        let endpoint = format!("/api/tennis/player/{player_id}/matches/last/0");
        self.cached_or_fetch(PLAYER_MATCHES, &id, &endpoint, matches_ttl())
    }

    fn cached_or_fetch(
        &mut self,
        data_type: &str,
        entity_id: &str,
        endpoint: &str,
        ttl: Duration,
    ) -> Result<Value, ApiError> {
        let now = Utc::now();
        let key = cache_key(data_type, &[("id", entity_id)]);
        match self.db.cached_payload(SPORT, data_type, entity_id, now) {
            Ok(Some(hit)) if !is_blank(&hit.data) => {
                tracing::info!(%key, "cache hit");
                return Ok(hit.data);
            }
            Ok(_) => tracing::debug!(%key, "cache miss"),
            Err(err) => tracing::warn!(%key, error = %format!("{err:#}"), "cache read failed"),
        }

        let data = self.client.get(endpoint, &[])?;

        let record = SportsData {
            id: None,
            sport: SPORT.to_string(),
            data_type: data_type.to_string(),
            entity_id: entity_id.to_string(),
            data: data.clone(),
            source: SOURCE.to_string(),
            fetched_at: now,
            expires_at: Some(now + ttl),
        };
        if let Err(err) = self.db.store_cached_payload(&record) {
            tracing::error!(%key, error = %format!("{err:#}"), "cache write failed");
        }
        Ok(data)
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}
