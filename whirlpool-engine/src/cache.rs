//! Response cache over the `cache_entries` table.
//!
//! Entries are keyed by a SHA-256 fingerprint of the request kind and its
//! parameters. The cache is advisory: read or write failures are logged and
//! treated as misses.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::database::models::CacheEntryDbModel;
use crate::database::repositories::CacheRepository;
use crate::database::time::{is_fresh, now_ms};
use crate::utils::json::{JsonContext, parse_logged, to_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum CacheKind {
    Status,
    Listing,
    Resolution,
}

/// Freshness window per kind. A zero window disables caching for that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub status: Duration,
    pub listing: Duration,
    pub resolution: Duration,
}

impl CacheTtls {
    pub fn for_kind(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Status => self.status,
            CacheKind::Listing => self.listing,
            CacheKind::Resolution => self.resolution,
        }
    }

    /// The longest window, used to bound background purges.
    pub fn longest(&self) -> Duration {
        self.status.max(self.listing).max(self.resolution)
    }
}

/// Stable fingerprint of a request. Object keys are sorted by `serde_json`,
/// so logically equal parameters hash identically.
pub fn fingerprint(kind: CacheKind, params: &Value) -> String {
    let canonical = json!({ "kind": kind.as_ref(), "params": params }).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

pub struct ResponseCache {
    repo: Arc<dyn CacheRepository>,
    ttls: CacheTtls,
}

impl ResponseCache {
    pub fn new(repo: Arc<dyn CacheRepository>, ttls: CacheTtls) -> Self {
        Self { repo, ttls }
    }

    fn ttl_ms(&self, kind: CacheKind) -> i64 {
        i64::try_from(self.ttls.for_kind(kind).as_millis()).unwrap_or(i64::MAX)
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, params: &Value) -> Option<T> {
        let ttl_ms = self.ttl_ms(kind);
        if ttl_ms == 0 {
            return None;
        }
        let key = fingerprint(kind, params);
        let entry = match self.repo.get_entry(&key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(%kind, error = %e, "Cache read failed");
                return None;
            }
        };
        if entry.kind != kind.as_ref() || !is_fresh(entry.created_at, ttl_ms, now_ms()) {
            return None;
        }
        debug!(%kind, fingerprint = %key, "Cache hit");
        parse_logged(
            &entry.payload,
            JsonContext::CacheEntry {
                fingerprint: &key,
                kind: kind.as_ref(),
            },
            "Discarding malformed cache entry",
        )
    }

    pub async fn put<T: Serialize>(&self, kind: CacheKind, params: &Value, value: &T) {
        if self.ttl_ms(kind) == 0 {
            return;
        }
        let payload = match to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%kind, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        let entry = CacheEntryDbModel {
            fingerprint: fingerprint(kind, params),
            kind: kind.to_string(),
            payload,
            created_at: now_ms(),
        };
        if let Err(e) = self.repo.put_entry(&entry).await {
            warn!(%kind, error = %e, "Cache write failed");
        }
    }

    pub async fn invalidate(&self, kind: CacheKind, params: &Value) {
        if let Err(e) = self.repo.delete_entry(&fingerprint(kind, params)).await {
            warn!(%kind, error = %e, "Cache invalidation failed");
        }
    }
}
