use crate::models::CachedVerdict;
use moka::future::Cache;
use std::time::Duration;

/// Semantic classification cache keyed by fingerprint hash.
///
/// Entries expire after the configured TTL (one hour by default), so a
/// cached verdict can never outlive the window in which it was valid. Reads
/// that miss or race expiry simply fall through to the decision engine.
#[derive(Clone)]
pub struct SemanticCache {
    cache: Cache<String, CachedVerdict>,
}

impl SemanticCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// TTL from hours, the unit the configuration uses
    pub fn with_ttl_hours(max_capacity: u64, hours: u64) -> Self {
        Self::new(max_capacity, Duration::from_secs(hours * 3600))
    }

    pub async fn get(&self, semantic_hash: &str) -> Option<CachedVerdict> {
        self.cache.get(semantic_hash).await
    }

    pub async fn insert(&self, semantic_hash: String, verdict: CachedVerdict) {
        self.cache.insert(semantic_hash, verdict).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
