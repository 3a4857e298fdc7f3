//! TTL cache for brokerage API responses.
//!
//! The instrument catalog endpoint returns thousands of entries and changes
//! rarely, so callers that hit it repeatedly share one cache keyed by
//! request path. A zero TTL disables caching entirely.

use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
    fetched_at: Instant,
    body: Value,
}

/// Concurrent response cache with a fixed time-to-live.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// A cache that never serves anything.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// The cached body for `key`, unless missing or expired.
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.body.clone())
    }

    pub fn put(&self, key: &str, body: Value) {
        if !self.is_enabled() {
            return;
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                body,
            },
        );
    }

    /// Drop one cached response.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every cached response.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
