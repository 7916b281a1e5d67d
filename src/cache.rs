//! TTL cache for API responses.
//!
//! Entries are valid while `now - captured_at < ttl`. An expired entry is
//! removed by the `get` that finds it (counted as a miss) or by the periodic
//! sweep. Timestamps are epoch milliseconds so the cache can be persisted
//! and reloaded across restarts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: serde_json::Value,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit percentage, 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

/// On-disk shape of the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache {
    pub data: Vec<(String, CacheEntry)>,
    pub hits: u64,
    pub misses: u64,
    pub last_update: u64,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

pub struct TtlCache {
    ttl_ms: u64,
    inner: Mutex<Inner>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    fn is_expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.timestamp) >= self.ttl_ms
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.get_at(key, now_millis())
    }

    pub fn get_at(&self, key: &str, now: u64) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let expired = match inner.entries.get(key) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            inner.entries.remove(key);
            inner.misses += 1;
            debug!(key, "Cache entry expired");
            return None;
        }
        inner.hits += 1;
        inner.entries.get(key).map(|e| e.data.clone())
    }

    pub fn set(&self, key: &str, value: serde_json::Value) {
        self.set_at(key, value, now_millis())
    }

    pub fn set_at(&self, key: &str, value: serde_json::Value, now: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                timestamp: now,
            },
        );
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.remove(key).is_some()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn sweep_at(&self, now: u64) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.entries.len();
        let ttl = self.ttl_ms;
        inner
            .entries
            .retain(|_, entry| now.saturating_sub(entry.timestamp) < ttl);
        before - inner.entries.len()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(now_millis())
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    pub fn to_persisted(&self, now: u64) -> PersistedCache {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut data: Vec<(String, CacheEntry)> = inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        data.sort_by(|a, b| a.0.cmp(&b.0));
        PersistedCache {
            data,
            hits: inner.hits,
            misses: inner.misses,
            last_update: now,
        }
    }

    /// Rebuild a cache from its persisted form, dropping entries already expired at `now`.
    pub fn from_persisted(ttl: Duration, persisted: PersistedCache, now: u64) -> Self {
        let cache = Self::new(ttl);
        {
            let mut inner = cache.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.hits = persisted.hits;
            inner.misses = persisted.misses;
            for (key, entry) in persisted.data {
                if !cache.is_expired(&entry, now) {
                    inner.entries.insert(key, entry);
                }
            }
        }
        cache
    }
}
