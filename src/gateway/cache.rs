//! Insertion-ordered API response cache.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub org_id: String,
    pub method: String,
    pub api_type: String,
    pub endpoint: String,
    pub extra: Option<String>,
}

struct Entry {
    data: Value,
    expires_at: Instant,
}

pub struct ApiCache {
    entries: Mutex<IndexMap<CacheKey, Entry>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl ApiCache {
    pub fn new(default_ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            default_ttl: Duration::from_millis(default_ttl_ms),
            max_entries,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.data.clone()),
            Some(_) => {
                entries.shift_remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: CacheKey, data: Value, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.shift_remove_index(0);
        }
        entries.insert(
            key,
            Entry {
                data,
                expires_at: Instant::now() + ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    /// Any successful non-read call clears the whole cache (conservative
    /// invalidation).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prunes expired entries; called by the hourly background sweep once
    /// the store has grown past twice `max_entries`.
    pub fn sweep_if_oversized(&self) {
        let mut entries = self.entries.lock();
        if entries.len() <= self.max_entries * 2 {
            return;
        }
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        while entries.len() > self.max_entries {
            entries.shift_remove_index(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(endpoint: &str) -> CacheKey {
        CacheKey {
            org_id: "00Dxx".into(),
            method: "GET".into(),
            api_type: "REST".into(),
            endpoint: endpoint.into(),
            extra: None,
        }
    }

    #[test]
    fn hit_then_clear_then_miss() {
        let cache = ApiCache::new(10_000, 200);
        cache.put(key("/a"), serde_json::json!({"v": 1}), None);
        assert!(cache.get(&key("/a")).is_some());
        cache.clear();
        assert!(cache.get(&key("/a")).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = ApiCache::new(0, 200);
        cache.put(key("/a"), serde_json::json!({"v": 1}), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key("/a")).is_none());
    }

    #[test]
    fn oldest_first_eviction_at_capacity() {
        let cache = ApiCache::new(10_000, 2);
        cache.put(key("/a"), serde_json::json!(1), None);
        cache.put(key("/b"), serde_json::json!(2), None);
        cache.put(key("/c"), serde_json::json!(3), None);
        assert!(cache.get(&key("/a")).is_none());
        assert!(cache.get(&key("/b")).is_some());
        assert!(cache.get(&key("/c")).is_some());
    }
}
