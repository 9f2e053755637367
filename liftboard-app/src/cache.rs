use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// How many views a single projection keeps memoized. Big enough for a
/// venue's worth of option/locale combinations, small enough that stale
/// versions age out almost immediately.
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// FIFO memoization for one projection. Keys are the deterministic
/// serialization of (projection, fop, version, options, locale); values
/// are the projection output with all clock/decision state excluded.
#[derive(Debug)]
pub struct ProjectionCache {
    name: String,
    entries: Mutex<VecDeque<(String, serde_json::Value)>>,
    capacity: usize,
}

impl ProjectionCache {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entries = self.entries.lock().expect("cache lock poisoned");
        entries
            .iter()
            .find(|(entry_key, _)| entry_key == key)
            .map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: String, value: serde_json::Value) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if let Some(position) = entries.iter().position(|(entry_key, _)| *entry_key == key) {
            entries.remove(position);
        }
        if entries.len() >= self.capacity {
            if let Some((evicted, _)) = entries.pop_front() {
                debug!("Cache {} evicting {evicted}", self.name);
            }
        }
        entries.push_back((key, value));
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide registry so an operator action can flush every
/// projection cache without knowing who owns what.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    caches: Mutex<Vec<Arc<ProjectionCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, cache: Arc<ProjectionCache>) {
        self.caches.lock().expect("registry lock poisoned").push(cache);
    }

    pub fn clear_all(&self) -> usize {
        let caches = self.caches.lock().expect("registry lock poisoned");
        for cache in caches.iter() {
            cache.clear();
        }
        caches.len()
    }
}

/// The deterministic cache key. Options must already be in canonical
/// (sorted) order; no hashing, so two equal requests always collide.
pub fn cache_key(
    projection: &str,
    fop: &str,
    version: u64,
    canonical_options: &str,
    locale: &str,
) -> String {
    format!("{projection}|{fop}|{version}|{canonical_options}|{locale}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hit_and_miss() {
        let cache = ProjectionCache::new("test", 4);
        assert_eq!(cache.get("a"), None);
        cache.insert("a".into(), json!({"rows": 1}));
        assert_eq!(cache.get("a"), Some(json!({"rows": 1})));
    }

    #[test]
    fn fifo_eviction_at_capacity() {
        let cache = ProjectionCache::new("test", 3);
        for i in 0..3 {
            cache.insert(format!("k{i}"), json!(i));
        }
        cache.insert("k3".into(), json!(3));

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k3"), Some(json!(3)));
    }

    #[test]
    fn reinsert_replaces_in_place() {
        let cache = ProjectionCache::new("test", 3);
        cache.insert("a".into(), json!(1));
        cache.insert("a".into(), json!(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(json!(2)));
    }

    #[test]
    fn registry_clears_every_cache() {
        let registry = CacheRegistry::new();
        let first = Arc::new(ProjectionCache::new("one", 4));
        let second = Arc::new(ProjectionCache::new("two", 4));
        registry.register(first.clone());
        registry.register(second.clone());

        first.insert("a".into(), json!(1));
        second.insert("b".into(), json!(2));

        assert_eq!(registry.clear_all(), 2);
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn keys_are_stable_and_version_sensitive() {
        let a = cache_key("scoreboard", "A", 4, "topN=10", "en");
        let b = cache_key("scoreboard", "A", 4, "topN=10", "en");
        let c = cache_key("scoreboard", "A", 5, "topN=10", "en");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
