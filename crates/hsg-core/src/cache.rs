//! TTL-and-capacity caches layered over [`moka`]'s synchronous cache:
//! one instance backs the query-result cache, another the per-tenant
//! classifier-model cache.

use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;

/// A bounded cache with a uniform per-entry TTL. `get` refreshes
/// recency; insertion past capacity evicts by moka's TinyLFU policy.
#[derive(Clone)]
pub struct TtlLru<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<K, V>,
}

impl<K, V> TtlLru<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64, ttl_ms: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_millis(ttl_ms))
            .build();
        Self { inner }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    pub fn set(&self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    pub fn invalidate(&self, key: &K) {
        self.inner.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
