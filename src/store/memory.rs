use crate::core::cache::Cache;
use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheValue<V> {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= Instant::now())
    }
}

/// Short-lived in-memory cache. Nothing survives the process.
pub struct MemoryCache<K, V> {
    inner: Mutex<HashMap<K, CacheValue<V>>>,
}

impl<K, V> MemoryCache<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for MemoryCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync + std::fmt::Display + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock().await;
        match cache.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!("Cache entry expired for key: {}", key);
                cache.remove(key);
                None
            }
            Some(entry) => {
                debug!("Cache HIT for key: {}", key);
                Some(entry.value.clone())
            }
            None => {
                debug!("Cache MISS for key: {}", key);
                None
            }
        }
    }

    async fn put(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let mut cache = self.inner.lock().await;
        cache.retain(|_, entry| !entry.is_expired());
        debug!("Cache PUT for key: {}", key);
        cache.insert(key, CacheValue { value, expires_at });
    }

}
