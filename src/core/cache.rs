use async_trait::async_trait;
use std::hash::Hash;
use std::time::Duration;

/// Async key-value cache with optional per-entry expiry.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V>;
    async fn put(&self, key: K, value: V, ttl: Option<Duration>);
}
