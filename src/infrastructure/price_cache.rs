// Keyed cache with per-entry expiry
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct CachedEntry<V> {
    value: V,
    expires_at: Instant,
}

/// At most one successful fetch per key per TTL window. Concurrent misses
/// on a cold key may both fetch; failures are never stored.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.into(),
            CachedEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            tracing::debug!(key, "cache hit");
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }
}
