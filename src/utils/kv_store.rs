use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Per-key storage with expiry. Shared per-client state such as rate-limit
/// windows lives behind this trait so it can move to an external cache.
#[async_trait]
pub trait KeyValueStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn put(&self, key: &str, value: V, ttl: Duration);

    /// Returns the value unless it is missing or expired.
    async fn get(&self, key: &str) -> Option<V>;

    async fn delete(&self, key: &str);

    /// Drops expired entries. Backends with native expiry can keep the default.
    async fn purge_expired(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-process store backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryKvStore<V> {
    entries: DashMap<String, Entry<V>>,
}

impl<V> MemoryKvStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for MemoryKvStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KeyValueStore<V> for MemoryKvStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn put(&self, key: &str, value: V, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        // The read guard must be released before touching the shard again
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryKvStore::new();
        store.put("a", 1u32, Duration::from_secs(60)).await;
        assert_eq!(store.get("a").await, Some(1));
        assert_eq!(store.get("b").await, None);

        store.delete("a").await;
        assert_eq!(store.get("a").await, None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible_and_removed() {
        let store = MemoryKvStore::new();
        store.put("short", "x".to_string(), Duration::ZERO).await;
        store.put("long", "y".to_string(), Duration::from_secs(60)).await;

        assert_eq!(store.get("short").await, None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long").await.as_deref(), Some("y"));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryKvStore::new();
        store.put("a", 1u8, Duration::ZERO).await;
        store.put("b", 2u8, Duration::ZERO).await;
        store.put("c", 3u8, Duration::from_secs(60)).await;

        assert_eq!(store.purge_expired().await, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryKvStore::new();
        store.put("k", 1u8, Duration::from_secs(60)).await;
        store.put("k", 2u8, Duration::from_secs(60)).await;
        assert_eq!(store.get("k").await, Some(2));
    }
}
