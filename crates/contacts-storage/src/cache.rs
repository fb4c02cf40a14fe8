use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

/// A cached lookup result. `KnownAbsent` is a negative entry: the upstream
/// was asked and had nothing, which is different from a cache miss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Cached<T> {
    Present(T),
    KnownAbsent,
}

impl<T> Cached<T> {
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Cached::Present(v),
            None => Cached::KnownAbsent,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Cached::Present(v) => Some(v),
            Cached::KnownAbsent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Cached::Present(_))
    }
}

/// Positive/negative TTL pair owned by each resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub positive: Duration,
    pub negative: Duration,
}

impl TtlPolicy {
    pub const fn new(positive: Duration, negative: Duration) -> Self {
        Self { positive, negative }
    }

    pub const fn uniform(ttl: Duration) -> Self {
        Self::new(ttl, ttl)
    }

    pub fn ttl_for<T>(&self, value: &Cached<T>) -> Duration {
        if value.is_present() {
            self.positive
        } else {
            self.negative
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failure: {0}")]
    Backend(String),
    #[error("encoding cache value: {0}")]
    Codec(#[from] serde_json::Error),
}

/// String-keyed store with per-entry expiry. Values are JSON so any backend
/// can hold them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Cached<JsonValue>>, CacheError>;

    async fn set(
        &self,
        key: &str,
        value: Cached<JsonValue>,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

/// Typed read. An entry that no longer decodes as `T` is treated as a miss.
pub async fn get_typed<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> Result<Option<Cached<T>>, CacheError> {
    let decoded = match cache.get(key).await? {
        None => None,
        Some(Cached::KnownAbsent) => Some(Cached::KnownAbsent),
        Some(Cached::Present(raw)) => match serde_json::from_value(raw) {
            Ok(value) => Some(Cached::Present(value)),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable cache entry");
                None
            }
        },
    };
    Ok(decoded)
}

pub async fn set_typed<T: Serialize>(
    cache: &dyn CacheStore,
    key: &str,
    value: &Cached<T>,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = match value {
        Cached::Present(v) => Cached::Present(serde_json::to_value(v)?),
        Cached::KnownAbsent => Cached::KnownAbsent,
    };
    cache.set(key, raw, ttl).await
}

#[derive(Debug)]
struct MemoryEntry {
    value: Cached<JsonValue>,
    expires_at: Instant,
}

/// Process-local cache. Expired entries read as misses and are evicted on
/// access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every expired entry; returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Cached<JsonValue>>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Cached<JsonValue>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contacts_core::GeoCoordinate;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        let coord = GeoCoordinate {
            latitude: 52.23,
            longitude: 21.01,
        };
        set_typed(&cache, "geo:warsaw", &Cached::Present(coord), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        let hit: Option<Cached<GeoCoordinate>> = get_typed(&cache, "geo:warsaw").await.unwrap();
        assert_eq!(hit, Some(Cached::Present(coord)));

        tokio::time::advance(Duration::from_secs(2)).await;
        let miss: Option<Cached<GeoCoordinate>> = get_typed(&cache, "geo:warsaw").await.unwrap();
        assert_eq!(miss, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn known_absent_is_a_hit_not_a_miss() {
        let cache = MemoryCache::new();
        set_typed::<GeoCoordinate>(
            &cache,
            "geo:atlantis",
            &Cached::KnownAbsent,
            Duration::from_secs(60),
        )
        .await
        .unwrap();

        let hit: Option<Cached<GeoCoordinate>> = get_typed(&cache, "geo:atlantis").await.unwrap();
        assert_eq!(hit, Some(Cached::KnownAbsent));
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let cache = MemoryCache::new();
        cache
            .set(
                "geo:warsaw",
                Cached::Present(serde_json::json!("not a coordinate")),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let read: Option<Cached<GeoCoordinate>> = get_typed(&cache, "geo:warsaw").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_only_drops_stale_entries() {
        let cache = MemoryCache::new();
        cache
            .set("short", Cached::KnownAbsent, Duration::from_secs(5))
            .await
            .unwrap();
        cache
            .set("long", Cached::KnownAbsent, Duration::from_secs(500))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[test]
    fn ttl_policy_picks_class_by_outcome() {
        let policy = TtlPolicy::new(Duration::from_secs(30), Duration::from_secs(3));
        assert_eq!(policy.ttl_for(&Cached::Present(1)), Duration::from_secs(30));
        assert_eq!(policy.ttl_for::<i32>(&Cached::KnownAbsent), Duration::from_secs(3));
    }
}
