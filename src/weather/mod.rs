pub mod normalize;
pub mod openweather;
pub mod types;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store holding serialized weather reports with a per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Clone, Debug)]
struct CachedPayload {
    payload: String,
    ttl: Duration,
}

struct PayloadExpiry;

impl Expiry<String, CachedPayload> for PayloadExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedPayload,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // An overwrite restarts the clock.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedPayload,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MokaStore {
    cache: Cache<String, CachedPayload>,
}

impl MokaStore {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PayloadExpiry)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl CacheStore for MokaStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.cache.get(key).await.map(|entry| entry.payload))
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), CachedPayload { payload, ttl })
            .await;
        Ok(())
    }
}

/// Cache read that treats an unreachable store as a miss.
pub async fn lookup(store: &dyn CacheStore, key: &str) -> Option<String> {
    match store.get(key).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("Cache read for {} failed, treating as miss: {}", key, e);
            None
        }
    }
}

/// Cache write whose failure is logged and otherwise ignored.
pub async fn store(store: &dyn CacheStore, key: &str, payload: String, ttl: Duration) {
    if let Err(e) = store.set(key, payload, ttl).await {
        tracing::warn!("Cache write for {} failed: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnreachableStore;

    #[async_trait]
    impl CacheStore for UnreachableStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _payload: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_get_after_set() {
        let cache = MokaStore::new(10);
        assert_eq!(cache.get("weather:paris").await.unwrap(), None);

        cache
            .set("weather:paris", "{\"city\":\"paris\"}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("weather:paris").await.unwrap().as_deref(),
            Some("{\"city\":\"paris\"}")
        );
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = MokaStore::new(10);
        cache
            .set("weather:oslo", "cold".to_string(), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(cache.get("weather:oslo").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.get("weather:oslo").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_payload_and_ttl() {
        let cache = MokaStore::new(10);
        cache
            .set("weather:rome", "old".to_string(), Duration::from_millis(100))
            .await
            .unwrap();
        cache
            .set("weather:rome", "new".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.get("weather:rome").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        let unreachable = UnreachableStore;
        assert_eq!(lookup(&unreachable, "weather:lima").await, None);
        store(&unreachable, "weather:lima", "x".to_string(), Duration::from_secs(1)).await;
    }
}
