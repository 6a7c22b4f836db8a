//! TTL caches for read responses of external APIs.
//!
//! Values are opaque strings (serialized JSON); callers own the key layout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::error::AppResult;

#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;
}

/// In-process cache. Expired entries are dropped lazily on read and on write.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }
}

pub struct RedisCache {
    client: redis::Client,
    prefix: String,
}

impl RedisCache {
    pub fn new(url: &str, prefix: &str) -> AppResult<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            prefix: prefix.to_string(),
        })
    }
}

#[async_trait]
impl ResponseCache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(format!("{}:{}", self.prefix, key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(format!("{}:{}", self.prefix, key), value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }
}

/// Redis when `REDIS_URL` is set, otherwise the in-process cache.
pub fn build_cache(config: &CacheConfig) -> AppResult<Arc<dyn ResponseCache>> {
    match &config.redis_url {
        Some(url) => {
            tracing::info!("Caching Eventbrite responses in Redis");
            Ok(Arc::new(RedisCache::new(url, "member-discounts")?))
        }
        None => {
            tracing::info!("Caching Eventbrite responses in memory");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_returns_fresh_values() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_expires_values() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.entries.read().await.is_empty());
    }

    #[test]
    fn build_cache_defaults_to_memory() {
        let config = CacheConfig {
            ttl_seconds: 60,
            redis_url: None,
        };
        assert!(build_cache(&config).is_ok());
    }
}
