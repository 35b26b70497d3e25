//! In-memory response cache
//!
//! A moka cache of JSON-serialized values. Article detail responses are
//! cached under `article:<name>` and invalidated whenever a sync rewrites
//! the article.

use anyhow::{Context, Result};
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Cache key of an article detail response
pub fn article_key(name: &str) -> String {
    format!("article:{}", name)
}

/// JSON-serialized value
#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MemoryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity_and_ttl(config.max_capacity, Duration::from_secs(config.ttl_seconds))
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();

        Self { cache }
    }

    /// `Ok(None)` when the key is missing or expired
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let entry = CacheEntry::new(value)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// Invalidate every key starting with `prefix`
    pub fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let prefix = prefix.to_string();
        self.cache
            .invalidate_entries_if(move |key, _| key.starts_with(&prefix))
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Failed to invalidate cache entries: {}", e))
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MemoryCache {
        MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache();
        cache.set("article:mpi", &vec![1, 2, 3]).await.unwrap();

        let value: Option<Vec<i32>> = cache.get("article:mpi").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        cache.delete("article:mpi").await;
        let value: Option<Vec<i32>> = cache.get("article:mpi").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let cache = cache();
        cache.set("article:mpi", &"a").await.unwrap();
        cache.set("article:slurm", &"b").await.unwrap();
        cache.set("tag:hpc", &"c").await.unwrap();

        cache.delete_prefix("article:").unwrap();
        cache.cache.run_pending_tasks().await;

        assert!(cache.get::<String>("article:mpi").await.unwrap().is_none());
        assert!(cache.get::<String>("article:slurm").await.unwrap().is_none());
        assert_eq!(cache.get::<String>("tag:hpc").await.unwrap(), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_expired_entries_are_gone() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_millis(50));
        cache.set("k", &1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get::<i32>("k").await.unwrap().is_none());
    }
}
