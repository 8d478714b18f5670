// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! In-process cache

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{Cache, CacheStats, CachedEntry};
use crate::errors::PipelineError;

/// Cache held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // re-check under the write lock, a fresh value may have been stored meanwhile
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            entries.remove(key);
        }
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn store(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), PipelineError> {
        let entry = CachedEntry::new(key, value.clone(), ttl);
        let mut entries = self.entries.write().await;
        entries.retain(|_, existing| !existing.is_expired());
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), PipelineError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, PipelineError> {
        let entries = self.entries.read().await;
        let mut stats = CacheStats::default();
        for entry in entries.values() {
            stats.record(entry.timestamp);
            stats.size_bytes += serde_json::to_vec(&entry.value)?.len() as u64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_get_invalidate() {
        let cache = MemoryCache::new();
        assert!(cache.get("orgInfo").await.unwrap().is_none());

        cache.store("orgInfo", &json!({ "name": "Council" }), None).await.unwrap();
        assert_eq!(
            cache.get("orgInfo").await.unwrap(),
            Some(json!({ "name": "Council" }))
        );

        cache.invalidate("orgInfo").await.unwrap();
        assert!(cache.get("orgInfo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = MemoryCache::new();
        cache.store("k", &json!(1), Some(Duration::ZERO)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_store_sweeps_expired_entries() {
        let cache = MemoryCache::new();
        cache.store("old", &json!(1), Some(Duration::ZERO)).await.unwrap();
        cache.store("new", &json!(2), None).await.unwrap();

        assert_eq!(cache.stats().await.unwrap().entries, 1);
        assert_eq!(cache.get("new").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = MemoryCache::new();
        cache.store("a", &json!([1, 2]), None).await.unwrap();
        cache.store("b", &json!("x"), None).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.size_bytes > 0);

        cache.clear().await.unwrap();
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }
}
