// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Filesystem-based cache implementation
//!
//! Stores cache entries as JSON files in a cache directory, named after the
//! BLAKE3 hash of their key.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{hash_key, Cache, CacheStats, CachedEntry};
use crate::errors::PipelineError;

fn cache_error(context: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Cache {
        message: format!("{}: {}", context, e),
    }
}

/// Filesystem-based cache
#[derive(Debug, Clone)]
pub struct FilesystemCache {
    cache_dir: PathBuf,
}

impl FilesystemCache {
    /// Create a new filesystem cache, creating the directory if needed
    pub fn new(cache_dir: PathBuf) -> Result<Self, PipelineError> {
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir)
                .map_err(|e| cache_error("Failed to create cache directory", e))?;
        }

        Ok(Self { cache_dir })
    }

    pub fn directory(&self) -> &Path {
        &self.cache_dir
    }

    /// Get path for a cache entry
    fn cache_path(&self, key: &str) -> PathBuf {
        let hash = hash_key(key);
        // first 2 chars as subdirectory
        let (prefix, rest) = hash.split_at(2);
        self.cache_dir.join(prefix).join(format!("{}.json", rest))
    }

    async fn read_entry(path: &Path) -> Result<CachedEntry, PipelineError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| cache_error("Failed to read cache entry", e))?;
        serde_json::from_str(&content).map_err(|e| cache_error("Failed to parse cache entry", e))
    }

    /// List all entry files
    fn entry_files(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut files = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(files);
        }

        for prefix_dir in std::fs::read_dir(&self.cache_dir)
            .map_err(|e| cache_error("Failed to read cache directory", e))?
        {
            let prefix_dir = prefix_dir
                .map_err(|e| cache_error("Failed to read cache entry", e))?
                .path();

            if !prefix_dir.is_dir() {
                continue;
            }

            for entry_file in std::fs::read_dir(&prefix_dir)
                .map_err(|e| cache_error("Failed to read cache subdirectory", e))?
            {
                let entry_file = entry_file
                    .map_err(|e| cache_error("Failed to read cache file", e))?
                    .path();

                if entry_file.extension().and_then(|e| e.to_str()) == Some("json") {
                    files.push(entry_file);
                }
            }
        }

        Ok(files)
    }
}

#[async_trait]
impl Cache for FilesystemCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, PipelineError> {
        let path = self.cache_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let entry = Self::read_entry(&path).await?;

        // hash collisions and stale entries are misses
        if entry.key != key {
            return Ok(None);
        }
        if entry.is_expired() {
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(None);
        }

        Ok(Some(entry.value))
    }

    async fn store(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), PipelineError> {
        let path = self.cache_path(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_error("Failed to create cache directory", e))?;
        }

        let entry = CachedEntry::new(key, value.clone(), ttl);
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| cache_error("Failed to serialize cache entry", e))?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|e| cache_error("Failed to write cache entry", e))?;

        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), PipelineError> {
        let path = self.cache_path(key);

        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| cache_error("Failed to remove cache entry", e))?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), PipelineError> {
        if self.cache_dir.exists() {
            tokio::fs::remove_dir_all(&self.cache_dir)
                .await
                .map_err(|e| cache_error("Failed to clear cache", e))?;

            tokio::fs::create_dir_all(&self.cache_dir)
                .await
                .map_err(|e| cache_error("Failed to recreate cache directory", e))?;
        }

        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, PipelineError> {
        let mut stats = CacheStats::default();

        for file in self.entry_files()? {
            // unreadable entries are skipped, not fatal
            if let Ok(entry) = Self::read_entry(&file).await {
                stats.record(entry.timestamp);
            }
            stats.size_bytes += file.metadata().map(|m| m.len()).unwrap_or(0);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cache_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().join("cache")).unwrap();

        let rows = json!([{ "dataset": "tree" }, { "dataset": "park" }]);
        cache.store("datasets:some-lpa", &rows, None).await.unwrap();

        assert_eq!(cache.get("datasets:some-lpa").await.unwrap(), Some(rows));
        assert!(cache.get("datasets:other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_invalidate() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        cache.store("k", &json!(1), None).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_some());

        cache.invalidate("k").await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        cache.store("k", &json!(1), Some(Duration::ZERO)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.stats().await.unwrap().entries, 0);
    }

    #[tokio::test]
    async fn test_cache_clear() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FilesystemCache::new(temp_dir.path().to_path_buf()).unwrap();

        cache.store("a", &json!("x"), None).await.unwrap();
        cache.store("b", &json!("y"), None).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.size_bytes > 0);

        cache.clear().await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 0);
    }
}
