// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pageflow contributors

//! Caching layer for fetched values
//!
//! Fetch results can be kept between requests so that repeated page views do
//! not hit the data source again. Entries are JSON values stored under a
//! caller-chosen key, optionally with an expiry.

mod filesystem;
mod hash;
mod memory;

pub use filesystem::FilesystemCache;
pub use hash::hash_key;
pub use memory::MemoryCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{CacheBackend, CacheSettings};
use crate::errors::PipelineError;

/// Trait for cache implementations
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get the value stored under `key`, if present and not expired
    async fn get(&self, key: &str) -> Result<Option<Value>, PipelineError>;

    /// Store a value, replacing any previous entry
    async fn store(&self, key: &str, value: &Value, ttl: Option<Duration>)
        -> Result<(), PipelineError>;

    /// Remove the entry for `key`
    async fn invalidate(&self, key: &str) -> Result<(), PipelineError>;

    /// Clear all cached values
    async fn clear(&self) -> Result<(), PipelineError>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats, PipelineError>;
}

/// Build the cache configured in `settings`
pub fn from_settings(settings: &CacheSettings) -> Result<Arc<dyn Cache>, PipelineError> {
    match settings.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Filesystem => Ok(Arc::new(FilesystemCache::new(settings.directory())?)),
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached entries
    pub entries: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Oldest entry timestamp
    pub oldest_entry: Option<SystemTime>,
    /// Newest entry timestamp
    pub newest_entry: Option<SystemTime>,
}

impl CacheStats {
    /// Format size for display
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.size_bytes >= GB {
            format!("{:.2} GB", self.size_bytes as f64 / GB as f64)
        } else if self.size_bytes >= MB {
            format!("{:.2} MB", self.size_bytes as f64 / MB as f64)
        } else if self.size_bytes >= KB {
            format!("{:.2} KB", self.size_bytes as f64 / KB as f64)
        } else {
            format!("{} bytes", self.size_bytes)
        }
    }

    fn record(&mut self, timestamp: SystemTime) {
        self.entries += 1;
        if self.oldest_entry.map_or(true, |oldest| timestamp < oldest) {
            self.oldest_entry = Some(timestamp);
        }
        if self.newest_entry.map_or(true, |newest| timestamp > newest) {
            self.newest_entry = Some(timestamp);
        }
    }
}

/// A stored value with its bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    /// When the entry was cached
    pub timestamp: SystemTime,
    /// Key the entry was stored under
    pub key: String,
    /// When the entry stops being served
    #[serde(default)]
    pub expires_at: Option<SystemTime>,
    pub value: Value,
}

impl CachedEntry {
    pub fn new(key: &str, value: Value, ttl: Option<Duration>) -> Self {
        let timestamp = SystemTime::now();
        Self {
            timestamp,
            key: key.to_string(),
            expires_at: ttl.map(|ttl| timestamp + ttl),
            value,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |expires_at| SystemTime::now() >= expires_at)
    }
}
