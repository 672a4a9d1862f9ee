//! Cache store abstraction.
//!
//! The cache is an optimization; the participant tables stay authoritative.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Result, StoreError};

/// Cache tuning shared by all cached tables.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Expiry of a cached entity snapshot.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Key/value cache with bulk operations and bounded expiry.
///
/// Values are serialized entity snapshots.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns one slot per key, `None` on miss.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn set_many(&self, entries: Vec<(String, String)>, ttl: Duration) -> Result<()>;

    async fn delete_many(&self, keys: &[String]) -> Result<()>;
}

/// In-memory cache with per-entry expiry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    fail_deletes: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures deletes to fail until reset.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Returns true if an unexpired entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    /// Writes a raw entry, bypassing any table.
    pub async fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.entries
            .write()
            .await
            .insert(key.into(), (value.into(), Instant::now() + ttl));
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| {
                entries
                    .get(key)
                    .filter(|(_, expires)| *expires > now)
                    .map(|(value, _)| value.clone())
            })
            .collect())
    }

    async fn set_many(&self, entries: Vec<(String, String)>, ttl: Duration) -> Result<()> {
        let expires = Instant::now() + ttl;
        let mut store = self.entries.write().await;
        for (key, value) in entries {
            store.insert(key, (value, expires));
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Cache("delete refused (injected)".to_string()));
        }
        let mut store = self.entries.write().await;
        for key in keys {
            store.remove(key);
        }
        Ok(())
    }
}
