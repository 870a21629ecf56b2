//! Key-value storage abstraction for shared rate-limit state.
//!
//! The only persisted state in the engine is the rate-limit cell, kept under
//! `ratelimit:<identifier>` keys with a TTL. Deployments bind their shared
//! store by implementing [`KvStore`]; single-process deployments and tests
//! use the bundled [`MemoryKvStore`]. Semantics are last-write-wins: there is
//! no compare-and-swap, and callers tolerate the resulting races.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::KvStoreError;

/// A TTL-bounded string key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvStoreError>;

    /// Write a value that expires after `ttl_seconds`.
    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), KvStoreError>;
}

/// In-memory [`KvStore`] with lazy expiry.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvStoreError> {
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

    async fn put(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), KvStoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds.max(1)),
            },
        );
        Ok(())
    }
}
