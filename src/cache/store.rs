//! The storage capability behind every tier.
//!
//! [`TierStore`] is the narrow interface the engine needs from the host's
//! cache storage: named storages that can be opened, written, matched,
//! listed, and deleted. [`MemoryTierStore`] is the in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::cache::entry::{CacheEntry, EntryMeta, RequestKey};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage not found: {0}")]
    MissingStorage(String),

    #[error("storage quota exceeded for {0}")]
    QuotaExceeded(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Named cache storages. Writes are last-write-wins per key.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Create the storage if absent. Idempotent.
    async fn open(&self, name: &str) -> Result<(), StoreError>;

    /// Store `entry`, replacing any entry with the same key.
    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), StoreError>;

    /// Look up an entry by key.
    async fn match_entry(&self, name: &str, key: &RequestKey)
        -> Result<Option<CacheEntry>, StoreError>;

    /// Delete a whole storage. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, StoreError>;

    /// Names of all storages, in creation order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Metadata of every entry in a storage.
    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, StoreError>;

    /// Remove a single entry. Returns whether it existed.
    async fn delete_entry(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Storage {
    name: String,
    entries: HashMap<RequestKey, CacheEntry>,
}

/// In-memory [`TierStore`].
#[derive(Debug, Default)]
pub struct MemoryTierStore {
    storages: RwLock<Vec<Storage>>,
}

impl MemoryTierStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TierStore for MemoryTierStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        let mut storages = self.storages.write().await;
        if !storages.iter().any(|s| s.name == name) {
            storages.push(Storage {
                name: name.to_string(),
                entries: HashMap::new(),
            });
        }
        Ok(())
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), StoreError> {
        let mut storages = self.storages.write().await;
        let storage = storages
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingStorage(name.to_string()))?;
        storage.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let storages = self.storages.read().await;
        let storage = storages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingStorage(name.to_string()))?;
        Ok(storage.entries.get(key).cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let mut storages = self.storages.write().await;
        let before = storages.len();
        storages.retain(|s| s.name != name);
        Ok(storages.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let storages = self.storages.read().await;
        Ok(storages.iter().map(|s| s.name.clone()).collect())
    }

    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, StoreError> {
        let storages = self.storages.read().await;
        let storage = storages
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingStorage(name.to_string()))?;
        Ok(storage.entries.values().map(CacheEntry::meta).collect())
    }

    async fn delete_entry(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError> {
        let mut storages = self.storages.write().await;
        let storage = storages
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingStorage(name.to_string()))?;
        Ok(storage.entries.remove(key).is_some())
    }
}
