//! Cache tier manager: owns the versioned tiers and their eviction policy.
//!
//! The manager is the only component that talks to the [`TierStore`]. It:
//! - Maps tier kinds to the current generation's storage names
//! - Stores response snapshots and enforces each tier's policy on write
//! - Resolves lookups, downgrading storage failures to misses
//! - Sweeps storages from previous generations at activation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::entry::{CacheEntry, RequestKey, StoredResponse};
use crate::cache::evictor::Evictor;
use crate::cache::store::{StoreError, TierStore};
use crate::cache::tier::{self, CacheTier, TierKind};
use crate::config::Config;
use crate::metrics::EngineMetrics;

/// An opened tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierHandle {
    pub kind: TierKind,
    pub name: String,
}

/// Per-storage statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierStats {
    /// Storage name.
    pub name: String,
    /// Tier kind, if the storage belongs to the current generation.
    pub kind: Option<TierKind>,
    /// Number of entries.
    pub entries: usize,
}

/// The central tier manager.
pub struct TierManager {
    store: Arc<dyn TierStore>,

    /// Current generation tiers, by kind.
    tiers: HashMap<TierKind, CacheTier>,

    /// Eviction policy per kind.
    evictors: HashMap<TierKind, Evictor>,

    /// Engine version the tiers belong to.
    version: String,

    metrics: Arc<EngineMetrics>,
}

impl TierManager {
    /// Create a manager for the configured engine version.
    pub fn new(config: &Config, store: Arc<dyn TierStore>, metrics: Arc<EngineMetrics>) -> Self {
        let version = config.engine.version.clone();
        let mut tiers = HashMap::new();
        let mut evictors = HashMap::new();

        for kind in TierKind::ALL {
            let policy = config.tiers.for_kind(kind).clone();
            evictors.insert(kind, Evictor::new(policy.clone()));
            tiers.insert(kind, CacheTier::new(kind, &version, policy));
        }

        Self {
            store,
            tiers,
            evictors,
            version,
            metrics,
        }
    }

    /// Engine version the tiers belong to.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Tier definition for a kind.
    pub fn tier(&self, kind: TierKind) -> &CacheTier {
        &self.tiers[&kind]
    }

    /// Storage name of a tier in the current generation.
    pub fn storage_name(&self, kind: TierKind) -> &str {
        &self.tiers[&kind].name
    }

    /// Storage names of all current tiers.
    pub fn current_names(&self) -> HashSet<String> {
        tier::generation_names(&self.version)
    }

    fn kind_of(&self, name: &str) -> Option<TierKind> {
        self.tiers
            .values()
            .find(|tier| tier.name == name)
            .map(|tier| tier.kind)
    }

    fn record_store_error(&self, op: &str, err: &StoreError) {
        self.metrics.store_errors.with_label_values(&[op]).inc();
        warn!(op, error = %err, "Tier storage failure");
    }

    /// Open a tier's storage, creating it if absent. Idempotent.
    pub async fn open(&self, kind: TierKind) -> Result<TierHandle, StoreError> {
        let name = self.storage_name(kind).to_string();
        self.store.open(&name).await?;
        Ok(TierHandle { kind, name })
    }

    /// Store a snapshot of `response` under `key`, then enforce the tier policy.
    ///
    /// Overwrites any existing entry for the key. Policy failures are logged;
    /// only failure to write the entry itself is returned.
    pub async fn put(
        &self,
        kind: TierKind,
        key: RequestKey,
        response: StoredResponse,
    ) -> Result<(), StoreError> {
        let handle = self.open(kind).await?;
        self.store
            .put(&handle.name, CacheEntry::new(key.clone(), response))
            .await?;
        debug!(tier = %kind, key = %key, "Stored entry");

        if let Err(e) = self.enforce_policy(kind).await {
            self.record_store_error("enforce_policy", &e);
        }
        Ok(())
    }

    /// Drop entries that violate the tier's policy. Returns how many were removed.
    pub async fn enforce_policy(&self, kind: TierKind) -> Result<usize, StoreError> {
        let evictor = &self.evictors[&kind];
        if evictor.policy().is_unbounded() {
            return Ok(0);
        }

        let name = self.storage_name(kind);
        let entries = self.store.entries(name).await?;
        let victims = evictor.select_victims(&entries, Instant::now());

        let mut evicted = 0;
        for victim in victims {
            if self.store.delete_entry(name, &victim.key).await? {
                evicted += 1;
                self.metrics
                    .evictions
                    .with_label_values(&[name, victim.reason.as_str()])
                    .inc();
                debug!(
                    tier = %kind,
                    key = %victim.key,
                    reason = victim.reason.as_str(),
                    "Evicted entry"
                );
            }
        }

        Ok(evicted)
    }

    /// Look up `key` in a single tier. Storage failures count as a miss.
    pub async fn lookup_in(&self, kind: TierKind, key: &RequestKey) -> Option<CacheEntry> {
        match self.store.match_entry(self.storage_name(kind), key).await {
            Ok(found) => found,
            Err(StoreError::MissingStorage(name)) => {
                debug!(storage = name, key = %key, "Tier storage not open, treating as miss");
                None
            }
            Err(e) => {
                self.record_store_error("match", &e);
                None
            }
        }
    }

    /// Look up the most recent entry for `key` across the given tiers, or
    /// across every storage when `tiers` is `None`.
    pub async fn lookup(&self, key: &RequestKey, tiers: Option<&[TierKind]>) -> Option<CacheEntry> {
        let names: Vec<String> = match tiers {
            Some(kinds) => kinds
                .iter()
                .map(|kind| self.storage_name(*kind).to_string())
                .collect(),
            None => match self.store.keys().await {
                Ok(names) => names,
                Err(e) => {
                    self.record_store_error("keys", &e);
                    return None;
                }
            },
        };

        let mut best: Option<CacheEntry> = None;
        for name in names {
            let found = match self.store.match_entry(&name, key).await {
                Ok(found) => found,
                Err(StoreError::MissingStorage(_)) => None,
                Err(e) => {
                    self.record_store_error("match", &e);
                    None
                }
            };
            if let Some(entry) = found {
                if best.as_ref().map_or(true, |b| entry.is_newer_than(b)) {
                    best = Some(entry);
                }
            }
        }
        best
    }

    /// Delete every storage whose name does not start with one of `current`.
    ///
    /// Returns the deleted names. Failures are logged and skipped, so a
    /// second call with the same set deletes nothing.
    pub async fn evict_stale(&self, current: &HashSet<String>) -> Vec<String> {
        let names = match self.store.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.record_store_error("keys", &e);
                return Vec::new();
            }
        };

        let mut deleted = Vec::new();
        for name in names {
            if tier::is_current(&name, current) {
                continue;
            }
            match self.store.delete(&name).await {
                Ok(true) => {
                    info!(storage = name, "Deleted stale tier storage");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => self.record_store_error("delete", &e),
            }
        }
        deleted
    }

    /// Entry counts for every storage currently present.
    pub async fn stats(&self) -> Vec<TierStats> {
        let names = match self.store.keys().await {
            Ok(names) => names,
            Err(e) => {
                self.record_store_error("keys", &e);
                return Vec::new();
            }
        };

        let mut stats = Vec::with_capacity(names.len());
        for name in names {
            let entries = match self.store.entries(&name).await {
                Ok(entries) => entries.len(),
                Err(e) => {
                    self.record_store_error("entries", &e);
                    0
                }
            };
            stats.push(TierStats {
                kind: self.kind_of(&name),
                name,
                entries,
            });
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryTierStore;

    fn test_manager(version: &str) -> (TierManager, Arc<MemoryTierStore>) {
        let mut config = Config::default();
        config.engine.version = version.to_string();
        config.tiers.api_responses.max_entries = Some(2);
        config.tiers.api_responses.max_age_secs = None;
        let store = Arc::new(MemoryTierStore::new());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        (TierManager::new(&config, store.clone(), metrics), store)
    }

    #[tokio::test]
    async fn test_put_and_lookup_in() {
        let (manager, _) = test_manager("v1");
        let key = RequestKey::get("https://app.test/api/a");
        manager
            .put(TierKind::ApiResponses, key.clone(), StoredResponse::html("a"))
            .await
            .unwrap();

        let hit = manager.lookup_in(TierKind::ApiResponses, &key).await.unwrap();
        assert_eq!(hit.response.body, "a");
        assert!(manager.lookup_in(TierKind::StaticAssets, &key).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_prefers_most_recent() {
        let (manager, _) = test_manager("v1");
        let key = RequestKey::get("https://app.test/x");
        manager
            .put(TierKind::StaticAssets, key.clone(), StoredResponse::html("old"))
            .await
            .unwrap();
        manager
            .put(TierKind::DynamicPages, key.clone(), StoredResponse::html("new"))
            .await
            .unwrap();

        let hit = manager.lookup(&key, None).await.unwrap();
        assert_eq!(hit.response.body, "new");

        let restricted = manager
            .lookup(&key, Some(&[TierKind::StaticAssets]))
            .await
            .unwrap();
        assert_eq!(restricted.response.body, "old");
    }

    #[tokio::test]
    async fn test_put_enforces_max_entries() {
        let (manager, store) = test_manager("v1");
        for url in ["/1", "/2", "/3"] {
            manager
                .put(TierKind::ApiResponses, RequestKey::get(url), StoredResponse::html(url))
                .await
                .unwrap();
        }
        let entries = store.entries("v1-api").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(manager.lookup_in(TierKind::ApiResponses, &RequestKey::get("/1")).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_storage_is_miss() {
        let (manager, _) = test_manager("v1");
        assert!(manager
            .lookup_in(TierKind::OfflineFallback, &RequestKey::get("/offline"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_stats_labels_current_tiers() {
        let (manager, store) = test_manager("v2");
        store.open("v1-static").await.unwrap();
        manager.open(TierKind::StaticAssets).await.unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].kind, None);
        assert_eq!(stats[1].kind, Some(TierKind::StaticAssets));
    }
}
