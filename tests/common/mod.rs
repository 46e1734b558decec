//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use offline_cache_tier::cache::entry::{CacheEntry, EntryMeta, RequestKey, StoredResponse};
use offline_cache_tier::cache::manager::TierManager;
use offline_cache_tier::cache::store::{MemoryTierStore, StoreError, TierStore};
use offline_cache_tier::config::Config;
use offline_cache_tier::engine::Engine;
use offline_cache_tier::intercept::request::Request;
use offline_cache_tier::lifecycle::controller::LifecycleController;
use offline_cache_tier::lifecycle::manifest::PrecacheManifest;
use offline_cache_tier::metrics::EngineMetrics;
use offline_cache_tier::network::origin::{NetworkError, Origin};

pub const APP: &str = "https://app.test";

pub fn url(path: &str) -> String {
    format!("{APP}{path}")
}

/// What the fake origin does for a URL.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(StoredResponse),
    Fail,
    Hang,
    Delay(Duration, StoredResponse),
}

/// An origin answering from a script; unscripted URLs fail to connect.
#[derive(Default)]
pub struct ScriptedOrigin {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    pub fn respond(&self, url: &str, response: StoredResponse) {
        self.script(url, Reply::Respond(response));
    }

    pub fn fail(&self, url: &str) {
        self.script(url, Reply::Fail);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Origin for ScriptedOrigin {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse, NetworkError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let reply = self.replies.lock().unwrap().get(&url).cloned();
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Fail) | None => Err(NetworkError::Connect(format!("unreachable: {url}"))),
        }
    }
}

/// A memory store whose opens, writes and reads can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryTierStore,
    pub fail_opens: AtomicBool,
    pub fail_puts: AtomicBool,
    pub fail_matches: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_matches(&self, fail: bool) {
        self.fail_matches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TierStore for FlakyStore {
    async fn open(&self, name: &str) -> Result<(), StoreError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("cannot open {name}")));
        }
        self.inner.open(name).await
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), StoreError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::QuotaExceeded(name.to_string()));
        }
        self.inner.put(name, entry).await
    }

    async fn match_entry(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, StoreError> {
        if self.fail_matches.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("read failed".to_string()));
        }
        self.inner.match_entry(name, key).await
    }

    async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys().await
    }

    async fn entries(&self, name: &str) -> Result<Vec<EntryMeta>, StoreError> {
        self.inner.entries(name).await
    }

    async fn delete_entry(&self, name: &str, key: &RequestKey) -> Result<bool, StoreError> {
        self.inner.delete_entry(name, key).await
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.version = "v2".to_string();
    config.engine.app_origin = APP.to_string();
    config
}

/// Every component wired together over fakes.
pub struct Harness {
    pub config: Config,
    pub store: Arc<FlakyStore>,
    pub origin: Arc<ScriptedOrigin>,
    pub metrics: Arc<EngineMetrics>,
    pub tiers: Arc<TierManager>,
    pub lifecycle: Arc<LifecycleController>,
    pub engine: Arc<Engine>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FlakyStore::new());
        let origin = Arc::new(ScriptedOrigin::new());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let tiers = Arc::new(TierManager::new(&config, store.clone(), metrics.clone()));
        let lifecycle =
            Arc::new(LifecycleController::new(&config, tiers.clone(), origin.clone()).unwrap());
        let engine = Arc::new(
            Engine::new(
                &config,
                tiers.clone(),
                origin.clone(),
                lifecycle.clone(),
                metrics.clone(),
            )
            .unwrap(),
        );

        Self {
            config,
            store,
            origin,
            metrics,
            tiers,
            lifecycle,
            engine,
        }
    }

    /// A harness that has installed an empty manifest and taken control.
    pub async fn active(config: Config) -> Self {
        let harness = Self::new(config);
        let report = harness
            .lifecycle
            .install(&PrecacheManifest::default())
            .await
            .unwrap();
        assert!(report.activated);
        harness
    }

    /// Total entries across every storage.
    pub async fn total_entries(&self) -> usize {
        let mut total = 0;
        for name in self.store.keys().await.unwrap() {
            total += self.store.entries(&name).await.unwrap().len();
        }
        total
    }
}

pub fn json(body: &str) -> StoredResponse {
    StoredResponse::new(
        200,
        vec![("content-type".to_string(), "application/json".to_string())],
        body.to_string(),
    )
}
