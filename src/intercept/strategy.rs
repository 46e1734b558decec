//! Strategy executors: resolve a classified request from network and/or cache.
//!
//! Each request makes a single attempt per source. Cache reads and writes
//! only touch the tier chosen by the classifier.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::entry::StoredResponse;
use crate::cache::manager::TierManager;
use crate::cache::tier::TierKind;
use crate::engine::EngineError;
use crate::intercept::classifier::{Classification, Strategy};
use crate::intercept::fallback::OfflineFallback;
use crate::intercept::request::Request;
use crate::network::origin::{NetworkError, Origin};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    Offline,
    PassThrough,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Offline => "offline",
            ResponseSource::PassThrough => "passthrough",
        }
    }
}

/// A response together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub response: StoredResponse,
    pub source: ResponseSource,
}

impl Resolved {
    pub fn network(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn cache(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }

    pub fn offline(response: StoredResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Offline,
        }
    }
}

/// Runs the four strategies against one tier manager and origin.
pub struct Executor {
    tiers: Arc<TierManager>,
    origin: Arc<dyn Origin>,
    fallback: OfflineFallback,
    navigation_timeout: Duration,
    abort_on_timeout: bool,
}

impl Executor {
    pub fn new(
        tiers: Arc<TierManager>,
        origin: Arc<dyn Origin>,
        fallback: OfflineFallback,
        navigation_timeout: Duration,
        abort_on_timeout: bool,
    ) -> Self {
        Self {
            tiers,
            origin,
            fallback,
            navigation_timeout,
            abort_on_timeout,
        }
    }

    pub fn fallback(&self) -> &OfflineFallback {
        &self.fallback
    }

    /// Resolve `request` with the classified strategy.
    pub async fn execute(
        &self,
        classification: Classification,
        request: &Request,
    ) -> Result<Resolved, EngineError> {
        let tier = classification.tier;
        match classification.strategy {
            Strategy::NetworkFirstWithTimeout => {
                Ok(self.network_first_with_timeout(tier, request).await)
            }
            Strategy::NetworkThenCacheFallback => self.network_then_cache(tier, request).await,
            Strategy::CacheFirstThenNetworkRefresh | Strategy::CacheFirstThenNetwork => {
                self.cache_first(tier, request).await
            }
        }
    }

    async fn store(&self, tier: TierKind, request: &Request, response: &StoredResponse) {
        if !request.is_cacheable() || !response.is_ok() {
            return;
        }
        if let Err(e) = self.tiers.put(tier, request.key(), response.clone()).await {
            warn!(tier = %tier, url = %request.url, error = %e, "Failed to cache response");
        }
    }

    async fn cached(&self, tier: TierKind, request: &Request) -> Option<StoredResponse> {
        if !request.is_cacheable() {
            return None;
        }
        self.tiers
            .lookup_in(tier, &request.key())
            .await
            .map(|entry| entry.response)
    }

    /// Navigation: race the network against the timeout, then cache, then
    /// the offline page. Never fails.
    ///
    /// The fetch runs as its own task. When the wait times out the task keeps
    /// running and still stores its response, unless `abort_on_timeout` is set.
    async fn network_first_with_timeout(&self, tier: TierKind, request: &Request) -> Resolved {
        let tiers = self.tiers.clone();
        let origin = self.origin.clone();
        let req = request.clone();

        let task = tokio::spawn(async move {
            let response = origin.fetch(&req).await?;
            if req.is_cacheable() && response.is_ok() {
                if let Err(e) = tiers.put(tier, req.key(), response.clone()).await {
                    warn!(tier = %tier, url = %req.url, error = %e, "Failed to cache navigation");
                }
            }
            Ok::<_, NetworkError>(response)
        });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.navigation_timeout, task).await {
            Ok(Ok(Ok(response))) if response.is_ok() => return Resolved::network(response),
            Ok(Ok(Ok(response))) => {
                debug!(url = %request.url, status = response.status, "Navigation response not ok");
            }
            Ok(Ok(Err(e))) => {
                debug!(url = %request.url, error = %e, "Navigation fetch failed");
            }
            Ok(Err(e)) => {
                warn!(url = %request.url, error = %e, "Navigation fetch task failed");
            }
            Err(_) => {
                debug!(
                    url = %request.url,
                    timeout_ms = self.navigation_timeout.as_millis() as u64,
                    "Navigation timed out"
                );
                if self.abort_on_timeout {
                    abort.abort();
                }
            }
        }

        if let Some(response) = self.cached(tier, request).await {
            debug!(url = %request.url, "Serving navigation from cache");
            return Resolved::cache(response);
        }

        Resolved::offline(self.fallback.offline_page().await)
    }

    /// API: trust the network and cache for later; on failure serve the
    /// cached entry or surface the error.
    async fn network_then_cache(
        &self,
        tier: TierKind,
        request: &Request,
    ) -> Result<Resolved, EngineError> {
        match self.origin.fetch(request).await {
            Ok(response) => {
                self.store(tier, request, &response).await;
                Ok(Resolved::network(response))
            }
            Err(e) => {
                if let Some(response) = self.cached(tier, request).await {
                    debug!(url = %request.url, error = %e, "Serving API response from cache");
                    return Ok(Resolved::cache(response));
                }
                Err(EngineError::network(request, e))
            }
        }
    }

    /// Static assets: serve from cache when present, otherwise fetch and store.
    async fn cache_first(&self, tier: TierKind, request: &Request) -> Result<Resolved, EngineError> {
        if let Some(response) = self.cached(tier, request).await {
            return Ok(Resolved::cache(response));
        }

        let response = self
            .origin
            .fetch(request)
            .await
            .map_err(|e| EngineError::network(request, e))?;
        self.store(tier, request, &response).await;
        Ok(Resolved::network(response))
    }
}
