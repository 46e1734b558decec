//! Lifecycle controller: install, activate, and version cutover.
//!
//! ```text
//! Parsed → Installing → Waiting → Activating → Active
//! ```
//!
//! Install precaches the manifest and the offline document, then either
//! waits or (with skip-waiting) activates straight away. Activation sweeps
//! storages from older generations, claims every consumer, and broadcasts
//! the new version so pages can reload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::entry::RequestKey;
use crate::cache::manager::TierManager;
use crate::cache::tier::TierKind;
use crate::config::Config;
use crate::intercept::request::Request;
use crate::lifecycle::manifest::{ManifestError, PrecacheManifest};
use crate::lifecycle::messages::{ControlMessage, Notification};
use crate::network::origin::Origin;

/// Capacity of the notification channel per consumer.
const NOTIFICATION_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("invalid application origin: {0}")]
    InvalidOrigin(#[from] url::ParseError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Lifecycle state of the current engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, nothing installed yet.
    Parsed,
    Installing,
    /// Installed; waiting to be activated.
    Waiting,
    Activating,
    /// Controls all consumers.
    Active,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Parsed => "parsed",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
        };
        f.write_str(name)
    }
}

/// Result of an install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// URLs stored in static-assets.
    pub precached: Vec<String>,
    /// Manifest URLs that could not be fetched or stored.
    pub failed: Vec<String>,
    /// Whether the offline document is in the offline-fallback tier.
    pub offline_cached: bool,
    /// Whether install went on to activate.
    pub activated: bool,
}

/// Result of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Storages deleted as stale.
    pub deleted: Vec<String>,
    /// Number of consumers that received the activation notice.
    pub consumers_notified: usize,
}

/// Drives install/activate for one engine version.
pub struct LifecycleController {
    version: String,
    app_origin: Url,
    offline_url: Url,
    skip_waiting_on_install: bool,
    precache_concurrency: usize,

    tiers: Arc<TierManager>,
    origin: Arc<dyn Origin>,

    state: RwLock<LifecycleState>,

    /// Set by install (when configured) or by a SKIP_WAITING message.
    skip_waiting: AtomicBool,

    /// Set once activation has claimed the consumers.
    controlling: AtomicBool,

    notifier: broadcast::Sender<Notification>,
}

impl LifecycleController {
    pub fn new(
        config: &Config,
        tiers: Arc<TierManager>,
        origin: Arc<dyn Origin>,
    ) -> Result<Self, LifecycleError> {
        let app_origin = Url::parse(&config.engine.app_origin)?;
        let offline_url = app_origin.join(&config.engine.offline_url)?;
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Ok(Self {
            version: config.engine.version.clone(),
            app_origin,
            offline_url,
            skip_waiting_on_install: config.lifecycle.skip_waiting_on_install,
            precache_concurrency: config.lifecycle.precache_concurrency.max(1),
            tiers,
            origin,
            state: RwLock::new(LifecycleState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controlling: AtomicBool::new(false),
            notifier,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Whether requests should be intercepted.
    pub fn is_controlling(&self) -> bool {
        self.controlling.load(Ordering::Acquire)
    }

    /// Register a consumer for notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Number of consumers currently subscribed.
    pub fn open_consumers(&self) -> usize {
        self.notifier.receiver_count()
    }

    fn notify(&self, notification: Notification) -> usize {
        // No receivers is not an error: nobody is listening yet.
        self.notifier.send(notification).unwrap_or(0)
    }

    async fn transition(
        &self,
        action: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut state = self.state.write().await;
        if *state != from {
            return Err(LifecycleError::InvalidTransition {
                action,
                state: *state,
            });
        }
        info!(from = %from, to = %to, version = self.version, "Lifecycle transition");
        *state = to;
        Ok(())
    }

    /// Fetch each URL and store successful responses in `tier`.
    ///
    /// Best-effort: returns `(stored, failed)`, both in input order.
    async fn fetch_into(&self, tier: TierKind, urls: Vec<Url>) -> (Vec<String>, Vec<String>) {
        let results: Vec<(String, bool)> = stream::iter(urls)
            .map(|url| async move {
                let request = Request::new("GET", url.clone());
                let stored = match self.origin.fetch(&request).await {
                    Ok(response) if response.is_ok() => {
                        match self.tiers.put(tier, request.key(), response).await {
                            Ok(()) => true,
                            Err(e) => {
                                warn!(tier = %tier, url = %url, error = %e, "Failed to store asset");
                                false
                            }
                        }
                    }
                    Ok(response) => {
                        warn!(url = %url, status = response.status, "Asset fetch not ok");
                        false
                    }
                    Err(e) => {
                        warn!(url = %url, error = %e, "Asset fetch failed");
                        false
                    }
                };
                (url.to_string(), stored)
            })
            .buffered(self.precache_concurrency)
            .collect()
            .await;

        let mut stored = Vec::new();
        let mut failed = Vec::new();
        for (url, ok) in results {
            if ok {
                stored.push(url);
            } else {
                failed.push(url);
            }
        }
        (stored, failed)
    }

    /// Put the offline document into the offline-fallback tier, copying the
    /// precached snapshot when there is one.
    async fn cache_offline_document(&self) -> bool {
        let key = RequestKey::get(self.offline_url.as_str());

        if let Some(entry) = self.tiers.lookup_in(TierKind::StaticAssets, &key).await {
            match self
                .tiers
                .put(TierKind::OfflineFallback, key, entry.response)
                .await
            {
                Ok(()) => return true,
                Err(e) => warn!(error = %e, "Could not copy offline document"),
            }
        }

        let (stored, _) = self
            .fetch_into(TierKind::OfflineFallback, vec![self.offline_url.clone()])
            .await;
        if stored.is_empty() {
            warn!(url = %self.offline_url, "Could not cache offline document");
            false
        } else {
            info!(url = %self.offline_url, "Offline document cached");
            true
        }
    }

    /// Install this version: precache the manifest, cache the offline
    /// document, then wait or activate.
    pub async fn install(
        &self,
        manifest: &PrecacheManifest,
    ) -> Result<InstallReport, LifecycleError> {
        let urls = manifest.resolve(&self.app_origin)?;
        self.transition("install", LifecycleState::Parsed, LifecycleState::Installing)
            .await?;

        if let Err(e) = self.tiers.open(TierKind::StaticAssets).await {
            warn!(error = %e, "Could not open static tier");
        }
        let (precached, failed) = self.fetch_into(TierKind::StaticAssets, urls).await;
        info!(
            precached = precached.len(),
            failed = failed.len(),
            "Precache complete"
        );

        let offline_cached = self.cache_offline_document().await;

        self.transition("finish install", LifecycleState::Installing, LifecycleState::Waiting)
            .await?;

        if self.skip_waiting_on_install {
            self.skip_waiting.store(true, Ordering::Release);
        }

        let activated = if self.skip_waiting.load(Ordering::Acquire) {
            match self.activate().await {
                Ok(_) => true,
                // A concurrent SKIP_WAITING got there first.
                Err(LifecycleError::InvalidTransition { state, .. }) => {
                    debug!(state = %state, "Activation already under way");
                    true
                }
                Err(e) => return Err(e),
            }
        } else {
            info!(version = self.version, "Installed, waiting for activation");
            false
        };

        Ok(InstallReport {
            precached,
            failed,
            offline_cached,
            activated,
        })
    }

    /// Activate this version: sweep stale storages, claim consumers, and
    /// announce the new version.
    pub async fn activate(&self) -> Result<ActivationReport, LifecycleError> {
        self.transition("activate", LifecycleState::Waiting, LifecycleState::Activating)
            .await?;

        let deleted = self.tiers.evict_stale(&self.tiers.current_names()).await;

        self.controlling.store(true, Ordering::Release);
        self.transition("finish activation", LifecycleState::Activating, LifecycleState::Active)
            .await?;

        let consumers_notified = self.notify(Notification::Activated {
            version: self.version.clone(),
        });
        info!(
            version = self.version,
            deleted = deleted.len(),
            consumers_notified,
            "Activated and took control"
        );

        Ok(ActivationReport {
            deleted,
            consumers_notified,
        })
    }

    /// Handle a control message. Commands have no reply; failures are logged.
    pub async fn handle_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                match self.state().await {
                    LifecycleState::Waiting => {
                        if let Err(e) = self.activate().await {
                            debug!(error = %e, "Skip-waiting activation raced");
                        }
                    }
                    state => debug!(state = %state, "Skip-waiting noted"),
                }
            }
            ControlMessage::CacheUrls(urls) => {
                self.warm_dynamic(urls).await;
            }
            ControlMessage::Unknown => {
                debug!("Ignoring unknown control message");
            }
        }
    }

    /// Fetch `urls` into the dynamic-pages tier and announce what was stored.
    ///
    /// URLs outside the app origin are dropped.
    pub async fn warm_dynamic(&self, urls: Vec<String>) -> Vec<String> {
        let mut resolved = Vec::with_capacity(urls.len());
        for url in &urls {
            match self.app_origin.join(url) {
                Ok(u) if u.origin() == self.app_origin.origin() => resolved.push(u),
                Ok(u) => warn!(url = %u, "Skipping URL outside the app origin"),
                Err(e) => warn!(url, error = %e, "Skipping invalid URL"),
            }
        }

        let (stored, failed) = self.fetch_into(TierKind::DynamicPages, resolved).await;
        if !failed.is_empty() {
            warn!(failed = failed.len(), "Some URLs could not be cached");
        }
        if !stored.is_empty() {
            self.notify(Notification::CacheUpdated {
                tier: self.tiers.storage_name(TierKind::DynamicPages).to_string(),
                urls: stored.clone(),
            });
        }
        info!(cached = stored.len(), "Warmed dynamic tier");
        stored
    }
}
