//! Offline fallback: the last responder on every failed navigation.
//!
//! Reads only the offline-fallback tier; if the designated document is not
//! there, returns a page built from a static string.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::entry::{RequestKey, StoredResponse};
use crate::cache::manager::TierManager;
use crate::cache::tier::TierKind;

/// Self-contained offline page with a retry button.
const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Offline</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
  </head>
  <body style="font-family: system-ui, sans-serif; text-align: center; padding: 2rem;">
    <h1>You're offline</h1>
    <p>Your internet connection is unavailable.</p>
    <button onclick="location.reload()">Try Again</button>
  </body>
</html>
"#;

/// The synthesized page, independent of any storage.
pub fn synthesized_offline_page() -> StoredResponse {
    let mut response = StoredResponse::html(OFFLINE_HTML);
    response
        .headers
        .push(("cache-control".to_string(), "no-store".to_string()));
    response
}

/// Resolves the offline page.
pub struct OfflineFallback {
    tiers: Arc<TierManager>,
    offline_key: RequestKey,
}

impl OfflineFallback {
    /// `offline_url` must be absolute (resolved against the app origin).
    pub fn new(tiers: Arc<TierManager>, offline_url: &str) -> Self {
        Self {
            tiers,
            offline_key: RequestKey::get(offline_url),
        }
    }

    pub fn offline_key(&self) -> &RequestKey {
        &self.offline_key
    }

    /// The cached offline document, or the synthesized page. Never fails.
    pub async fn offline_page(&self) -> StoredResponse {
        match self
            .tiers
            .lookup_in(TierKind::OfflineFallback, &self.offline_key)
            .await
        {
            Some(entry) => {
                debug!(key = %self.offline_key, "Serving cached offline document");
                entry.response
            }
            None => {
                warn!(key = %self.offline_key, "Offline document not cached, synthesizing");
                synthesized_offline_page()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::MemoryTierStore;
    use crate::config::Config;
    use crate::metrics::EngineMetrics;

    fn manager() -> Arc<TierManager> {
        let store = Arc::new(MemoryTierStore::new());
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        Arc::new(TierManager::new(&Config::default(), store, metrics))
    }

    #[test]
    fn test_synthesized_page_has_retry() {
        let page = synthesized_offline_page();
        assert_eq!(page.status, 200);
        assert!(page.header("content-type").unwrap().starts_with("text/html"));
        let body = std::str::from_utf8(&page.body).unwrap();
        assert!(body.contains("location.reload()"));
    }

    #[tokio::test]
    async fn test_empty_tier_synthesizes() {
        let fallback = OfflineFallback::new(manager(), "https://app.test/offline");
        let page = fallback.offline_page().await;
        assert_eq!(page, synthesized_offline_page());
    }

    #[tokio::test]
    async fn test_cached_document_wins() {
        let tiers = manager();
        tiers
            .put(
                TierKind::OfflineFallback,
                RequestKey::get("https://app.test/offline"),
                StoredResponse::html("<h1>cached offline</h1>"),
            )
            .await
            .unwrap();
        let fallback = OfflineFallback::new(tiers, "https://app.test/offline");
        assert_eq!(fallback.offline_page().await.body, "<h1>cached offline</h1>");
    }

    #[tokio::test]
    async fn test_other_tiers_are_ignored() {
        let tiers = manager();
        tiers
            .put(
                TierKind::StaticAssets,
                RequestKey::get("https://app.test/offline"),
                StoredResponse::html("static copy"),
            )
            .await
            .unwrap();
        let fallback = OfflineFallback::new(tiers, "https://app.test/offline");
        assert_eq!(fallback.offline_page().await, synthesized_offline_page());
    }
}
