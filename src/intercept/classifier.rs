//! Request classification: maps a request to exactly one tier/strategy pair.
//!
//! Rules, first match wins:
//! 1. Different origin from the application: not intercepted.
//! 2. Top-level navigation: dynamic-pages, network first with timeout.
//! 3. API path prefix or API host: api-responses, network then cache.
//! 4. Image or font: static-assets, cache first then network refresh.
//! 5. Everything else: static-assets, cache first then network.

use url::{Origin as UrlOrigin, Url};

use crate::cache::tier::TierKind;
use crate::config::EngineConfig;
use crate::intercept::request::{Destination, Request};

/// The algorithm used to resolve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    NetworkFirstWithTimeout,
    NetworkThenCacheFallback,
    CacheFirstThenNetworkRefresh,
    CacheFirstThenNetwork,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::NetworkFirstWithTimeout => "network-first-with-timeout",
            Strategy::NetworkThenCacheFallback => "network-then-cache-fallback",
            Strategy::CacheFirstThenNetworkRefresh => "cache-first-then-network-refresh",
            Strategy::CacheFirstThenNetwork => "cache-first-then-network",
        };
        f.write_str(name)
    }
}

/// The tier/strategy pair chosen for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub tier: TierKind,
    pub strategy: Strategy,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cross-origin: fetched from the network untouched.
    PassThrough,
    Intercept(Classification),
}

/// Classification rules for one application origin.
#[derive(Debug, Clone)]
pub struct Classifier {
    app_origin: UrlOrigin,
    api_path_prefixes: Vec<String>,
    api_hosts: Vec<String>,
}

impl Classifier {
    pub fn new(config: &EngineConfig) -> Result<Self, url::ParseError> {
        let app_origin = Url::parse(&config.app_origin)?.origin();
        Ok(Self {
            app_origin,
            api_path_prefixes: config.api_path_prefixes.clone(),
            api_hosts: config.api_hosts.clone(),
        })
    }

    fn is_api(&self, url: &Url) -> bool {
        if self
            .api_path_prefixes
            .iter()
            .any(|prefix| url.path().starts_with(prefix.as_str()))
        {
            return true;
        }
        match url.host_str() {
            Some(host) => self
                .api_hosts
                .iter()
                .any(|api| host == api || host.ends_with(&format!(".{api}"))),
            None => false,
        }
    }

    /// Classify a request. Total and order-sensitive.
    pub fn classify(&self, request: &Request) -> Route {
        if request.url.origin() != self.app_origin {
            return Route::PassThrough;
        }

        let (tier, strategy) = if request.is_navigation() {
            (TierKind::DynamicPages, Strategy::NetworkFirstWithTimeout)
        } else if self.is_api(&request.url) {
            (TierKind::ApiResponses, Strategy::NetworkThenCacheFallback)
        } else if matches!(request.destination, Destination::Image | Destination::Font) {
            (TierKind::StaticAssets, Strategy::CacheFirstThenNetworkRefresh)
        } else {
            (TierKind::StaticAssets, Strategy::CacheFirstThenNetwork)
        };

        Route::Intercept(Classification { tier, strategy })
    }
}
