//! Engine: the single entry point for intercepted requests.
//!
//! Every request is classified once and dispatched to exactly one strategy:
//! 1. Until the lifecycle controller has taken control, requests pass through
//! 2. Cross-origin requests pass through untouched
//! 3. Same-origin requests run the classified strategy against their tier

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::cache::entry::StoredResponse;
use crate::cache::manager::TierManager;
use crate::config::Config;
use crate::intercept::classifier::{Classifier, Route};
use crate::intercept::fallback::OfflineFallback;
use crate::intercept::request::Request;
use crate::intercept::strategy::{Executor, Resolved, ResponseSource};
use crate::lifecycle::controller::LifecycleController;
use crate::metrics::EngineMetrics;
use crate::network::origin::{NetworkError, Origin};

#[derive(Error, Debug)]
pub enum EngineError {
    /// The network failed and no cached response could stand in.
    #[error("network request for {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error("invalid application origin: {0}")]
    InvalidOrigin(#[from] url::ParseError),
}

impl EngineError {
    pub fn network(request: &Request, source: NetworkError) -> Self {
        EngineError::Network {
            url: request.url.to_string(),
            source,
        }
    }
}

/// The request-interception engine.
pub struct Engine {
    classifier: Classifier,
    executor: Executor,
    origin: Arc<dyn Origin>,
    lifecycle: Arc<LifecycleController>,
    metrics: Arc<EngineMetrics>,
}

impl Engine {
    pub fn new(
        config: &Config,
        tiers: Arc<TierManager>,
        origin: Arc<dyn Origin>,
        lifecycle: Arc<LifecycleController>,
        metrics: Arc<EngineMetrics>,
    ) -> Result<Self, EngineError> {
        let classifier = Classifier::new(&config.engine)?;
        let offline_url = url::Url::parse(&config.engine.app_origin)?.join(&config.engine.offline_url)?;
        let fallback = OfflineFallback::new(tiers.clone(), offline_url.as_str());
        let executor = Executor::new(
            tiers,
            origin.clone(),
            fallback,
            config.navigation_timeout(),
            config.engine.abort_on_timeout,
        );

        Ok(Self {
            classifier,
            executor,
            origin,
            lifecycle,
            metrics,
        })
    }

    /// Route a request without executing it.
    pub fn route(&self, request: &Request) -> Route {
        if !self.lifecycle.is_controlling() {
            return Route::PassThrough;
        }
        self.classifier.classify(request)
    }

    /// Resolve one intercepted request.
    ///
    /// Navigations always resolve. Other requests return `EngineError::Network`
    /// when the network fails and their tier holds nothing for them.
    pub async fn handle(&self, request: Request) -> Result<Resolved, EngineError> {
        let result = match self.route(&request) {
            Route::PassThrough => {
                debug!(url = %request.url, "Passing request through");
                self.origin
                    .fetch(&request)
                    .await
                    .map(|response| Resolved {
                        response,
                        source: ResponseSource::PassThrough,
                    })
                    .map_err(|e| EngineError::network(&request, e))
            }
            Route::Intercept(classification) => {
                debug!(
                    url = %request.url,
                    tier = %classification.tier,
                    strategy = %classification.strategy,
                    "Intercepted request"
                );
                self.executor.execute(classification, &request).await
            }
        };

        if let Ok(resolved) = &result {
            self.metrics
                .responses
                .with_label_values(&[resolved.source.as_str()])
                .inc();
        }
        result
    }

    /// The offline page, as a failed navigation would see it.
    pub async fn offline_page(&self) -> StoredResponse {
        self.executor.fallback().offline_page().await
    }
}
