//! offline-cache-tier binary: serves an application origin through the
//! intercepting engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use url::Url;

use offline_cache_tier::cache::manager::TierManager;
use offline_cache_tier::cache::store::MemoryTierStore;
use offline_cache_tier::config::{Cli, Config};
use offline_cache_tier::engine::Engine;
use offline_cache_tier::lifecycle::controller::LifecycleController;
use offline_cache_tier::lifecycle::manifest::PrecacheManifest;
use offline_cache_tier::metrics::EngineMetrics;
use offline_cache_tier::network::origin::HttpOrigin;
use offline_cache_tier::server::proxy::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "offline_cache_tier=debug,tower_http=debug"
    } else {
        "offline_cache_tier=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("offline-cache-tier v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?.with_cli_overrides(&cli);
    config.validate()?;
    let config = Arc::new(config);

    info!(
        version = config.engine.version,
        app_origin = config.engine.app_origin,
        upstream = ?config.server.upstream,
        navigation_timeout_ms = config.engine.navigation_timeout_ms,
        "Configuration loaded"
    );

    let manifest = match &config.lifecycle.manifest_path {
        Some(path) => PrecacheManifest::load(path)?,
        None => PrecacheManifest::default(),
    };
    info!(entries = manifest.len(), "Precache manifest loaded");

    // Build the engine components.
    let metrics = Arc::new(EngineMetrics::new()?);
    let store = Arc::new(MemoryTierStore::new());
    let tiers = Arc::new(TierManager::new(&config, store, metrics.clone()));

    let upstream = config.server.upstream.as_deref().map(Url::parse).transpose()?;
    let origin = Arc::new(HttpOrigin::new(
        upstream,
        Duration::from_secs(config.server.request_timeout_secs),
    )?);

    let lifecycle = Arc::new(LifecycleController::new(&config, tiers.clone(), origin.clone())?);
    let engine = Arc::new(Engine::new(
        &config,
        tiers.clone(),
        origin,
        lifecycle.clone(),
        metrics.clone(),
    )?);

    // Install in the background; requests pass through until activation.
    {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            match lifecycle.install(&manifest).await {
                Ok(report) => info!(
                    precached = report.precached.len(),
                    failed = report.failed.len(),
                    offline_cached = report.offline_cached,
                    activated = report.activated,
                    "Install finished"
                ),
                Err(e) => error!(error = %e, "Install failed"),
            }
        });
    }

    // Build application state.
    let state = Arc::new(AppState {
        engine,
        lifecycle,
        tiers,
        metrics,
        app_origin: Url::parse(&config.engine.app_origin)?,
        config: config.clone(),
        start_time: Instant::now(),
    });

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.server.listen.clone();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
