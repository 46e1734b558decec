//! Runtime configuration for offline-cache-tier.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! The engine version, tier policies, and classification knobs all live here
//! and are injected into the components that need them.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::cache::tier::{TierKind, TierPolicy};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "offline-cache-tier", about = "Offline-resilient request-intercepting cache")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    /// Upstream origin URL (overrides `server.upstream`).
    #[arg(short, long)]
    pub upstream: Option<String>,

    /// Path to the precache manifest (overrides `lifecycle.manifest_path`).
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP front settings.
    pub server: ServerConfig,

    /// Classification and strategy settings.
    pub engine: EngineConfig,

    /// Per-tier eviction policies.
    pub tiers: TierPolicies,

    /// Install/activate settings.
    pub lifecycle: LifecycleConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Base URL origin fetches are forwarded to. Required to serve; see
    /// [`Config::validate`].
    pub upstream: Option<String>,

    /// Origin request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body accepted by the intercepting front.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            upstream: None,
            request_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Engine settings: version, origin, and classification rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Process-wide build version. Tier storages are named `<version>-<kind>`.
    pub version: String,

    /// The application's own origin. Requests to any other origin pass through.
    pub app_origin: String,

    /// Path prefixes that mark a request as an API call.
    pub api_path_prefixes: Vec<String>,

    /// Hosts that mark a request as an API call.
    pub api_hosts: Vec<String>,

    /// How long a navigation waits for the network before using cache.
    pub navigation_timeout_ms: u64,

    /// Abort the navigation fetch when the wait times out instead of letting
    /// it finish in the background.
    pub abort_on_timeout: bool,

    /// URL of the designated offline document.
    pub offline_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "blog-pwa-v2.0.0".to_string(),
            app_origin: "http://localhost:8080".to_string(),
            api_path_prefixes: vec!["/api/".to_string()],
            api_hosts: vec!["realworld.show".to_string()],
            navigation_timeout_ms: 3000,
            abort_on_timeout: false,
            offline_url: "/offline".to_string(),
        }
    }
}

/// Eviction policy for each tier kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicies {
    pub static_assets: TierPolicy,
    pub dynamic_pages: TierPolicy,
    pub api_responses: TierPolicy,
    pub offline_fallback: TierPolicy,
}

impl Default for TierPolicies {
    fn default() -> Self {
        Self {
            static_assets: TierPolicy::unbounded(),
            dynamic_pages: TierPolicy {
                max_entries: Some(50),
                max_age_secs: Some(24 * 60 * 60),
            },
            api_responses: TierPolicy {
                max_entries: Some(100),
                max_age_secs: Some(24 * 60 * 60),
            },
            offline_fallback: TierPolicy::unbounded(),
        }
    }
}

impl TierPolicies {
    /// Policy for a given tier kind.
    pub fn for_kind(&self, kind: TierKind) -> &TierPolicy {
        match kind {
            TierKind::StaticAssets => &self.static_assets,
            TierKind::DynamicPages => &self.dynamic_pages,
            TierKind::ApiResponses => &self.api_responses,
            TierKind::OfflineFallback => &self.offline_fallback,
        }
    }
}

/// Install/activate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Skip the waiting phase right after install.
    pub skip_waiting_on_install: bool,

    /// Maximum number of concurrent precache fetches.
    pub precache_concurrency: usize,

    /// Path to the precache manifest (JSON).
    pub manifest_path: Option<PathBuf>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            skip_waiting_on_install: true,
            precache_concurrency: 8,
            manifest_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides.
    pub fn with_cli_overrides(mut self, cli: &Cli) -> Self {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(upstream) = &cli.upstream {
            self.server.upstream = Some(upstream.clone());
        }
        if let Some(manifest) = &cli.manifest {
            self.lifecycle.manifest_path = Some(manifest.clone());
        }
        self
    }

    /// Check that the HTTP front can serve without fetching from itself.
    ///
    /// The upstream must be set and must not be the app origin or the
    /// listen address.
    pub fn validate(&self) -> anyhow::Result<()> {
        let upstream = match &self.server.upstream {
            Some(upstream) => Url::parse(upstream)
                .with_context(|| format!("invalid server.upstream {upstream:?}"))?,
            None => anyhow::bail!("server.upstream is required: set it to the application's real origin"),
        };
        let app_origin = Url::parse(&self.engine.app_origin)
            .with_context(|| format!("invalid engine.app_origin {:?}", self.engine.app_origin))?;

        if upstream.origin() == app_origin.origin() {
            anyhow::bail!("server.upstream {upstream} is the app origin; requests would loop");
        }

        let listen: SocketAddr = self
            .server
            .listen
            .parse()
            .with_context(|| format!("invalid server.listen {:?}", self.server.listen))?;
        if targets_listener(&upstream, listen) {
            anyhow::bail!(
                "server.upstream {upstream} points at the listen address {listen}; requests would loop"
            );
        }
        Ok(())
    }

    /// Navigation timeout as a duration.
    pub fn navigation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine.navigation_timeout_ms)
    }
}

/// Whether `upstream` would be answered by a server bound to `listen`.
fn targets_listener(upstream: &Url, listen: SocketAddr) -> bool {
    if upstream.port_or_known_default() != Some(listen.port()) {
        return false;
    }
    let ip = match upstream.host() {
        Some(Host::Domain(domain)) => return domain.eq_ignore_ascii_case("localhost") && local(listen.ip()),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        None => return false,
    };
    ip == listen.ip() || (listen.ip().is_unspecified() && (ip.is_loopback() || ip.is_unspecified()))
}

fn local(ip: IpAddr) -> bool {
    ip.is_loopback() || ip.is_unspecified()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.engine.navigation_timeout_ms, 3000);
        assert_eq!(cfg.engine.offline_url, "/offline");
        assert_eq!(cfg.tiers.dynamic_pages.max_entries, Some(50));
        assert!(cfg.tiers.static_assets.max_entries.is_none());
        assert!(cfg.lifecycle.skip_waiting_on_install);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"engine": {"version": "v9"}, "tiers": {"api_responses": {"max_entries": 2}}}"#)
                .unwrap();
        assert_eq!(cfg.engine.version, "v9");
        assert_eq!(cfg.engine.api_path_prefixes, vec!["/api/".to_string()]);
        assert_eq!(cfg.tiers.api_responses.max_entries, Some(2));
        assert_eq!(cfg.tiers.api_responses.max_age_secs, None);
        assert_eq!(cfg.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Config::load(&tmp.path().join("nope.json")).unwrap();
        assert_eq!(cfg.engine.version, "blog-pwa-v2.0.0");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"server": {"listen": "127.0.0.1:9000"}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.server.listen, "127.0.0.1:9000");
        assert_eq!(cfg.navigation_timeout(), std::time::Duration::from_secs(3));
    }

    fn serving(listen: &str, app_origin: &str, upstream: Option<&str>) -> Config {
        let mut cfg = Config::default();
        cfg.server.listen = listen.to_string();
        cfg.server.upstream = upstream.map(str::to_string);
        cfg.engine.app_origin = app_origin.to_string();
        cfg
    }

    #[test]
    fn test_validate_requires_upstream() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("server.upstream is required"));
    }

    #[test]
    fn test_validate_rejects_self_fetch() {
        // Upstream is the app origin.
        let cfg = serving("0.0.0.0:8080", "http://localhost:8080", Some("http://localhost:8080"));
        assert!(cfg.validate().is_err());

        // Upstream is the listener itself under another name.
        for upstream in ["http://127.0.0.1:8080", "http://localhost:8080/", "http://[::1]:8080"] {
            let cfg = serving("0.0.0.0:8080", "https://blog.test", Some(upstream));
            assert!(cfg.validate().is_err(), "{upstream}");
        }
        let cfg = serving("127.0.0.1:80", "https://blog.test", Some("http://127.0.0.1"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_distinct_upstream() {
        let cfg = serving("0.0.0.0:8080", "http://localhost:8080", Some("http://127.0.0.1:3000"));
        cfg.validate().unwrap();

        let cfg = serving("127.0.0.1:8080", "https://blog.test", Some("http://10.0.0.5:8080"));
        cfg.validate().unwrap();

        let cfg = serving("0.0.0.0:8080", "https://blog.test", Some("https://api.blog.test"));
        cfg.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert!(serving("0.0.0.0:8080", "http://localhost:8080", Some("not a url"))
            .validate()
            .is_err());
        assert!(serving("nowhere", "http://localhost:8080", Some("http://127.0.0.1:3000"))
            .validate()
            .is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "offline-cache-tier",
            "--listen",
            "127.0.0.1:1",
            "-m",
            "m.json",
            "--upstream",
            "http://127.0.0.1:3000",
        ]);
        let cfg = Config::default().with_cli_overrides(&cli);
        assert_eq!(cfg.server.listen, "127.0.0.1:1");
        assert_eq!(cfg.server.upstream.as_deref(), Some("http://127.0.0.1:3000"));
        assert_eq!(cfg.lifecycle.manifest_path, Some(PathBuf::from("m.json")));
    }
}
