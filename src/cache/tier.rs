//! Tier kinds, policies, and versioned tier naming.
//!
//! Four tiers live side by side. Each is a named storage partition whose
//! name carries the engine version, so a new build gets fresh storages and
//! the previous generation can be swept at activation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Identifies which tier a request class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TierKind {
    /// Precached and runtime-cached scripts, styles, images, fonts.
    StaticAssets,
    /// Navigated HTML documents.
    DynamicPages,
    /// Same-origin API responses.
    ApiResponses,
    /// The designated offline document.
    OfflineFallback,
}

impl TierKind {
    /// All tier kinds, in a stable order.
    pub const ALL: [TierKind; 4] = [
        TierKind::StaticAssets,
        TierKind::DynamicPages,
        TierKind::ApiResponses,
        TierKind::OfflineFallback,
    ];

    /// Suffix used in the storage name.
    pub fn suffix(&self) -> &'static str {
        match self {
            TierKind::StaticAssets => "static",
            TierKind::DynamicPages => "dynamic",
            TierKind::ApiResponses => "api",
            TierKind::OfflineFallback => "offline",
        }
    }

    /// Storage name of this tier for a given engine version.
    pub fn storage_name(&self, version: &str) -> String {
        format!("{version}-{}", self.suffix())
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierKind::StaticAssets => write!(f, "static-assets"),
            TierKind::DynamicPages => write!(f, "dynamic-pages"),
            TierKind::ApiResponses => write!(f, "api-responses"),
            TierKind::OfflineFallback => write!(f, "offline-fallback"),
        }
    }
}

/// Eviction policy for a single tier. `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
    /// Maximum number of entries; the oldest are dropped first.
    pub max_entries: Option<usize>,

    /// Maximum entry age in seconds, checked when the tier is written.
    pub max_age_secs: Option<u64>,
}

impl TierPolicy {
    /// A policy that never evicts.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age_secs.is_none()
    }
}

/// A named, versioned cache tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTier {
    pub kind: TierKind,

    /// Storage name, `<generation>-<suffix>`.
    pub name: String,

    /// Engine version this tier belongs to.
    pub generation: String,

    pub policy: TierPolicy,
}

impl CacheTier {
    pub fn new(kind: TierKind, generation: &str, policy: TierPolicy) -> Self {
        Self {
            kind,
            name: kind.storage_name(generation),
            generation: generation.to_string(),
            policy,
        }
    }
}

/// Storage names of every tier for one generation.
pub fn generation_names(version: &str) -> HashSet<String> {
    TierKind::ALL
        .iter()
        .map(|kind| kind.storage_name(version))
        .collect()
}

/// Whether a storage name belongs to one of the current generation prefixes.
pub fn is_current(name: &str, current: &HashSet<String>) -> bool {
    current.iter().any(|prefix| name.starts_with(prefix.as_str()))
}
