//! Precache manifest: the ordered asset list consumed at install.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid manifest URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// One precached asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    /// Content fingerprint produced by the build.
    pub revision: String,
}

/// Ordered, deduplicated list of assets to precache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheManifest {
    entries: Vec<ManifestEntry>,
}

impl PrecacheManifest {
    /// Build a manifest, keeping the first occurrence of each URL.
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen.insert(entry.url.clone()) {
                unique.push(entry);
            } else {
                warn!(url = entry.url, "Duplicate manifest entry ignored");
            }
        }
        Self { entries: unique }
    }

    /// Parse a JSON array of `{url, revision}`.
    pub fn from_json(data: &str) -> Result<Self, ManifestError> {
        let entries: Vec<ManifestEntry> = serde_json::from_str(data)?;
        Ok(Self::new(entries))
    }

    /// Load from a file. A missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            warn!("Precache manifest not found at {:?}, precaching nothing", path);
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute URLs of every entry, in manifest order.
    pub fn resolve(&self, base: &Url) -> Result<Vec<Url>, ManifestError> {
        self.entries
            .iter()
            .map(|entry| {
                base.join(&entry.url).map_err(|source| ManifestError::InvalidUrl {
                    url: entry.url.clone(),
                    source,
                })
            })
            .collect()
    }
}
