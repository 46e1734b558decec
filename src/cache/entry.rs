//! Cache entries and stored response snapshots.
//!
//! An entry is owned by exactly one tier storage. Copying a response into a
//! second tier clones the snapshot; nothing is shared.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::time::Instant;

/// Lookup key of a cache entry: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &str, url: &str) -> Self {
        Self(format!("{} {url}", method.to_ascii_uppercase()))
    }

    /// Key of a `GET` request for `url`.
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL half of the key.
    pub fn url(&self) -> &str {
        self.0.split_once(' ').map(|(_, url)| url).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A snapshot of a response: status, headers, and the full body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A `200 OK` HTML document.
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new(
            200,
            vec![("content-type".to_string(), "text/html; charset=utf-8".to_string())],
            body,
        )
    }

    /// A plain-text response with the given status.
    pub fn text(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(
            status,
            vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body,
        )
    }

    /// Whether the status is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Global monotonic insertion counter, breaks ties between equal timestamps.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A stored response inside one tier.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: StoredResponse,
    pub inserted_at: Instant,

    /// Insertion sequence number; later writes have larger values.
    pub seq: u64,
}

impl CacheEntry {
    /// Snapshot `response` under `key`, stamped with the current time.
    pub fn new(key: RequestKey, response: StoredResponse) -> Self {
        Self {
            key,
            response,
            inserted_at: Instant::now(),
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta {
            key: self.key.clone(),
            inserted_at: self.inserted_at,
            seq: self.seq,
        }
    }

    /// Whether this entry was written after `other`.
    pub fn is_newer_than(&self, other: &CacheEntry) -> bool {
        (self.inserted_at, self.seq) > (other.inserted_at, other.seq)
    }
}

/// Entry metadata used by the eviction policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: RequestKey,
    pub inserted_at: Instant,
    pub seq: u64,
}
