//! Eviction policy: decides which entries a tier drops on write.
//!
//! Two rules, applied in order:
//! - Entries older than `max_age_secs` are dropped.
//! - If more than `max_entries` remain, the oldest (FIFO by insertion) go.
//!
//! There is no background sweep; the tier manager runs this after each put.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::entry::{EntryMeta, RequestKey};
use crate::cache::tier::TierPolicy;

/// Why an entry was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Expired,
    OverCapacity,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Expired => "expired",
            EvictionReason::OverCapacity => "over_capacity",
        }
    }
}

/// An eviction candidate.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub key: RequestKey,
    pub reason: EvictionReason,
    inserted_at: Instant,
    seq: u64,
}

// Older entries compare greater, so the max-heap pops them first.
impl PartialEq for EvictionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.inserted_at == other.inserted_at && self.seq == other.seq
    }
}

impl Eq for EvictionCandidate {}

impl PartialOrd for EvictionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.inserted_at, other.seq).cmp(&(self.inserted_at, self.seq))
    }
}

/// The eviction policy engine for one tier.
#[derive(Debug, Clone)]
pub struct Evictor {
    policy: TierPolicy,
}

impl Evictor {
    pub fn new(policy: TierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    fn is_expired(&self, entry: &EntryMeta, now: Instant) -> bool {
        match self.policy.max_age_secs {
            Some(max_age) => now.duration_since(entry.inserted_at) > Duration::from_secs(max_age),
            None => false,
        }
    }

    /// Select the entries to drop from a tier holding `entries`.
    ///
    /// Expired entries come first, then the oldest survivors beyond
    /// `max_entries`.
    pub fn select_victims(&self, entries: &[EntryMeta], now: Instant) -> Vec<EvictionCandidate> {
        if self.policy.is_unbounded() {
            return Vec::new();
        }

        let mut victims = Vec::new();
        let mut heap = BinaryHeap::new();

        for entry in entries {
            let candidate = EvictionCandidate {
                key: entry.key.clone(),
                reason: EvictionReason::Expired,
                inserted_at: entry.inserted_at,
                seq: entry.seq,
            };
            if self.is_expired(entry, now) {
                victims.push(candidate);
            } else {
                heap.push(candidate);
            }
        }

        if let Some(max_entries) = self.policy.max_entries {
            let excess = heap.len().saturating_sub(max_entries);
            for _ in 0..excess {
                if let Some(mut candidate) = heap.pop() {
                    candidate.reason = EvictionReason::OverCapacity;
                    victims.push(candidate);
                } else {
                    break;
                }
            }
        }

        victims
    }
}
