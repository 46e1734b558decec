//! Tiered response cache.
//!
//! - [`tier`]: tier kinds, policies, versioned storage names
//! - [`entry`]: request keys, response snapshots, cache entries
//! - [`store`]: the `TierStore` capability and its in-memory implementation
//! - [`evictor`]: per-tier eviction policy (max age, then FIFO capacity)
//! - [`manager`]: tier manager that owns storages and enforces policy

pub mod entry;
pub mod evictor;
pub mod manager;
pub mod store;
pub mod tier;
