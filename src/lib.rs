//! offline-cache-tier: request-intercepting tiered cache.
//!
//! Sits between an application and its origin and makes every same-origin
//! request offline-resilient:
//!   classify → strategy (network and/or tier) → offline fallback
//!
//! Four versioned tiers (static assets, pages, API responses, offline
//! document) are installed, activated, and swept per engine version.

pub mod cache;
pub mod config;
pub mod engine;
pub mod intercept;
pub mod lifecycle;
pub mod metrics;
pub mod network;
pub mod server;
