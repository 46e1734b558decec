//! Prometheus counters for the engine.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Engine-wide counters, registered in a private registry.
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Registry,

    /// Responses served, by source (network, cache, offline, passthrough).
    pub responses: IntCounterVec,

    /// Entries removed by tier policy, by tier and reason.
    pub evictions: IntCounterVec,

    /// Storage failures that were downgraded to misses, by operation.
    pub store_errors: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let responses = IntCounterVec::new(
            Opts::new("offline_cache_responses_total", "Responses served by source"),
            &["source"],
        )?;
        let evictions = IntCounterVec::new(
            Opts::new("offline_cache_evictions_total", "Entries evicted by tier policy"),
            &["tier", "reason"],
        )?;
        let store_errors = IntCounterVec::new(
            Opts::new("offline_cache_store_errors_total", "Storage failures treated as misses"),
            &["op"],
        )?;

        registry.register(Box::new(responses.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;

        Ok(Self {
            registry,
            responses,
            evictions,
            store_errors,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
