//! Benchmarks for classification and tier storage.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use offline_cache_tier::cache::entry::{CacheEntry, EntryMeta, RequestKey, StoredResponse};
use offline_cache_tier::cache::evictor::Evictor;
use offline_cache_tier::cache::manager::TierManager;
use offline_cache_tier::cache::store::MemoryTierStore;
use offline_cache_tier::cache::tier::{TierKind, TierPolicy};
use offline_cache_tier::config::{Config, EngineConfig};
use offline_cache_tier::intercept::classifier::Classifier;
use offline_cache_tier::intercept::request::{Destination, Request};
use offline_cache_tier::metrics::EngineMetrics;

fn bench_classify(c: &mut Criterion) {
    let config = EngineConfig {
        app_origin: "https://app.test".to_string(),
        ..EngineConfig::default()
    };
    let classifier = Classifier::new(&config).unwrap();

    let requests = vec![
        Request::navigate("https://app.test/articles/hello").unwrap(),
        Request::get("https://app.test/api/articles?limit=10").unwrap(),
        Request::get("https://app.test/img/logo.png")
            .unwrap()
            .with_destination(Destination::Image),
        Request::get("https://app.test/assets/app.js").unwrap(),
        Request::get("https://cdn.example.com/lib.js").unwrap(),
    ];

    c.bench_function("classify_mixed_requests", |b| {
        b.iter(|| {
            for request in &requests {
                black_box(classifier.classify(black_box(request)));
            }
        })
    });
}

fn bench_eviction_selection(c: &mut Criterion) {
    let evictor = Evictor::new(TierPolicy {
        max_entries: Some(100),
        max_age_secs: Some(24 * 60 * 60),
    });

    // 10,000 entries over a 100-entry limit.
    let entries: Vec<EntryMeta> = (0..10_000)
        .map(|i| {
            CacheEntry::new(
                RequestKey::get(&format!("https://app.test/api/items/{i}")),
                StoredResponse::text(200, "{}"),
            )
            .meta()
        })
        .collect();

    c.bench_function("eviction_select_from_10k", |b| {
        b.iter(|| {
            let now = tokio::time::Instant::now();
            black_box(evictor.select_victims(black_box(&entries), now));
        })
    });
}

fn bench_tier_put(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut config = Config::default();
    config.engine.version = "bench".to_string();
    let metrics = Arc::new(EngineMetrics::new().unwrap());
    let tiers = TierManager::new(&config, Arc::new(MemoryTierStore::new()), metrics);

    let mut i = 0u64;
    c.bench_function("tier_put_with_policy", |b| {
        b.iter(|| {
            i += 1;
            runtime.block_on(async {
                tiers
                    .put(
                        TierKind::DynamicPages,
                        RequestKey::get(&format!("https://app.test/articles/{}", i % 200)),
                        StoredResponse::html("<p>article</p>"),
                    )
                    .await
                    .unwrap();
            });
        })
    });
}

criterion_group!(benches, bench_classify, bench_eviction_selection, bench_tier_put);
criterion_main!(benches);
