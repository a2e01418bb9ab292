//! Benchmarks for the content merge.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use service_updater::core::StageName;
use service_updater::merge::{normalize_pricing_tiers, plan_merge, MergeLimits, StageOutputs};
use service_updater::testing::{bare_service, default_stage_content};

fn pricing_benchmark(c: &mut Criterion) {
    let raw: Vec<_> = (0..8)
        .map(|i| {
            json!({
                "name": format!("Plan {i}"),
                "price": format!("${},{}99.00", i + 1, i),
                "duration": "per month",
                "features": ["Filing", "Support", "Review"],
            })
        })
        .collect();

    c.bench_function("normalize_pricing_tiers", |b| {
        b.iter(|| normalize_pricing_tiers(black_box(&raw), 4))
    });
}

fn merge_benchmark(c: &mut Criterion) {
    let existing = bare_service("svc-bench");
    let outputs = StageOutputs {
        details: Some(default_stage_content(StageName::Details)),
        disclaimer: Some(default_stage_content(StageName::Disclaimer)),
        funnel: Some(default_stage_content(StageName::Funnel)),
        faqs: Some(default_stage_content(StageName::Faqs)),
    };

    c.bench_function("plan_merge", |b| {
        b.iter(|| plan_merge(black_box(&existing), black_box(&outputs), MergeLimits::default()))
    });
}

criterion_group!(benches, pricing_benchmark, merge_benchmark);
criterion_main!(benches);
