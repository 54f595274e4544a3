//! Benchmarks for level building, field extraction and full runs.

use contentflow::prelude::*;
use contentflow::testing::ScriptedExecutor;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn levels_benchmark(c: &mut Criterion) {
    let graph = StageGraph::default_content_graph();

    c.bench_function("build_levels_all", |b| {
        b.iter(|| build_levels(black_box(&graph), LevelScope::All))
    });
    c.bench_function("build_levels_up_to_hashtags", |b| {
        b.iter(|| build_levels(black_box(&graph), LevelScope::UpTo(StageId::Hashtags)))
    });
}

fn extract_benchmark(c: &mut Criterion) {
    let output = json!({
        "usps": ["Long battery", "Bright display", "Fast charging"],
        "target_audience": "commuters",
        "notes": "ignored"
    });

    c.bench_function("extract_usps_to_description", |b| {
        b.iter(|| extract(StageId::Usps, StageId::Description, black_box(&output)))
    });
}

fn run_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = Orchestrator::new(StageRunner::new(Arc::new(ScriptedExecutor::new())))
        .with_config(OrchestratorConfig::new().with_inter_level_delay(Duration::ZERO));
    let config = PipelineConfig::default().with_input("productName", json!("Galaxy S25"));

    c.bench_function("run_default_graph", |b| {
        b.iter(|| {
            runtime.block_on(orchestrator.run(&config, &NoOpProgress, &CancellationToken::new()))
        })
    });
}

criterion_group!(benches, levels_benchmark, extract_benchmark, run_benchmark);
criterion_main!(benches);
