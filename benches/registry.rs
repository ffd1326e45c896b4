//! Benchmarks for fingerprinting and registry reconciliation.

use chaosengine::config::SimulatedPlatformConfig;
use chaosengine::container::{ContainerRegistry, Identity};
use chaosengine::operation::WaitOptions;
use chaosengine::platform::{Platform, SimulatedPlatform};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn identity_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");

    group.bench_function("fingerprint_3_fields", |b| {
        b.iter(|| {
            Identity::new()
                .field("name", black_box("web-frontend-17"))
                .field("zone", black_box("europe-west1-b"))
                .field("group", black_box("web-frontend-group"))
                .fingerprint()
        })
    });

    group.bench_function("fingerprint_with_optional", |b| {
        b.iter(|| {
            Identity::new()
                .field("name", black_box("db-replica-2"))
                .field("cluster", black_box("orders"))
                .optional("project", black_box(None::<&str>))
                .optional("region", black_box(Some("us-east-1")))
                .fingerprint()
        })
    });

    group.finish();
}

fn reconcile_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("registry");

    for instances in [10usize, 100, 1000] {
        let config = SimulatedPlatformConfig {
            name: "bench".to_string(),
            instances,
            ..SimulatedPlatformConfig::default()
        };
        let platform = SimulatedPlatform::new(&config, WaitOptions::default());
        let registry = ContainerRegistry::new();
        let roster = runtime.block_on(platform.generate_roster()).unwrap();
        registry.reconcile("bench", roster);

        group.throughput(Throughput::Elements(instances as u64));
        group.bench_with_input(
            BenchmarkId::new("reconcile_steady_state", instances),
            &instances,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    let roster = platform.generate_roster().await.unwrap();
                    black_box(registry.reconcile("bench", roster))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, identity_benchmark, reconcile_benchmark);
criterion_main!(benches);
