//! Criterion benchmarks for configuration generation
//!
//! Peer lists and StatefulSets are rebuilt for every host on every pass, so
//! their cost grows with the square of the installation size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use clickhouse_operator::config::DefaultsConfig;
use clickhouse_operator::creator::Creator;
use clickhouse_operator::crd::{
    ClickHouseInstallation, ClickHouseInstallationSpec, ClusterSpec, Configuration, LayoutSpec,
};
use clickhouse_operator::generator::{
    ClickHouseFilesGenerator, ConfigFilesGenerator, ConfigGeneratorOptions,
    RemoteServersGeneratorOptions,
};
use clickhouse_operator::model::{HostReconcileAttributes, Installation, Normalizer};

// =============================================================================
// Test Fixtures
// =============================================================================

fn installation(shards: u32, replicas: u32) -> Installation {
    let mut chi = ClickHouseInstallation::new(
        "bench",
        ClickHouseInstallationSpec {
            configuration: Configuration {
                clusters: vec![ClusterSpec {
                    name: "main".to_string(),
                    layout: LayoutSpec {
                        shards_count: Some(shards),
                        replicas_count: Some(replicas),
                        ..Default::default()
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        },
    );
    chi.metadata.namespace = Some("bench".to_string());
    chi.metadata.uid = Some("uid".to_string());
    Normalizer::new(&DefaultsConfig::default())
        .normalize(&chi)
        .unwrap()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_remote_servers(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_servers");
    let files = ClickHouseFilesGenerator;

    for shards in [4u32, 16, 64] {
        let installation = installation(shards, 2);
        group.throughput(Throughput::Elements(installation.hosts_count() as u64));

        group.bench_with_input(BenchmarkId::new("all_hosts", shards), &installation, |b, chi| {
            let options = RemoteServersGeneratorOptions::new();
            b.iter(|| black_box(files.remote_servers(chi, &options)));
        });

        group.bench_with_input(
            BenchmarkId::new("excluding_added", shards),
            &installation,
            |b, chi| {
                let options = RemoteServersGeneratorOptions::new()
                    .exclude_reconcile_attributes(HostReconcileAttributes::new().set_add());
                b.iter(|| black_box(files.remote_servers(chi, &options)));
            },
        );
    }

    group.finish();
}

fn bench_common_files(c: &mut Criterion) {
    let installation = installation(16, 2);
    let files = ClickHouseFilesGenerator;
    let options = ConfigGeneratorOptions::default();

    c.bench_function("common_files_16x2", |b| {
        b.iter(|| black_box(files.common_files(&installation, &options)));
    });
}

fn bench_statefulsets(c: &mut Criterion) {
    let installation = installation(16, 2);
    let defaults = DefaultsConfig::default();
    let files = ClickHouseFilesGenerator;
    let creator = Creator::new(&installation, &defaults, &files);

    c.bench_function("statefulsets_16x2", |b| {
        b.iter(|| {
            for host in installation.hosts() {
                black_box(creator.statefulset(host).unwrap());
            }
        });
    });
}

// =============================================================================
// Criterion Groups
// =============================================================================

criterion_group!(
    benches,
    bench_remote_servers,
    bench_common_files,
    bench_statefulsets,
);

criterion_main!(benches);
