//! Performance benchmarks for the subscriber state store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use subscriber_state::{
    codec, Document, SqliteBackend, SqliteConfig, StoreConfig, SubscriberState,
    SubscriberStateStore,
};
use tempfile::TempDir;

fn create_store(dir: &TempDir) -> SubscriberStateStore<SqliteBackend> {
    SubscriberStateStore::open_sqlite(
        &SqliteConfig::file(dir.path().join("subscribers.db")),
        StoreConfig::default(),
    )
    .unwrap()
}

fn session(imsi: &str) -> Document {
    Document::from(json!({
        "magma.ipv4": [{
            "active_policy_rules": [],
            "active_duration_sec": 6.0,
            "lifecycle_state": "SESSION_ACTIVE",
            "session_start_time": 1653484144.0,
            "apn": "magma.ipv4",
            "ipv4": "192.168.128.12",
            "msisdn": "",
            "session_id": format!("{}-1234", imsi),
        }]
    }))
}

fn snapshot(size: usize) -> Vec<SubscriberState> {
    (0..size)
        .map(|i| {
            let imsi = format!("IMSI00101{:010}", i);
            let value = session(&imsi);
            SubscriberState { imsi, value }
        })
        .collect()
}

/// Benchmark full snapshot replacement with varying gateway sizes
fn bench_set_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_all_subscribers");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("snapshot_size", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let store = create_store(&dir);
            let states = snapshot(size);

            b.iter(|| {
                store
                    .set_all_subscribers_for_gateway("net1", "gw1", black_box(&states))
                    .unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark reading one gateway while many others hold data
fn bench_get_for_gateway(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_subscribers");

    for gateways in [1, 50, 500] {
        group.bench_with_input(BenchmarkId::new("gateways", gateways), &gateways, |b, &gateways| {
            let dir = TempDir::new().unwrap();
            let store = create_store(&dir);
            let states = snapshot(100);
            for g in 0..gateways {
                store
                    .set_all_subscribers_for_gateway("net1", &format!("gw{}", g), &states)
                    .unwrap();
            }

            b.iter(|| {
                black_box(store.get_subscribers_for_gateway("net1", "gw0").unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark document encoding and decoding
fn bench_codec(c: &mut Criterion) {
    let doc = session("IMSI001010000000123");
    let bytes = codec::encode(&doc).unwrap();

    c.bench_function("codec_encode", |b| b.iter(|| codec::encode(black_box(&doc)).unwrap()));
    c.bench_function("codec_decode", |b| b.iter(|| codec::decode(black_box(&bytes)).unwrap()));
}

criterion_group!(benches, bench_set_all, bench_get_for_gateway, bench_codec);
criterion_main!(benches);
