use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use esdoc_core::StoreConfig;
use esdoc_events::{Event, EventIterator, Snapshot};
use esdoc_infra::{AggregateTypeRouter, DocEventStore, DocSnapshotStore, InMemoryDocumentStore};
use serde_json::json;
use std::sync::Arc;

fn event_store() -> DocEventStore<InMemoryDocumentStore> {
    DocEventStore::new(Arc::new(InMemoryDocumentStore::new()), &StoreConfig::default())
}

fn batch(id: &str, first: u64, size: u64) -> Vec<Event> {
    (first..first + size)
        .map(|v| Event::new(id, "Order", v, "LineAdded", json!({ "sku": "A-1", "qty": v })))
        .collect()
}

fn bench_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1u64, 10, 100] {
        group.throughput(Throughput::Elements(batch_size));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            &batch_size,
            |b, &size| {
                let store = event_store();
                let mut next = 1;
                b.iter(|| {
                    let committed = store.append(batch("order-1", next, size)).unwrap();
                    next += size;
                    black_box(committed);
                });
            },
        );
    }

    group.finish();
}

fn bench_read_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_read_stream");

    for history in [10u64, 100, 1000] {
        let store = event_store();
        store.append(batch("order-1", 1, history)).unwrap();

        group.throughput(Throughput::Elements(history));
        group.bench_with_input(BenchmarkId::new("read_all", history), &history, |b, _| {
            b.iter(|| {
                let mut cursor = store.read("order-1", "Order", 0).unwrap();
                let mut count = 0;
                while cursor.advance() {
                    black_box(cursor.current().unwrap());
                    count += 1;
                }
                cursor.release();
                count
            });
        });
    }

    group.finish();
}

fn bench_snapshot_put_get(c: &mut Criterion) {
    let backing = Arc::new(InMemoryDocumentStore::new());
    let router = Arc::new(AggregateTypeRouter::new(backing, &StoreConfig::default()));
    let snapshots = DocSnapshotStore::new(router);
    let mut version = 0;

    c.bench_function("snapshot_put_then_get", |b| {
        b.iter(|| {
            version += 1;
            snapshots
                .put(&Snapshot::new("order-1", "Order", version, version, json!({ "total": version })))
                .unwrap();
            black_box(snapshots.get("order-1", "Order").unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_append_throughput,
    bench_read_stream,
    bench_snapshot_put_get
);
criterion_main!(benches);
