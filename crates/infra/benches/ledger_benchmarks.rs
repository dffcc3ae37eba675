use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use stockflow_core::{DocumentNumber, LotId, ProductId, Quantity, ReferenceKind, SupplierId};
use stockflow_infra::{InMemoryCatalog, InMemoryStorage, InventoryLedger};
use stockflow_inventory::MovementRequest;

type BenchLedger = InventoryLedger<Arc<InMemoryStorage>, Arc<InMemoryCatalog>>;

fn ledger(lots: usize) -> BenchLedger {
    let catalog = InMemoryCatalog::new()
        .with(ReferenceKind::Product, "p1")
        .with(ReferenceKind::Supplier, "s1");
    for lot in 0..lots {
        catalog.register(ReferenceKind::Lot, format!("l{lot}"));
    }
    InventoryLedger::new(Arc::new(InMemoryStorage::new()), Arc::new(catalog))
}

fn entry(lot: usize, n: usize) -> MovementRequest {
    MovementRequest::entry(
        ProductId::new("p1"),
        Some(LotId::new(format!("l{lot}"))),
        Quantity::new(10, 1),
        DocumentNumber::parse(format!("E{n}")).unwrap(),
        SupplierId::new("s1"),
    )
}

fn dispatch(lot: usize, n: usize) -> MovementRequest {
    MovementRequest::dispatch(
        ProductId::new("p1"),
        LotId::new(format!("l{lot}")),
        Quantity::new(1, 0),
        DocumentNumber::parse(format!("D{n}")).unwrap(),
        SupplierId::new("s1"),
    )
}

/// Entries spread over 16 lots.
fn bench_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_entries");
    for &count in &[100usize, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let ledger = ledger(16);
                for n in 0..count {
                    black_box(ledger.apply(entry(n % 16, n)).unwrap());
                }
            });
        });
    }
    group.finish();
}

/// Dispatches draining one hot lot.
fn bench_dispatches(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_dispatches");
    for &count in &[100usize, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let ledger = ledger(1);
                    for n in 0..count {
                        ledger.apply(entry(0, n)).unwrap();
                    }
                    ledger
                },
                |ledger| {
                    for n in 0..count {
                        black_box(ledger.apply(dispatch(0, n)).unwrap());
                    }
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

/// Entry immediately undone on one lot.
fn bench_retract(c: &mut Criterion) {
    c.bench_function("apply_then_retract", |b| {
        let ledger = ledger(1);
        let mut n = 0usize;
        b.iter(|| {
            let m = ledger.apply(entry(0, n)).unwrap();
            ledger.retract(m.id).unwrap();
            n += 1;
        });
    });
}

criterion_group!(benches, bench_entries, bench_dispatches, bench_retract);
criterion_main!(benches);
