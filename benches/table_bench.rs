//! Table benchmarks over the in-memory substrate
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use motekv::table::IndexId;
use motekv::{MemoryKv, Name, Table, TableBuilder, TableRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    id: u64,
    customer: String,
    placed_at: i64,
    amount: f64,
}

impl TableRecord for Order {}

const SIZES: &[u64] = &[100, 1_000, 10_000];

fn order(id: u64) -> Order {
    Order {
        id,
        customer: format!("customer-{:06}", id),
        placed_at: 1_700_000_000 + id as i64,
        amount: id as f64 * 1.25,
    }
}

fn orders(kv: &MemoryKv) -> (Table<'_, Order, MemoryKv>, IndexId<u64>, IndexId<String>) {
    let mut b = TableBuilder::<Order>::new("orders");
    let id = b.primary("id", |o: &Order| o.id);
    let customer = b.secondary("customer", |o: &Order| o.customer.clone());
    b.secondary("placed", |o: &Order| (o.placed_at, o.id));
    let table = b.build(Name::new("bench").unwrap_or_default(), kv).unwrap();
    (table, id, customer)
}

fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("put");
    for &n in SIZES {
        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::new("insert", n), &n, |b, &n| {
            b.iter(|| {
                let kv = MemoryKv::new();
                let (table, _, _) = orders(&kv);
                for id in 0..n {
                    table.put(&order(id)).unwrap();
                }
                black_box(kv.len(table.scope()))
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    for &n in SIZES {
        let kv = MemoryKv::new();
        let (table, id, customer) = orders(&kv);
        for i in 0..n {
            table.put(&order(i)).unwrap();
        }
        let primary = table.index(id).unwrap();
        let by_customer = table.index(customer).unwrap();

        group.bench_with_input(BenchmarkId::new("primary", n), &n, |b, &n| {
            b.iter(|| black_box(primary.get(&(n / 2)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("secondary", n), &n, |b, &n| {
            let key = format!("customer-{:06}", n / 2);
            b.iter(|| black_box(by_customer.find(key.as_str()).unwrap().value().unwrap()))
        });
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    for &n in SIZES {
        let kv = MemoryKv::new();
        let (table, id, customer) = orders(&kv);
        for i in 0..n {
            table.put(&order(i)).unwrap();
        }

        group.throughput(Throughput::Elements(n));
        group.bench_with_input(BenchmarkId::new("primary", n), &n, |b, _| {
            let primary = table.index(id).unwrap();
            b.iter(|| black_box(primary.iter().unwrap().count()))
        });
        group.bench_with_input(BenchmarkId::new("secondary", n), &n, |b, _| {
            let by_customer = table.index(customer).unwrap();
            b.iter(|| black_box(by_customer.iter().unwrap().count()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_put, bench_lookup, bench_scan);
criterion_main!(benches);
