//! Criterion micro-benchmarks for table allocation and reference resolution.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tabula_arena::Ref;
use tabula_bench::{airport_profile, profile_fixture};
use tabula_test_utils::Taxiway;

/// Benchmark: Allocate 10K fixed-size records into a fresh context.
fn bench_allocate_10k(c: &mut Criterion) {
    c.bench_function("table_allocate_10k", |b| {
        b.iter(|| {
            let ctx = profile_fixture().build();
            ctx.write(|d| {
                let mut prev = Ref::null();
                for i in 0..10_000 {
                    prev = d.allocate(Taxiway::new(i as f32, prev)).unwrap();
                }
                black_box(prev);
            });
        });
    });
}

/// Benchmark: Resolve 1K references through the explicit API.
fn bench_resolve_explicit(c: &mut Criterion) {
    let (ctx, index) = airport_profile(1000).unwrap();
    let refs: Vec<_> = ctx.read(|d| d.map(index).unwrap().values().unwrap());

    c.bench_function("table_resolve_explicit_1k", |b| {
        b.iter(|| {
            ctx.read(|d| {
                let mut sum = 0i64;
                for &r in &refs {
                    sum += d.get(r).unwrap().elevation_ft as i64;
                }
                black_box(sum);
            });
        });
    });
}

/// Benchmark: Resolve 1K references through the ambient scope.
fn bench_resolve_ambient(c: &mut Criterion) {
    let (ctx, index) = airport_profile(1000).unwrap();
    let refs: Vec<_> = ctx.read(|d| d.map(index).unwrap().values().unwrap());
    let _scope = ctx.enter();

    c.bench_function("table_resolve_ambient_1k", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for &r in &refs {
                sum += r.get().unwrap().elevation_ft as i64;
            }
            black_box(sum);
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_10k,
    bench_resolve_explicit,
    bench_resolve_ambient
);
criterion_main!(benches);
