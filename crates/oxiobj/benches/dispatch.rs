// Dispatch and lifecycle benchmarks for the oxiobj runtime
//
// These benchmarks measure slot dispatch through an instance's class,
// instance creation and release, refcount traffic, and DynamicArray growth.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use oxiobj::runtime::{ElementType, Runtime};

fn runtime() -> Runtime {
    let mut runtime = Runtime::new();
    runtime.init().expect("Failed to initialize runtime");
    runtime
}

/// Benchmark `represent` and `compare` dispatch.
///
/// Both read one function pointer out of the instance's class and call it.
fn bench_slot_dispatch(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("slot_dispatch");

    let error = runtime.new_error_msg("bench").unwrap();
    let other = runtime.new_error_msg("bench other").unwrap();

    group.bench_function("represent", |b| {
        b.iter(|| black_box(error.as_object()).represent());
    });
    group.bench_function("compare", |b| {
        b.iter(|| black_box(error.as_object()).compare(other.as_object()));
    });
    group.bench_function("msg", |b| {
        b.iter(|| black_box(&error).msg());
    });

    group.finish();
}

/// Benchmark instance creation and release.
///
/// Covers allocation, the init chain and the destroy chain.
fn bench_lifecycle(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("lifecycle");

    group.bench_function("object", |b| {
        b.iter(|| runtime.new_object().unwrap());
    });
    group.bench_function("error", |b| {
        b.iter(|| runtime.new_error_msg(black_box("message")).unwrap());
    });
    group.bench_function("index_error", |b| {
        b.iter(|| runtime.new_index_error(black_box(7)).unwrap());
    });

    group.finish();
}

/// Benchmark refcount traffic: clone then drop a handle.
fn bench_refcount(c: &mut Criterion) {
    let runtime = runtime();
    let obj = runtime.new_object().unwrap();

    c.bench_function("retain_release", |b| {
        b.iter(|| black_box(obj.clone()));
    });
}

/// Benchmark appending to a DynamicArray with doubling growth.
fn bench_array_add(c: &mut Criterion) {
    let runtime = runtime();
    let mut group = c.benchmark_group("array_add");

    for count in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let array = runtime.new_dynamic_array(ElementType::of::<u64>()).unwrap();
                for i in 0..count as u64 {
                    array.add(&i).unwrap();
                }
                array
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_slot_dispatch,
    bench_lifecycle,
    bench_refcount,
    bench_array_add
);
criterion_main!(benches);
