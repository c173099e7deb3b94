//! Benchmarks for the deque hot paths and pool submission throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pilfer::deque::{Boxed, Deque, Inline};
use pilfer::ThreadPool;

const OPS_PER_ITER: u64 = 10_000;

/// Owner-only push/pop cycling, the hottest path of a busy worker.
fn bench_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque/push_pop");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("inline_u64", |b| {
        let mut dq = Deque::<u64, Inline>::new(1024);
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                dq.push(black_box(i));
            }
            for _ in 0..OPS_PER_ITER {
                black_box(dq.pop());
            }
        });
    });

    group.bench_function("boxed_u64", |b| {
        let mut dq: Deque<u64, Boxed> = Deque::new(1024);
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                dq.push(black_box(i));
            }
            for _ in 0..OPS_PER_ITER {
                black_box(dq.pop());
            }
        });
    });

    group.finish();
}

/// Uncontended steals, the cost a thief pays per taken element.
fn bench_push_steal(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque/push_steal");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    group.bench_function("inline_u64", |b| {
        let mut dq = Deque::<u64, Inline>::new(16384);
        let thief = dq.stealer();
        b.iter(|| {
            for i in 0..OPS_PER_ITER {
                dq.push(black_box(i));
            }
            for _ in 0..OPS_PER_ITER {
                black_box(thief.steal());
            }
        });
    });

    group.finish();
}

/// Submit-to-completion round trips through pools of varying width.
fn bench_pool_submit(c: &mut Criterion) {
    const TASKS_PER_ITER: usize = 1_000;

    let mut group = c.benchmark_group("pool/submit_noop");
    group.throughput(Throughput::Elements(TASKS_PER_ITER as u64));

    for workers in [1usize, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                let pool = ThreadPool::new(workers);
                b.iter(|| {
                    let receivers: Vec<_> =
                        (0..TASKS_PER_ITER).map(|_| pool.submit(|| ())).collect();
                    for rx in receivers {
                        rx.recv().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_push_pop, bench_push_steal, bench_pool_submit);
criterion_main!(benches);
