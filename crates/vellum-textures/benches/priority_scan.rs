//! Benchmarks for the throttler's priority scan and end-to-end drain rate.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use vellum_core::TaskPool;
use vellum_textures::{
    CancellationToken, LoadThrottler, SharedBasis, TextureError, ThrottleBasis,
    ThrottleBasisProvider, ThrottlerConfig, compare_priority,
};

/// Half eager, half opportunistic, ticks interleaved.
fn mixed_bases(count: usize) -> Vec<Arc<dyn ThrottleBasisProvider>> {
    (0..count)
        .map(|i| {
            let tick = ((i * 7919) % count) as i64;
            if i % 2 == 0 {
                Arc::new(ThrottleBasis::eager(tick)) as Arc<dyn ThrottleBasisProvider>
            } else {
                Arc::new(SharedBasis::new(false, tick)) as Arc<dyn ThrottleBasisProvider>
            }
        })
        .collect()
}

fn best_index(bases: &[Arc<dyn ThrottleBasisProvider>]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, basis) in bases.iter().enumerate() {
        best = match best {
            Some(current) if compare_priority(basis.as_ref(), bases[current].as_ref()).is_ge() => {
                Some(current)
            }
            _ => Some(i),
        };
    }
    best
}

fn bench_priority_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_scan");

    for size in [16, 256, 4096] {
        group.throughput(Throughput::Elements(size as u64));
        let bases = mixed_bases(size);

        group.bench_with_input(BenchmarkId::new("linear", size), &bases, |b, bases| {
            b.iter(|| best_index(black_box(bases)));
        });
    }

    group.finish();
}

fn bench_throttler_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("throttler_drain");
    group.sample_size(20);

    let pool = TaskPool::new(4);
    for workers in [1, 4] {
        let throttler = LoadThrottler::new(ThrottlerConfig::new().with_workers(workers), &pool);
        group.throughput(Throughput::Elements(256));

        group.bench_function(BenchmarkId::new("workers", workers), |b| {
            b.iter(|| {
                let futures: Vec<_> = (0..256)
                    .map(|i| {
                        throttler.create_loader(
                            Arc::new(ThrottleBasis::new(i % 3 == 0, i, i)),
                            move |_token| async move { Ok::<i64, TextureError>(i) },
                            CancellationToken::none(),
                        )
                    })
                    .collect();

                futures
                    .into_iter()
                    .map(|future| pollster::block_on(future).unwrap_or_default())
                    .sum::<i64>()
            });
        });

        throttler.shutdown();
    }

    group.finish();
}

criterion_group!(benches, bench_priority_scan, bench_throttler_drain);
criterion_main!(benches);
