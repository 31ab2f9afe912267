use bulkweld::prelude::*;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn keys(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("doc::{i}")).collect()
}

fn bench_distributor(c: &mut Criterion) {
    let mut group = c.benchmark_group("distributor");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        for dop in [4, 16, 64].iter() {
            group.bench_with_input(
                BenchmarkId::new(format!("known_dop_{dop}"), size),
                size,
                |b, &size| {
                    let options = BulkOptions::new(*dop).unwrap();
                    b.iter(|| {
                        let mut distributor = Distributor::new(0..size, &options);
                        let lanes = distributor.get_batches().unwrap();
                        for lane in lanes {
                            for item in lane {
                                black_box(item);
                            }
                        }
                    });
                },
            );
        }

        group.bench_with_input(BenchmarkId::new("unknown_dop_16", size), size, |b, &size| {
            let options = BulkOptions::new(16).unwrap();
            b.iter(|| {
                let mut distributor = Distributor::new((0..size).filter(|_| true), &options);
                let lanes = distributor.get_batches().unwrap();
                for lane in lanes {
                    for item in lane {
                        black_box(item);
                    }
                }
            });
        });
    }

    group.finish();
}

fn bench_executor(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor");
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("noop", size), size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let op = operation_fn(|key: String| async move {
                        black_box(key);
                        Ok::<_, OperationError>(())
                    });
                    BulkExecutor::new(keys(size), op).run().await.unwrap();
                })
            });
        });

        group.bench_with_input(BenchmarkId::new("yielding", size), size, |b, &size| {
            b.iter(|| {
                runtime.block_on(async {
                    let op = operation_fn(|key: String| async move {
                        tokio::task::yield_now().await;
                        Ok::<_, OperationError>(key.len())
                    });
                    let results = BulkExecutor::new(keys(size), op)
                        .degree_of_parallelism(32)
                        .collect()
                        .await
                        .unwrap();
                    black_box(results);
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distributor, bench_executor);
criterion_main!(benches);
