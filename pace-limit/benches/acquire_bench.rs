use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use pace_limit::Config;
use pace_limit::RateLimiter;
use pace_limit::Strategy;

// Limits are set high enough that the benchmarks measure bookkeeping, not waiting.
fn limiters() -> Vec<(&'static str, Arc<dyn RateLimiter>)> {
    let config = Config::new()
        .with_limit(usize::MAX)
        .with_fixed_interval(Duration::from_secs(3600))
        .with_token_resets_after(Duration::from_secs(3600))
        .with_throttle(Duration::from_nanos(1));

    [
        ("FixedWindow", Strategy::FixedWindow),
        ("MaxConcurrency", Strategy::MaxConcurrency),
        ("Throttle", Strategy::Throttle),
    ]
    .into_iter()
    .map(|(name, strategy)| (name, pace_limit::build(strategy, &config).unwrap()))
    .collect()
}

fn bench_try_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("try_acquire");

    for (name, limiter) in limiters() {
        group.bench_function(name, |b| {
            b.iter(|| {
                if let Some(permit) = black_box(limiter.as_ref()).try_acquire().continue_value() {
                    limiter.release(&permit);
                }
            })
        });
    }

    group.finish();
}

fn bench_acquire(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("acquire");

    for (name, limiter) in limiters() {
        group.bench_function(name, |b| {
            b.to_async(&rt).iter(|| async {
                let permit = limiter.acquire().await.unwrap();
                limiter.release(&permit);
            })
        });
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for (name, limiter) in limiters() {
        for threads in [2, 4, 8] {
            group.bench_with_input(
                BenchmarkId::new(name, format!("{threads}-threads")),
                &threads,
                |b, &n| {
                    b.iter_custom(|iters| {
                        let barrier = Arc::new(Barrier::new(n + 1));
                        let handles: Vec<_> = (0..n)
                            .map(|_| {
                                let limiter = Arc::clone(&limiter);
                                let barrier = Arc::clone(&barrier);
                                thread::spawn(move || {
                                    barrier.wait();
                                    for _ in 0..iters {
                                        if let Some(permit) =
                                            limiter.try_acquire().continue_value()
                                        {
                                            limiter.release(&permit);
                                        }
                                    }
                                })
                            })
                            .collect();

                        barrier.wait();
                        let start = Instant::now();
                        for handle in handles {
                            handle.join().unwrap();
                        }
                        start.elapsed()
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_try_acquire, bench_acquire, bench_contended);
criterion_main!(benches);
