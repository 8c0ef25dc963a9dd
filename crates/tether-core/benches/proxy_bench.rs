//! Benchmarks for proxy dispatch and pool churn.
//!
//! Measures the cost of binding an instance to a unit of work, of repeated
//! calls on an already bound proxy, and of concurrent units of work
//! competing for a small pool.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use tether_core::{
    factory_fn, Component, ComponentClass, Interface, Method, PoolConfig,
    PoolableComponentHandler, ProxyError, UnitOfWork,
};

struct Scratch {
    buf: Vec<u8>,
}

impl Component for Scratch {
    fn recycle(&mut self) -> Result<(), tether_core::ComponentError> {
        self.buf.clear();
        Ok(())
    }
}

const WRITE: Method = Method::new("Scratch", "write");

fn scratch_handler(pool_max: usize) -> PoolableComponentHandler<Scratch> {
    let class = ComponentClass::new("Scratch").implements(Interface::new("Scratch"));
    PoolableComponentHandler::new(
        factory_fn(class, || {
            Ok(Scratch {
                buf: Vec::with_capacity(4096),
            })
        }),
        PoolConfig::with_max(pool_max),
    )
    .unwrap()
}

fn write(proxy: &tether_core::Proxy<Scratch>, cx: &UnitOfWork, byte: u8) -> usize {
    proxy
        .invoke(cx, WRITE, |s| {
            s.buf.push(byte);
            Ok::<_, ProxyError>(s.buf.len())
        })
        .unwrap()
}

/// Benchmark a unit of work making a single call
fn bench_unit_of_work(c: &mut Criterion) {
    let handler = scratch_handler(8);
    let proxy = handler.proxy();

    c.bench_function("unit_of_work_single_call", |b| {
        b.iter(|| {
            let cx = UnitOfWork::new();
            black_box(write(&proxy, &cx, 1));
            black_box(cx.finish());
        });
    });
}

/// Benchmark repeated calls on a bound proxy
fn bench_bound_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("bound_calls");
    let handler = scratch_handler(8);
    let proxy = handler.proxy();

    for calls in [1usize, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("calls", calls), calls, |b, &calls| {
            b.iter(|| {
                let cx = UnitOfWork::new();
                for i in 0..calls {
                    black_box(write(&proxy, &cx, i as u8));
                }
                cx.finish();
            });
        });
    }

    group.finish();
}

/// Benchmark concurrent units of work against a small pool
fn bench_concurrent_units(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_units");

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                let handler = Arc::new(scratch_handler(2));

                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let proxy = handler.proxy();
                            thread::spawn(move || {
                                for _ in 0..50 {
                                    let cx = UnitOfWork::new();
                                    black_box(write(&proxy, &cx, 0));
                                    cx.finish();
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_unit_of_work,
    bench_bound_calls,
    bench_concurrent_units
);
criterion_main!(benches);
