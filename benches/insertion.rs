//! # Insertion and Fetch Benchmarks
//!
//! Measures the hot paths of the storage engine on a fresh file per sample.
//!
//! ## Benchmark Matrix
//!
//! | Group      | Workload                                   |
//! |------------|--------------------------------------------|
//! | sequential | One object, ascending timestamps           |
//! | scattered  | Many objects, timestamps in pseudo-random order |
//! | fetch      | Full and ranged fetch of a populated object |
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench --bench insertion
//! cargo bench --bench insertion -- sequential
//! cargo bench --bench insertion -- fetch
//! ```

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use emberdb::{Engine, Event, TimeRange};
use tempfile::TempDir;

const SEQUENTIAL_EVENTS: u64 = 10_000;
const SCATTERED_EVENTS: u64 = 10_000;
const SCATTERED_OBJECTS: u64 = 500;
const FETCH_EVENTS: i64 = 20_000;

fn setup_engine(block_size: u32) -> (TempDir, Engine) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::builder()
        .block_size(block_size)
        .create(dir.path().join("bench.edb"))
        .expect("Failed to create engine");
    (dir, engine)
}

fn sample_event(object_id: u64, timestamp: i64) -> Event {
    Event::new(object_id, timestamp, 1)
        .with_property(1, format!("user_{:08}", object_id))
        .with_property(2, timestamp * 3)
}

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential");
    group.throughput(Throughput::Elements(SEQUENTIAL_EVENTS));
    group.sample_size(10);

    for block_size in [4096u32, 65536] {
        group.bench_function(BenchmarkId::from_parameter(block_size), |b| {
            b.iter_batched(
                || setup_engine(block_size),
                |(dir, engine)| {
                    for ts in 0..SEQUENTIAL_EVENTS as i64 {
                        engine.insert_event(black_box(&sample_event(1, ts))).unwrap();
                    }
                    engine.close().unwrap();
                    drop(dir);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_scattered(c: &mut Criterion) {
    let mut group = c.benchmark_group("scattered");
    group.throughput(Throughput::Elements(SCATTERED_EVENTS));
    group.sample_size(10);

    group.bench_function("many_objects", |b| {
        b.iter_batched(
            || setup_engine(65536),
            |(dir, engine)| {
                let mut state = 0x2545_f491_4f6c_dd1du64;
                for _ in 0..SCATTERED_EVENTS {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    let object_id = state % SCATTERED_OBJECTS;
                    let ts = (state >> 32) as i64 % 100_000;
                    engine.insert_event(black_box(&sample_event(object_id, ts))).unwrap();
                }
                engine.close().unwrap();
                drop(dir);
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn bench_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch");
    let (_dir, engine) = setup_engine(65536);
    for ts in 0..FETCH_EVENTS {
        engine.insert_event(&sample_event(ts as u64 % 4, ts)).unwrap();
    }

    group.throughput(Throughput::Elements(FETCH_EVENTS as u64 / 4));
    group.bench_function("full_object", |b| {
        b.iter(|| {
            let count = engine.fetch_events(black_box(2)).unwrap().count();
            black_box(count)
        });
    });

    group.bench_function("time_range", |b| {
        let range = TimeRange::new(FETCH_EVENTS / 4, FETCH_EVENTS / 2);
        b.iter(|| {
            let count = engine
                .fetch_events_in_range(black_box(2), black_box(range))
                .unwrap()
                .count();
            black_box(count)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sequential, bench_scattered, bench_fetch);
criterion_main!(benches);
