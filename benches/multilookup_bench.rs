use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use isi_hashmap::{ChainedMap, RingScheduler};
use std::time::Duration;

// Bucket ceiling; larger maps degrade into longer chains, which is where
// interleaving pays off.
const MAP_MAX_CAPACITY: usize = 1 << 16;

const ITEM_COUNTS: [u32; 3] = [1 << 16, 1 << 18, 1 << 20];
const STREAM_COUNTS: [usize; 4] = [1, 8, 16, 32];

fn filled_map(n_items: u32) -> ChainedMap<u32, u32> {
    let mut m = ChainedMap::with_max_capacity(MAP_MAX_CAPACITY).expect("non-zero max capacity");
    for i in 0..n_items {
        m.insert(i, i);
    }
    m
}

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_multilookup");
    for n_items in ITEM_COUNTS {
        let m = filled_map(n_items);
        let keys: Vec<u32> = (0..n_items).collect();
        group.throughput(Throughput::Elements(n_items as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_items), &keys, |b, keys| {
            b.iter(|| black_box(m.sequential_multilookup(keys)))
        });
    }
    group.finish();
}

fn bench_interleaved(c: &mut Criterion) {
    let mut group = c.benchmark_group("interleaved_multilookup");
    for n_items in ITEM_COUNTS {
        let m = filled_map(n_items);
        let keys: Vec<u32> = (0..n_items).collect();
        group.throughput(Throughput::Elements(n_items as u64));
        for n_streams in STREAM_COUNTS {
            let id = BenchmarkId::new(format!("{n_streams}_streams"), n_items);
            group.bench_with_input(id, &keys, |b, keys| {
                let mut sched = RingScheduler::with_capacity(n_streams);
                b.iter(|| black_box(m.interleaved_multilookup(keys, &mut sched, n_streams)))
            });
        }
    }
    group.finish();
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_sequential, bench_interleaved
}
criterion_main!(benches);
