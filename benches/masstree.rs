use criterion::{black_box, criterion_group, criterion_main, Criterion};
use masstree::Tree;
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::ops::Bound;

fn random_keys(count: usize) -> Vec<[u8; 8]> {
    let mut rng = thread_rng();
    let mut keys: Vec<[u8; 8]> = (0..count as u64).map(|i| i.to_be_bytes()).collect();
    keys.shuffle(&mut rng);
    keys
}

fn random_string_keys(count: usize) -> Vec<Vec<u8>> {
    let mut rng = thread_rng();
    (0..count)
        .map(|_| {
            let len = rng.gen_range(1..40);
            (0..len).map(|_| rng.gen::<u8>()).collect()
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let samples_100 = random_keys(100);
    let samples_10000 = random_keys(10000);
    let samples_100000 = random_keys(100000);

    c.bench_function("put 100", |b| {
        b.iter(|| {
            let tree = Tree::<u64>::new();
            for (i, k) in black_box(&samples_100).iter().enumerate() {
                tree.put(k, i as u64).unwrap();
            }
        })
    });
    c.bench_function("put 10000", |b| {
        b.iter(|| {
            let tree = Tree::<u64>::new();
            for (i, k) in black_box(&samples_10000).iter().enumerate() {
                tree.put(k, i as u64).unwrap();
            }
        })
    });
    c.bench_function("put 100000", |b| {
        b.iter(|| {
            let tree = Tree::<u64>::new();
            for (i, k) in black_box(&samples_100000).iter().enumerate() {
                tree.put(k, i as u64).unwrap();
            }
        })
    });

    let lookup_tree = Tree::<u64>::new();
    for (i, k) in samples_100000.iter().enumerate() {
        lookup_tree.put(k, i as u64).unwrap();
    }
    c.bench_function("get 100000 (populated tree)", |b| {
        b.iter(|| {
            for k in black_box(&samples_100000) {
                black_box(lookup_tree.get(k));
            }
        })
    });

    c.bench_function("range full scan 100000", |b| {
        b.iter(|| {
            let count = lookup_tree
                .range(Bound::Unbounded, Bound::Unbounded)
                .count();
            black_box(count)
        })
    });

    let string_samples = random_string_keys(10000);
    c.bench_function("put 10000 variable-length string keys", |b| {
        b.iter(|| {
            let tree = Tree::<u64>::new();
            for (i, k) in black_box(&string_samples).iter().enumerate() {
                tree.put(k, i as u64).unwrap();
            }
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
