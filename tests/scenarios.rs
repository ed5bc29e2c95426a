//! End-to-end scenario tests (S1-S6 in the design notes), one scenario group per
//! file the way the teacher lineage splits `patch_get.rs` / `patch_ordered_iterator.rs`
//! by concern rather than bundling everything into one file.

use std::ops::Bound;
use std::thread;

use masstree::Tree;

#[test]
fn s1_basic_crud() {
    let tree = Tree::<i32>::new();
    assert_eq!(tree.put(b"hello", 42).unwrap(), None);
    assert_eq!(tree.get(b"hello"), Some(42));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.remove(b"hello"), Some(42));
    assert_eq!(tree.get(b"hello"), None);
    assert_eq!(tree.len(), 0);
}

#[test]
fn s2_prefix_collision() {
    let tree = Tree::<i32>::new();
    tree.put(b"abcdefgh12345678", 1).unwrap();
    tree.put(b"abcdefghXXXXXXXX", 2).unwrap();
    assert_eq!(tree.get(b"abcdefgh12345678"), Some(1));
    assert_eq!(tree.get(b"abcdefghXXXXXXXX"), Some(2));
    assert_eq!(tree.get(b"abcdefgh"), None);
}

#[test]
fn s3_split_cascade() {
    let tree = Tree::<u64>::new();
    for i in 0..1000u64 {
        tree.put(&i.to_be_bytes(), i).unwrap();
    }
    assert_eq!(tree.len(), 1000);
    for i in 0..1000u64 {
        assert_eq!(tree.get(&i.to_be_bytes()), Some(i));
    }
    let all: Vec<u64> = tree
        .range(Bound::Unbounded, Bound::Unbounded)
        .map(|(_, v)| v)
        .collect();
    assert_eq!(all, (0..1000u64).collect::<Vec<_>>());
}

#[test]
fn s4_delete_pattern() {
    let tree = Tree::<u64>::new();
    for i in 0..1000u64 {
        tree.put(&i.to_be_bytes(), i).unwrap();
    }
    for i in (0..1000u64).step_by(2) {
        tree.remove(&i.to_be_bytes());
    }
    assert_eq!(tree.len(), 500);
    for i in 0..1000u64 {
        if i % 2 == 0 {
            assert_eq!(tree.get(&i.to_be_bytes()), None);
        } else {
            assert_eq!(tree.get(&i.to_be_bytes()), Some(i));
        }
    }
}

#[test]
fn s5_reverse_iteration_across_layers() {
    let tree = Tree::<i32>::new();
    tree.put(b"aaaaaaaa_alpha", 1).unwrap();
    tree.put(b"aaaaaaaa_beta", 2).unwrap();
    tree.put(b"aaaaaaaa_gamma", 3).unwrap();
    tree.put(b"bbbb", 4).unwrap();

    let keys: Vec<Vec<u8>> = tree
        .range_reverse(Bound::Unbounded, Bound::Unbounded)
        .map(|(k, _)| k)
        .collect();
    assert_eq!(
        keys,
        vec![
            b"bbbb".to_vec(),
            b"aaaaaaaa_gamma".to_vec(),
            b"aaaaaaaa_beta".to_vec(),
            b"aaaaaaaa_alpha".to_vec(),
        ]
    );
}

#[test]
fn s6_concurrent_disjoint_ranges() {
    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 500;

    let tree = Tree::<u64>::new();
    thread::scope(|scope| {
        for t in 0..THREADS {
            let tree = &tree;
            scope.spawn(move || {
                let base = t * PER_THREAD;
                for i in base..base + PER_THREAD {
                    tree.put(&i.to_be_bytes(), i).unwrap();
                }
            });
        }
    });

    assert_eq!(tree.len(), THREADS * PER_THREAD);
    for i in 0..THREADS * PER_THREAD {
        assert_eq!(tree.get(&i.to_be_bytes()), Some(i));
    }
}
