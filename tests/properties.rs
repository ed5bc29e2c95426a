//! Property tests, matching the teacher lineage's `patch.rs` test module style:
//! `proptest! { ... }` blocks exercising `put`/`len`/ordered-iteration invariants
//! against random key/value sequences. Gated behind the `proptest` feature, which
//! is enabled by default exactly as the teacher's own `[features]` table does.
#![cfg(feature = "proptest")]

use std::collections::BTreeMap;
use std::ops::Bound;

use masstree::Tree;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Put(Vec<u8>, i32),
    Remove(Vec<u8>),
}

fn small_key() -> impl Strategy<Value = Vec<u8>> {
    // A narrow byte alphabet and short lengths keep shared-prefix (and exact
    // prefix) collisions frequent, so the trie-of-tries path gets exercised.
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c', 0u8, 1u8]), 0..20)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (small_key(), any::<i32>()).prop_map(|(k, v)| Op::Put(k, v)),
        small_key().prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property 1 + 3 + 4: a masstree driven by a random op sequence matches a
    /// `BTreeMap` reference model at every step, through overwrites and removes.
    #[test]
    fn matches_reference_model(ops in prop::collection::vec(op_strategy(), 0..300)) {
        let tree = Tree::<i32>::new();
        let mut model: BTreeMap<Vec<u8>, i32> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Put(k, v) => {
                    let got = tree.put(&k, v).unwrap();
                    let expected = model.insert(k, v);
                    prop_assert_eq!(got, expected);
                }
                Op::Remove(k) => {
                    let got = tree.remove(&k);
                    let expected = model.remove(&k);
                    prop_assert_eq!(got, expected);
                }
            }
        }

        prop_assert_eq!(tree.len() as usize, model.len());
        for (k, v) in &model {
            prop_assert_eq!(tree.get(k), Some(*v));
        }
    }

    /// Property 2: `range_all` always yields keys in strictly ascending order and
    /// exactly the live key set, regardless of insertion order.
    #[test]
    fn range_all_matches_sorted_model(ops in prop::collection::vec(op_strategy(), 0..300)) {
        let tree = Tree::<i32>::new();
        let mut model: BTreeMap<Vec<u8>, i32> = BTreeMap::new();
        for op in ops {
            match op {
                Op::Put(k, v) => { model.insert(k.clone(), v); tree.put(&k, v).unwrap(); }
                Op::Remove(k) => { model.remove(&k); tree.remove(&k); }
            }
        }

        let collected: Vec<(Vec<u8>, i32)> = tree.range(Bound::Unbounded, Bound::Unbounded).collect();
        let expected: Vec<(Vec<u8>, i32)> = model.into_iter().collect();
        prop_assert_eq!(collected, expected);
    }

    /// Property 4: overwriting the same key repeatedly never changes length and
    /// always reports the previous value.
    #[test]
    fn idempotent_overwrite(key in small_key(), values in prop::collection::vec(any::<i32>(), 1..10)) {
        let tree = Tree::<i32>::new();
        let mut prev = None;
        for v in values {
            let got = tree.put(&key, v).unwrap();
            prop_assert_eq!(got, prev);
            prop_assert_eq!(tree.len(), 1);
            prev = Some(v);
        }
        prop_assert_eq!(tree.get(&key), prev);
    }

    /// Property 5: two keys sharing an 8-byte-aligned prefix but differing beyond
    /// it are both independently retrievable and removable.
    #[test]
    fn prefix_independence(suffix_a in prop::collection::vec(any::<u8>(), 1..16), suffix_b in prop::collection::vec(any::<u8>(), 1..16)) {
        prop_assume!(suffix_a != suffix_b);
        let mut key_a = b"SHAREDPX".to_vec();
        key_a.extend_from_slice(&suffix_a);
        let mut key_b = b"SHAREDPX".to_vec();
        key_b.extend_from_slice(&suffix_b);

        let tree = Tree::<i32>::new();
        tree.put(&key_a, 1).unwrap();
        tree.put(&key_b, 2).unwrap();
        prop_assert_eq!(tree.get(&key_a), Some(1));
        prop_assert_eq!(tree.get(&key_b), Some(2));
        prop_assert_eq!(tree.remove(&key_a), Some(1));
        prop_assert_eq!(tree.remove(&key_b), Some(2));
        prop_assert_eq!(tree.get(b"SHAREDPX"), None);
    }
}

/// Property 6 (boundary): empty keys and keys at/around the 8-byte ikey window.
#[test]
fn boundary_key_lengths() {
    let tree = Tree::<i32>::new();

    assert_eq!(tree.put(b"", 0).unwrap(), None);
    assert_eq!(tree.get(b""), Some(0));

    let exact = [1u8; 8];
    assert_eq!(tree.put(&exact, 1).unwrap(), None);
    assert_eq!(tree.get(&exact), Some(1));

    let mut with_suffix = [2u8; 9];
    with_suffix[8] = 9;
    assert_eq!(tree.put(&with_suffix, 2).unwrap(), None);
    assert_eq!(tree.get(&with_suffix), Some(2));

    // `exact` and `with_suffix` share no ikey collision (different first 8 bytes),
    // so both remain independently addressable alongside the empty key.
    assert_eq!(tree.len(), 3);
}

#[test]
fn boundary_max_key_length_is_accepted() {
    let tree = Tree::<i32>::new();
    let key = vec![7u8; masstree::config::MAX_KEY_LENGTH];
    assert_eq!(tree.put(&key, 1).unwrap(), None);
    assert_eq!(tree.get(&key), Some(1));
}
