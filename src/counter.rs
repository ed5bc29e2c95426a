//! C11: a 16-way sharded approximate counter for the tree's live-entry count. Exact
//! counts under concurrent mutation would require a point of contention the rest of
//! the design deliberately avoids; this trades exactness for an eventually-consistent,
//! never-negative read.

use std::cell::Cell;
use std::sync::atomic::{AtomicI64, Ordering};

use crossbeam_utils::CachePadded;

use crate::config::SHARDS;

thread_local! {
    static SHARD_HINT: Cell<Option<usize>> = Cell::new(None);
}

fn this_thread_shard() -> usize {
    SHARD_HINT.with(|hint| {
        if let Some(i) = hint.get() {
            return i;
        }
        // Derive a stable-for-this-thread shard from the thread id's hash once, then
        // cache it; avoids re-hashing on every increment.
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::thread::current().id().hash(&mut hasher);
        let i = (hasher.finish() as usize) % SHARDS;
        hint.set(Some(i));
        i
    })
}

/// Sharded, padded approximate counter.
pub struct ShardedCounter {
    shards: Vec<CachePadded<AtomicI64>>,
}

impl ShardedCounter {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARDS);
        for _ in 0..SHARDS {
            shards.push(CachePadded::new(AtomicI64::new(0)));
        }
        ShardedCounter { shards }
    }

    pub fn increment(&self) {
        self.shards[this_thread_shard()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement(&self) {
        self.shards[this_thread_shard()].fetch_sub(1, Ordering::Relaxed);
    }

    /// Sum of all shards, clamped to zero. Eventually consistent: a concurrent mix of
    /// increments/decrements on other threads may make this over- or under-count by at
    /// most the number of in-flight mutations.
    pub fn load(&self) -> u64 {
        let total: i64 = self.shards.iter().map(|s| s.load(Ordering::Relaxed)).sum();
        total.max(0) as u64
    }
}

impl Default for ShardedCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(ShardedCounter::new().load(), 0);
    }

    #[test]
    fn increments_and_decrements_net_out() {
        let c = ShardedCounter::new();
        for _ in 0..100 {
            c.increment();
        }
        for _ in 0..40 {
            c.decrement();
        }
        assert_eq!(c.load(), 60);
    }

    #[test]
    fn never_reports_negative() {
        let c = ShardedCounter::new();
        c.decrement();
        c.decrement();
        assert_eq!(c.load(), 0);
    }
}
