//! C10: generic retry/dedup mechanics for the deferred-coalesce queue. The actual
//! structural work of unlinking and retiring an empty leaf lives in `tree.rs` (it
//! needs parent/B-link access this module doesn't own); this module owns the
//! lock-free LIFO and the bounded-requeue policy.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::config::MAX_REQUEUE;
use crate::leaf::Leaf;

pub enum CoalesceOutcome {
    /// Handled (either coalesced, or found refilled and left alone).
    Done,
    /// Lock contention or a transient condition; try again later.
    Requeue,
}

/// Intrusive lock-free stack of leaves pending emptiness cleanup, threaded through
/// each leaf's `coalesce_next` field.
pub struct CoalesceQueue<V> {
    head: AtomicPtr<Leaf<V>>,
}

impl<V> CoalesceQueue<V> {
    pub fn new() -> Self {
        CoalesceQueue {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn schedule(&self, leaf: *mut Leaf<V>) {
        loop {
            let head = self.head.load(Ordering::Acquire);
            unsafe {
                (*leaf).coalesce_next.store(head, Ordering::Relaxed);
            }
            if self
                .head
                .compare_exchange_weak(head, leaf, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn pop(&self) -> Option<*mut Leaf<V>> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            let next = unsafe { (*head).coalesce_next.load(Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return Some(head);
            }
        }
    }

    /// Pop up to `limit` candidates, handing each to `attempt`. A `Requeue` outcome
    /// is pushed back onto the queue unless it has already been requeued
    /// `MAX_REQUEUE` times, at which point it is dropped (left for a later batch
    /// triggered by further removes touching the same region of the tree).
    pub fn process_batch(&self, limit: usize, mut attempt: impl FnMut(*mut Leaf<V>) -> CoalesceOutcome) {
        for _ in 0..limit {
            let leaf = match self.pop() {
                Some(l) => l,
                None => break,
            };
            match attempt(leaf) {
                CoalesceOutcome::Done => {}
                CoalesceOutcome::Requeue => {
                    let count = unsafe { (*leaf).requeue_count.fetch_add(1, Ordering::Relaxed) } + 1;
                    if count < MAX_REQUEUE {
                        self.schedule(leaf);
                    }
                }
            }
        }
    }
}

impl<V> Default for CoalesceQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}
