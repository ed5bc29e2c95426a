//! C9: a small three-epoch reclaimer. Readers pin a thread-local guard before
//! touching the tree; retired nodes sit in per-thread bins until every pinned thread
//! has observed at least one epoch advance past the retirement, at which point they
//! are safe to free.
//!
//! This is hand-rolled rather than a thin wrapper over `crossbeam_epoch`: the design
//! calls for an explicit three-bin rotation and a `BATCH_THRESHOLD`-triggered advance,
//! a coarser granularity than that crate's global epoch. Thread registration is a
//! lock-free Treiber stack (CAS-pushed, never popped — entries outlive their thread,
//! same tradeoff `crossbeam_epoch`'s registry makes) and each thread owns its own
//! three retire bins, so `defer_retire` never contends with another thread's.

use std::cell::RefCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_utils::{Backoff, CachePadded};

use crate::config::BATCH_THRESHOLD;

type Retired = Box<dyn FnOnce() + Send>;

struct ThreadState {
    active: CachePadded<AtomicBool>,
    local_epoch: CachePadded<AtomicUsize>,
    bins: [Mutex<Vec<Retired>>; 3],
}

impl ThreadState {
    fn new() -> Self {
        ThreadState {
            active: CachePadded::new(AtomicBool::new(false)),
            local_epoch: CachePadded::new(AtomicUsize::new(0)),
            bins: [Mutex::new(Vec::new()), Mutex::new(Vec::new()), Mutex::new(Vec::new())],
        }
    }
}

/// Intrusive Treiber-stack node: registration is push-only, so a single
/// `AtomicPtr`-linked chain needs no ABA handling or hazard pointers.
struct ThreadNode {
    state: Arc<ThreadState>,
    next: AtomicPtr<ThreadNode>,
}

pub struct Collector {
    global_epoch: AtomicUsize,
    threads_head: AtomicPtr<ThreadNode>,
    retire_count: AtomicUsize,
}

thread_local! {
    // Keyed by collector address rather than a single slot: a process may hold more
    // than one `Tree` (hence more than one `Collector`) on the same thread.
    static LOCAL: RefCell<Vec<(usize, Arc<ThreadState>)>> = RefCell::new(Vec::new());
}

impl Collector {
    pub fn new() -> Self {
        Collector {
            global_epoch: AtomicUsize::new(0),
            threads_head: AtomicPtr::new(ptr::null_mut()),
            retire_count: AtomicUsize::new(0),
        }
    }

    fn register(&self, state: Arc<ThreadState>) {
        let node = Box::into_raw(Box::new(ThreadNode {
            state,
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        loop {
            let head = self.threads_head.load(Ordering::Acquire);
            unsafe { (*node).next.store(head, Ordering::Relaxed) };
            if self
                .threads_head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn local_state(&self) -> Arc<ThreadState> {
        let key = self as *const Collector as usize;
        LOCAL.with(|cell| {
            let mut cache = cell.borrow_mut();
            if let Some((_, state)) = cache.iter().find(|(k, _)| *k == key) {
                return state.clone();
            }
            let state = Arc::new(ThreadState::new());
            self.register(state.clone());
            cache.push((key, state.clone()));
            state
        })
    }

    /// Pin the calling thread. Readers and writers must hold a `Guard` for the
    /// duration of any operation that dereferences a node pointer.
    pub fn pin(&self) -> Guard<'_> {
        let state = self.local_state();
        let e = self.global_epoch.load(Ordering::Acquire);
        state.local_epoch.store(e, Ordering::Relaxed);
        state.active.store(true, Ordering::SeqCst);
        Guard {
            collector: self,
            state,
        }
    }

    /// Queue a reclamation callback to run once it is safe. `f` must not dereference
    /// anything the caller cannot guarantee stays valid until then. Pushed into the
    /// calling thread's own bin only — never contends with another thread's retires.
    pub fn defer_retire(&self, f: Retired) {
        let state = self.local_state();
        let e = self.global_epoch.load(Ordering::Acquire);
        state.bins[e % 3].lock().unwrap().push(f);
        let count = self.retire_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count as u32 % BATCH_THRESHOLD == 0 {
            self.try_advance();
        }
    }

    /// Attempt to advance the global epoch. Succeeds only if every active thread's
    /// local epoch is caught up; on success, drains the bin two epochs behind the new
    /// one (retirements from `current - 2`, which by invariant no active thread can
    /// still be observing) from every registered thread.
    pub fn try_advance(&self) -> bool {
        let e = self.global_epoch.load(Ordering::Acquire);
        let mut node_ptr = self.threads_head.load(Ordering::Acquire);
        while !node_ptr.is_null() {
            let node = unsafe { &*node_ptr };
            if node.state.active.load(Ordering::SeqCst) && node.state.local_epoch.load(Ordering::Relaxed) != e {
                return false;
            }
            node_ptr = node.next.load(Ordering::Acquire);
        }
        if self
            .global_epoch
            .compare_exchange(e, e + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        let drain_bin = (e + 2) % 3;
        let mut node_ptr = self.threads_head.load(Ordering::Acquire);
        while !node_ptr.is_null() {
            let node = unsafe { &*node_ptr };
            let to_run: Vec<Retired> = std::mem::take(&mut *node.state.bins[drain_bin].lock().unwrap());
            for f in to_run {
                f();
            }
            node_ptr = node.next.load(Ordering::Acquire);
        }
        true
    }

    /// Run every pending reclamation unconditionally. Only safe when no thread is
    /// pinned on this collector, i.e. during tree teardown.
    pub fn reclaim_all(&self) {
        let mut node_ptr = self.threads_head.load(Ordering::Acquire);
        while !node_ptr.is_null() {
            let node = unsafe { &*node_ptr };
            for bin in &node.state.bins {
                let to_run: Vec<Retired> = std::mem::take(&mut *bin.lock().unwrap());
                for f in to_run {
                    f();
                }
            }
            node_ptr = node.next.load(Ordering::Acquire);
        }
    }

    /// Block (with bounded backoff) until an advance succeeds, for callers that need
    /// a hard guarantee rather than a best-effort nudge.
    pub fn force_advance(&self) {
        let backoff = Backoff::new();
        while !self.try_advance() {
            backoff.snooze();
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        // Exclusive access (`&mut self`) means no pin/defer_retire can race here.
        let mut node_ptr = self.threads_head.load(Ordering::Relaxed);
        while !node_ptr.is_null() {
            let node = unsafe { Box::from_raw(node_ptr) };
            node_ptr = node.next.load(Ordering::Relaxed);
        }
    }
}

/// An active pin. Drop clears the thread's active flag so epoch advances can proceed.
pub struct Guard<'a> {
    collector: &'a Collector,
    state: Arc<ThreadState>,
}

impl<'a> Guard<'a> {
    pub fn defer_retire(&self, f: Retired) {
        self.collector.defer_retire(f);
    }
}

impl<'a> Drop for Guard<'a> {
    fn drop(&mut self) {
        self.state.active.store(false, Ordering::SeqCst);
    }
}
