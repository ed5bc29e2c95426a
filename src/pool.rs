//! C12: an optional thread-local freelist in front of the global allocator, bucketed
//! by size class. A throughput aid only — correctness never depends on it, so
//! `alloc`/`dealloc` fall back to the system allocator transparently when a bucket is
//! empty or full.

use std::alloc::{alloc, dealloc, Layout};
use std::cell::RefCell;
use std::ptr::NonNull;

/// Per-bucket capacity: how many freed blocks of a given layout a thread will hold
/// onto before it starts returning memory to the system allocator again.
const BUCKET_CAPACITY: usize = 512;

struct Bucket {
    layout: Layout,
    free: Vec<NonNull<u8>>,
}

thread_local! {
    static BUCKETS: RefCell<Vec<Bucket>> = RefCell::new(Vec::new());
}

/// Allocate `layout`, preferring a cached block from this thread's pool.
///
/// # Safety
/// The returned pointer is valid for `layout` and must eventually be passed to
/// [`pool_dealloc`] with the same layout, exactly as with the raw system allocator.
pub unsafe fn pool_alloc(layout: Layout) -> Option<NonNull<u8>> {
    BUCKETS.with(|buckets| {
        let mut buckets = buckets.borrow_mut();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.layout == layout) {
            if let Some(ptr) = bucket.free.pop() {
                return Some(ptr);
            }
        }
        let raw = alloc(layout);
        NonNull::new(raw)
    })
}

/// Return a block to this thread's pool, or to the system allocator if the matching
/// bucket is full or does not yet exist and creating one is not worthwhile.
///
/// # Safety
/// `ptr` must have been allocated with `layout` via [`pool_alloc`] or the system
/// allocator, and must not be used again after this call.
pub unsafe fn pool_dealloc(ptr: NonNull<u8>, layout: Layout) {
    BUCKETS.with(|buckets| {
        let mut buckets = buckets.borrow_mut();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.layout == layout) {
            if bucket.free.len() < BUCKET_CAPACITY {
                bucket.free.push(ptr);
                return;
            }
            dealloc(ptr.as_ptr(), layout);
            return;
        }
        if buckets.len() < 64 {
            buckets.push(Bucket {
                layout,
                free: vec![ptr],
            });
        } else {
            dealloc(ptr.as_ptr(), layout);
        }
    })
}
