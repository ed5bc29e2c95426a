//! Compile-time tunables for the tree. Plain `pub const` items, colocated rather than
//! routed through a runtime config object — there is no I/O surface here to vary at
//! runtime.

/// Maximum number of entries held directly by a leaf or routing keys held by an
/// interior node.
pub const FANOUT: usize = 15;

/// Number of key bytes consumed per trie layer.
pub const KEY_SLICE_LEN: usize = 8;

/// Maximum supported key length in bytes (32 trie layers of 8 bytes each).
pub const MAX_KEY_LENGTH: usize = 256;

/// Number of successful inserts/removes between opportunistic epoch-advance attempts.
pub const BATCH_THRESHOLD: u32 = 128;

/// Maximum number of times a coalesce candidate is requeued before being dropped.
pub const MAX_REQUEUE: u8 = 10;

/// Number of shards backing the approximate live-entry counter.
pub const SHARDS: usize = 16;

/// Whether to issue cache-line prefetch hints at the points noted in the leaf/interior
/// scan loops. Left off by default; flip at compile time for a target where the
/// prefetch actually pays for itself.
pub const ENABLE_PREFETCH: bool = false;

/// Number of bounded spins before a lock/version wait falls back to yielding the
/// thread, used to parameterize the `crossbeam_utils::Backoff` escalation.
pub const SPIN_LIMIT: u32 = 64;

/// Capacity of the temporary merged routing-key buffer an interior split builds
/// before dividing it at the midpoint: the existing `FANOUT` keys plus the one
/// being inserted.
pub const MAX_SPLIT_KEYS: usize = FANOUT + 1;

/// Capacity of the temporary merged child buffer an interior split builds: one more
/// than `MAX_SPLIT_KEYS` since an interior always has one more child than keys.
pub const MAX_SPLIT_CHILDREN: usize = FANOUT + 2;

/// Issue a cache-line prefetch hint for `ptr`, a no-op unless `ENABLE_PREFETCH` is on.
/// Callers pass a pointer they are about to dereference a few instructions later in
/// the same descent step (the next child down an interior, or the next leaf across a
/// B-link hop).
#[inline(always)]
pub fn prefetch<T>(ptr: *const T) {
    if !ENABLE_PREFETCH {
        return;
    }
    #[cfg(target_arch = "x86_64")]
    unsafe {
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        use std::arch::x86::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    let _ = ptr;
}
