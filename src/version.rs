//! C2: the node version/lock word. A single `AtomicU32` doubles as a CAS spinlock and
//! as the version readers use for optimistic concurrency control, following the same
//! "one atomic field guards the whole node" texture as this codebase's
//! `AtomicU32`-refcounted node headers, generalized here to a packed lock+version word.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::Backoff;

use crate::config::SPIN_LIMIT;

const LOCK: u32 = 1 << 0;
const INSERTING: u32 = 1 << 1;
const SPLITTING: u32 = 1 << 2;
const DIRTY: u32 = INSERTING | SPLITTING;

const INSERT_COUNT_SHIFT: u32 = 3;
const INSERT_COUNT_BITS: u32 = 10;
const INSERT_COUNT_MASK: u32 = ((1 << INSERT_COUNT_BITS) - 1) << INSERT_COUNT_SHIFT;

const SPLIT_COUNT_SHIFT: u32 = INSERT_COUNT_SHIFT + INSERT_COUNT_BITS;
const SPLIT_COUNT_BITS: u32 = 12;
const SPLIT_COUNT_MASK: u32 = ((1 << SPLIT_COUNT_BITS) - 1) << SPLIT_COUNT_SHIFT;

const DELETED: u32 = 1 << 25;
const ROOT: u32 = 1 << 26;
const ISLEAF: u32 = 1 << 27;

/// Packed node version word: lock bit, dirty (inserting/splitting) bits, separate
/// insert and split counters, and DELETED/ROOT/ISLEAF metadata flags.
pub struct NodeVersion(AtomicU32);

impl NodeVersion {
    /// A freshly allocated node is never a root by default; callers that install a
    /// node as a layer's (or the tree's) root call `set_root()` explicitly.
    pub fn new(is_leaf: bool) -> Self {
        let bits = if is_leaf { ISLEAF } else { 0 };
        NodeVersion(AtomicU32::new(bits))
    }

    /// Spin until the dirty bits clear, then return the clean snapshot. Spins bare
    /// (no backoff) for the first `SPIN_LIMIT` attempts, since a writer's critical
    /// section is normally short; past that, falls back to `Backoff`'s escalating
    /// snooze so a reader stuck behind a preempted writer yields instead of burning
    /// the core.
    pub fn stable(&self) -> u32 {
        for _ in 0..SPIN_LIMIT {
            let v = self.0.load(Ordering::Acquire);
            if v & DIRTY == 0 {
                return v;
            }
            core::hint::spin_loop();
        }
        let backoff = Backoff::new();
        loop {
            let v = self.0.load(Ordering::Acquire);
            if v & DIRTY == 0 {
                return v;
            }
            backoff.snooze();
        }
    }

    /// Whether the node has structurally changed since `snap`, ignoring LOCK and
    /// INSERTING. A reader only ever consults fields guarded by those bits after a
    /// `stable()` observed DIRTY clear, so ignoring them here does not admit a torn
    /// read (see DESIGN.md, open question 2).
    pub fn has_changed(&self, snap: u32) -> bool {
        let now = self.0.load(Ordering::Acquire);
        let mask = !(LOCK | INSERTING);
        (now & mask) != (snap & mask)
    }

    /// Whether only the split counter advanced relative to `snap`.
    pub fn has_split(&self, snap: u32) -> bool {
        let now = self.0.load(Ordering::Acquire);
        (now & SPLIT_COUNT_MASK) != (snap & SPLIT_COUNT_MASK)
    }

    pub fn is_leaf(&self) -> bool {
        self.0.load(Ordering::Acquire) & ISLEAF != 0
    }

    pub fn is_root(&self) -> bool {
        self.0.load(Ordering::Acquire) & ROOT != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.0.load(Ordering::Acquire) & DELETED != 0
    }

    pub fn clear_root(&self) {
        self.0.fetch_and(!ROOT, Ordering::Release);
    }

    pub fn set_root(&self) {
        self.0.fetch_or(ROOT, Ordering::Release);
    }

    pub fn mark_deleted(&self) {
        self.0.fetch_or(DELETED, Ordering::Release);
    }

    /// Acquire the lock bit, spinning with bounded backoff.
    pub fn lock(&self) -> VersionGuard<'_> {
        let backoff = Backoff::new();
        loop {
            let v = self.0.load(Ordering::Relaxed);
            if v & LOCK == 0
                && self
                    .0
                    .compare_exchange_weak(v, v | LOCK, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return VersionGuard { word: self };
            }
            backoff.snooze();
        }
    }

    pub fn try_lock(&self) -> Option<VersionGuard<'_>> {
        let v = self.0.load(Ordering::Relaxed);
        if v & LOCK != 0 {
            return None;
        }
        self.0
            .compare_exchange(v, v | LOCK, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| VersionGuard { word: self })
    }
}

/// A held node lock. Consuming methods pick the correct unlock-and-bump-counter
/// variant so a caller cannot forget to advance the version it mutated under.
pub struct VersionGuard<'a> {
    word: &'a NodeVersion,
}

impl<'a> VersionGuard<'a> {
    /// Publish that the insert counter region is dirty; readers that observe this will
    /// spin in `stable()` until `unlock_after_insert` clears it.
    pub fn mark_insert(&self) {
        self.word.0.fetch_or(INSERTING, Ordering::SeqCst);
    }

    /// Publish that the split counter region is dirty.
    pub fn mark_split(&self) {
        self.word.0.fetch_or(SPLITTING, Ordering::SeqCst);
    }

    /// Release the lock without having changed anything observable.
    pub fn unlock_normal(self) {
        self.word.0.fetch_and(!LOCK, Ordering::Release);
    }

    /// Release the lock, clear both dirty bits, and bump the insert counter. A split
    /// may have marked SPLITTING earlier in the same critical section (split-then-
    /// insert-the-triggering-key); clearing both bits here means callers never need
    /// to track which dirty bit is "theirs" to clear.
    pub fn unlock_after_insert(self) {
        self.word
            .0
            .fetch_update(Ordering::Release, Ordering::Relaxed, |v| {
                let bumped = (v.wrapping_add(1 << INSERT_COUNT_SHIFT)) & INSERT_COUNT_MASK;
                Some((v & !(LOCK | DIRTY) & !INSERT_COUNT_MASK) | bumped)
            })
            .expect("fetch_update on a held lock never fails");
    }

    /// Release the lock, clear both dirty bits, and bump the split counter.
    pub fn unlock_after_split(self) {
        self.word
            .0
            .fetch_update(Ordering::Release, Ordering::Relaxed, |v| {
                let bumped = (v.wrapping_add(1 << SPLIT_COUNT_SHIFT)) & SPLIT_COUNT_MASK;
                Some((v & !(LOCK | DIRTY) & !SPLIT_COUNT_MASK) | bumped)
            })
            .expect("fetch_update on a held lock never fails");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_ignores_nothing_when_clean() {
        let v = NodeVersion::new(true);
        let snap = v.stable();
        assert!(!v.has_changed(snap));
        assert!(v.is_leaf());
        assert!(!v.is_root());
        v.set_root();
        assert!(v.is_root());
    }

    #[test]
    fn insert_bumps_insert_counter_only() {
        let v = NodeVersion::new(true);
        let snap = v.stable();
        let g = v.lock();
        g.mark_insert();
        g.unlock_after_insert();
        assert!(v.has_changed(snap));
        assert!(!v.has_split(snap));
    }

    #[test]
    fn split_bumps_split_counter() {
        let v = NodeVersion::new(false);
        let snap = v.stable();
        let g = v.lock();
        g.mark_split();
        g.unlock_after_split();
        assert!(v.has_split(snap));
    }

    #[test]
    fn try_lock_fails_while_held() {
        let v = NodeVersion::new(true);
        let g = v.lock();
        assert!(v.try_lock().is_none());
        g.unlock_normal();
        assert!(v.try_lock().is_some());
    }
}
