//! C6: the B+-tree interior (routing) node. Up to `FANOUT` sorted routing ikeys and
//! `FANOUT + 1` child pointers, guarded by the same node-version word discipline as
//! the leaf.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, Ordering};

use arrayvec::ArrayVec;

use crate::config::{FANOUT, MAX_SPLIT_CHILDREN, MAX_SPLIT_KEYS};
use crate::node::{AtomicChild, Child};
use crate::version::{NodeVersion, VersionGuard};

pub struct Interior<V> {
    pub version: NodeVersion,
    nkeys: AtomicU8,
    // Lock-free OCC readers walk these without holding `version`'s lock (see
    // `upper_bound`/`child_at`), so every slot is its own atomic rather than a
    // plain array behind an `UnsafeCell` — the writer side (always lock-held) uses
    // `Relaxed` for its internal rearrangement, and the reader-visible getters use
    // `Acquire` to pair with the writer's `Release` unlock of `version`.
    ikeys: [AtomicU64; FANOUT],
    children: [AtomicChild; FANOUT + 1],
    pub height: u32,
    pub parent: AtomicPtr<Interior<V>>,
    _marker: PhantomData<fn() -> V>,
}

unsafe impl<V> Send for Interior<V> {}
unsafe impl<V> Sync for Interior<V> {}

impl<V> Interior<V> {
    pub fn new_boxed(height: u32) -> Box<Self> {
        Box::new(Interior {
            version: NodeVersion::new(false),
            nkeys: AtomicU8::new(0),
            ikeys: std::array::from_fn(|_| AtomicU64::new(0)),
            children: std::array::from_fn(|_| AtomicChild::new(Child::NULL)),
            height,
            parent: AtomicPtr::new(std::ptr::null_mut()),
            _marker: PhantomData,
        })
    }

    pub fn nkeys(&self) -> usize {
        self.nkeys.load(Ordering::Acquire) as usize
    }

    pub fn is_full(&self) -> bool {
        self.nkeys() == FANOUT
    }

    pub fn ikey_at(&self, i: usize) -> u64 {
        self.ikeys[i].load(Ordering::Acquire)
    }

    pub fn child_at(&self, i: usize) -> Child {
        self.children[i].load(Ordering::Acquire)
    }

    /// Index of the child that routes `target`: the first index whose ikey is
    /// strictly greater than `target`, or `nkeys` if none is. Equal keys route right.
    pub fn upper_bound(&self, target: u64) -> usize {
        let nkeys = self.nkeys();
        let mut lo = 0usize;
        let mut hi = nkeys;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.ikey_at(mid) <= target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn child_index(&self, target: u64) -> usize {
        self.upper_bound(target)
    }

    /// Insert a routing key and its right child at `pos` (so `children[pos+1]`
    /// becomes `right_child` and `ikeys[pos]` becomes `ikey`). Caller holds the lock
    /// and has room (`!is_full()`).
    pub fn insert_key_and_child(&self, pos: usize, ikey: u64, right_child: Child, guard: &VersionGuard) {
        guard.mark_insert();
        let nkeys = self.nkeys();
        for i in (pos..nkeys).rev() {
            self.ikeys[i + 1].store(self.ikeys[i].load(Ordering::Relaxed), Ordering::Relaxed);
        }
        for i in (pos + 1..=nkeys).rev() {
            self.children[i + 1].store(self.children[i].load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.ikeys[pos].store(ikey, Ordering::Relaxed);
        self.children[pos + 1].store(right_child, Ordering::Relaxed);
        self.nkeys.store((nkeys + 1) as u8, Ordering::Release);
    }

    /// Replace the child at `index` in place (used when reparenting a split child or
    /// swapping a stale sublayer root). Does not change `nkeys`.
    pub fn set_child(&self, index: usize, child: Child) {
        self.children[index].store(child, Ordering::Release);
    }

    /// Remove the routing entry that leads to `index` (the ikey immediately to its
    /// left, if any, and the child itself). Callers never pass `index == 0`; the
    /// leftmost child is never detached (see DESIGN.md open question 3).
    pub fn remove_child(&self, index: usize, guard: &VersionGuard) {
        debug_assert!(index > 0, "the leftmost child is never removed");
        guard.mark_insert();
        let nkeys = self.nkeys();
        for i in index - 1..nkeys - 1 {
            self.ikeys[i].store(self.ikeys[i + 1].load(Ordering::Relaxed), Ordering::Relaxed);
        }
        for i in index..nkeys {
            self.children[i].store(self.children[i + 1].load(Ordering::Relaxed), Ordering::Relaxed);
        }
        self.nkeys.store((nkeys - 1) as u8, Ordering::Release);
    }

    /// Split `self` (which must be full, carrying `nkeys == FANOUT`) to make room for
    /// a new routing key, building the combined `nkeys + 1` key / `nkeys + 2` child
    /// sequence and dividing it at the midpoint. Returns the key that moves up into
    /// the parent. Caller holds `self`'s lock, has already called `guard.mark_split()`,
    /// and `right` is a freshly allocated, not-yet-shared interior of the same height.
    pub fn split_into(
        &self,
        right: &Interior<V>,
        insert_pos: usize,
        insert_ikey: u64,
        insert_child: Child,
    ) -> u64 {
        let nkeys = self.nkeys();
        debug_assert_eq!(nkeys, FANOUT);
        let mut keys: ArrayVec<u64, MAX_SPLIT_KEYS> = ArrayVec::new();
        let mut children: ArrayVec<Child, MAX_SPLIT_CHILDREN> = ArrayVec::new();
        children.push(self.children[0].load(Ordering::Relaxed));
        for i in 0..nkeys {
            if i == insert_pos {
                keys.push(insert_ikey);
                children.push(insert_child);
            }
            keys.push(self.ikeys[i].load(Ordering::Relaxed));
            children.push(self.children[i + 1].load(Ordering::Relaxed));
        }
        if insert_pos == nkeys {
            keys.push(insert_ikey);
            children.push(insert_child);
        }

        let mid = keys.len() / 2;
        let popup = keys[mid];

        for slot in self.ikeys.iter() {
            slot.store(0, Ordering::Relaxed);
        }
        for slot in self.children.iter() {
            slot.store(Child::NULL, Ordering::Relaxed);
        }
        self.children[0].store(children[0], Ordering::Relaxed);
        for i in 0..mid {
            self.ikeys[i].store(keys[i], Ordering::Relaxed);
            self.children[i + 1].store(children[i + 1], Ordering::Relaxed);
        }
        self.nkeys.store(mid as u8, Ordering::Release);

        right.children[0].store(children[mid + 1], Ordering::Relaxed);
        for (i, k) in keys[mid + 1..].iter().enumerate() {
            right.ikeys[i].store(*k, Ordering::Relaxed);
            right.children[i + 1].store(children[mid + 2 + i], Ordering::Relaxed);
        }
        right.nkeys.store((keys.len() - mid - 1) as u8, Ordering::Release);

        popup
    }
}

impl<V> std::fmt::Debug for Interior<V> {
    /// Best-effort snapshot for ad-hoc inspection in tests; does not take the lock.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nkeys = self.nkeys();
        f.debug_struct("Interior")
            .field("height", &self.height)
            .field("nkeys", &nkeys)
            .field("ikeys", &(0..nkeys).map(|i| self.ikey_at(i)).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_child(n: usize) -> Child {
        Child {
            ptr: (n + 1) * 16,
            is_leaf: true,
        }
    }

    #[test]
    fn routes_equal_keys_right() {
        let node = Interior::<u32>::new_boxed(0);
        let g = node.version.lock();
        node.set_child(0, leaf_child(0));
        node.insert_key_and_child(0, 100, leaf_child(1), &g);
        g.unlock_after_insert();

        assert_eq!(node.child_index(50), 0);
        assert_eq!(node.child_index(100), 1);
        assert_eq!(node.child_index(150), 1);
    }

    #[test]
    fn split_preserves_key_count() {
        let node = Interior::<u32>::new_boxed(0);
        let g = node.version.lock();
        node.set_child(0, leaf_child(0));
        for i in 0..FANOUT {
            node.insert_key_and_child(i, (i as u64 + 1) * 10, leaf_child(i + 1), &g);
        }
        g.mark_split();
        let right = Interior::<u32>::new_boxed(0);
        let popup = node.split_into(&right, FANOUT, (FANOUT as u64 + 1) * 10, leaf_child(FANOUT + 1));
        g.unlock_after_split();

        assert_eq!(node.nkeys() + right.nkeys() + 1, FANOUT + 1);
        assert!(popup > 0);
    }
}
