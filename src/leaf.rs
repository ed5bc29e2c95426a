//! C5: the B+-tree leaf. Struct-of-arrays storage for up to `FANOUT` entries, guarded
//! by the node version word (C2) and published through the permutation word (C3),
//! following the same "one small atomic word is the commit point, the rest is plain
//! memory written under lock" shape as this codebase's `AtomicU32`-refcounted,
//! `#[repr(C)]` node headers.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, Ordering};

use crate::config::FANOUT;
use crate::interior::Interior;
use crate::key::KeyView;
use crate::node::Child;
use crate::permutation::Permutation;
use crate::suffix::SuffixBag;
use crate::version::{NodeVersion, VersionGuard};

/// `keylenx` tag: the slot holds a key that is shorter than 8 bytes at this depth;
/// the numeric value itself (0..=8) is the usable length within the window.
pub const KEYLENX_MAX_INLINE: u8 = 8;
/// The slot's key fills the 8-byte window and continues into the suffix bag.
pub const KEYLENX_HAS_SUFFIX: u8 = 64;
/// The slot is a sublayer link: the ikey matched fully and further bytes are routed
/// into a nested tree rooted at the stored child.
pub const KEYLENX_LAYER: u8 = 128;

pub enum Slot<V> {
    Empty,
    Value(V),
    Sublayer(Child),
}

/// Outcome of scanning a leaf for a key.
pub enum Lookup {
    /// An entry with this exact full key lives at this physical slot.
    Found(usize),
    /// This physical slot is a sublayer link; recurse with the key shifted one layer.
    Layer(usize),
    /// No entry for this ikey (or a shorter/longer sibling ikey run) was found;
    /// `logical_pos` is where a new entry with this ikey would be inserted to keep
    /// logical order.
    NotFound(usize),
    /// This physical slot holds a *different* full key that happens to share this
    /// entry's 8-byte ikey; the caller must create a sublayer to disambiguate.
    Conflict(usize),
}

pub struct Leaf<V> {
    pub version: NodeVersion,
    pub permutation: Permutation,
    // Lock-free OCC readers (`lookup`/`find_for_read`) walk these under a
    // `stable()`-snapshot-then-`has_changed()`-revalidate discipline without ever
    // taking `version`'s lock, so each slot is its own atomic rather than a plain
    // array behind an `UnsafeCell`. The writer (always lock-held) uses `Relaxed` for
    // its own stores; readers use `Acquire`, pairing with the writer's `Release`
    // unlock of `version`/`permutation` to establish happens-before.
    ikeys: [AtomicU64; FANOUT],
    keylenx: [AtomicU8; FANOUT],
    slots: UnsafeCell<[Slot<V>; FANOUT]>,
    suffixes: UnsafeCell<SuffixBag>,
    pub prev: AtomicPtr<Leaf<V>>,
    pub next: AtomicPtr<Leaf<V>>,
    pub parent: AtomicPtr<Interior<V>>,
    /// Intrusive link for the deferred-coalesce queue (C10); unrelated to `prev`/`next`.
    pub coalesce_next: AtomicPtr<Leaf<V>>,
    pub requeue_count: std::sync::atomic::AtomicU8,
}

// SAFETY: `slots`/`suffixes` behind an UnsafeCell are written only by the thread
// holding `version`'s lock, and read by other threads only after a `stable()`
// acquire-load synchronizes-with the writer's release store on `permutation` or
// `version` — the same happens-before discipline the rest of this crate relies on
// (see version.rs).
unsafe impl<V: Send> Send for Leaf<V> {}
unsafe impl<V: Send> Sync for Leaf<V> {}

impl<V> Leaf<V> {
    pub fn new_boxed() -> Box<Self> {
        Box::new(Leaf {
            version: NodeVersion::new(true),
            permutation: Permutation::empty(),
            ikeys: std::array::from_fn(|_| AtomicU64::new(0)),
            keylenx: std::array::from_fn(|_| AtomicU8::new(0)),
            slots: UnsafeCell::new(std::array::from_fn(|_| Slot::Empty)),
            suffixes: UnsafeCell::new(SuffixBag::new()),
            prev: AtomicPtr::new(std::ptr::null_mut()),
            next: AtomicPtr::new(std::ptr::null_mut()),
            parent: AtomicPtr::new(std::ptr::null_mut()),
            coalesce_next: AtomicPtr::new(std::ptr::null_mut()),
            requeue_count: std::sync::atomic::AtomicU8::new(0),
        })
    }

    pub fn is_full(&self) -> bool {
        self.permutation.size() == FANOUT
    }

    pub fn ikey_at(&self, phys: usize) -> u64 {
        self.ikeys[phys].load(Ordering::Acquire)
    }

    pub fn keylenx_at(&self, phys: usize) -> u8 {
        self.keylenx[phys].load(Ordering::Acquire)
    }

    pub fn suffix_at(&self, phys: usize) -> Option<Vec<u8>> {
        unsafe { (*self.suffixes.get()).get(phys).map(|b| b.to_vec()) }
    }

    pub fn value_clone_at(&self, phys: usize) -> Option<V>
    where
        V: Clone,
    {
        unsafe {
            match &(*self.slots.get())[phys] {
                Slot::Value(v) => Some(v.clone()),
                _ => None,
            }
        }
    }

    pub fn child_at(&self, phys: usize) -> Option<Child> {
        unsafe {
            match &(*self.slots.get())[phys] {
                Slot::Sublayer(c) => Some(*c),
                _ => None,
            }
        }
    }

    pub fn first_ikey(&self) -> Option<u64> {
        let snap = self.permutation.snapshot();
        if snap.size() == 0 {
            None
        } else {
            Some(self.ikey_at(snap.get(0)))
        }
    }

    /// Scan the leaf for `key` under the given permutation snapshot. Shared by read
    /// and insert paths; the caller decides how to interpret `Conflict`.
    pub fn lookup(&self, perm: &crate::permutation::PermSnapshot, key: &KeyView) -> Lookup {
        let target = key.ikey();
        let size = perm.size();
        let mut i = 0usize;
        while i < size {
            let phys = perm.get(i);
            let k = self.ikey_at(phys);
            if k < target {
                i += 1;
                continue;
            }
            if k > target {
                break;
            }
            let lenx = self.keylenx_at(phys);
            if lenx >= KEYLENX_LAYER {
                return Lookup::Layer(phys);
            }
            if lenx == KEYLENX_HAS_SUFFIX {
                if key.has_suffix() {
                    let stored = unsafe { (*self.suffixes.get()).get(phys) };
                    if stored == Some(key.suffix()) {
                        return Lookup::Found(phys);
                    }
                    return Lookup::Conflict(phys);
                }
                i += 1;
                continue;
            }
            if !key.has_suffix() && key.current_len() as u8 == lenx {
                return Lookup::Found(phys);
            }
            i += 1;
        }
        Lookup::NotFound(i)
    }

    /// Read-only lookup: a suffix mismatch means the sought key simply is not
    /// present (a conflict is resolved into a sublayer before any reader can observe
    /// it, see DESIGN.md open question resolutions).
    pub fn find_for_read(&self, perm: &crate::permutation::PermSnapshot, key: &KeyView) -> Lookup {
        match self.lookup(perm, key) {
            Lookup::Conflict(_) => Lookup::NotFound(0),
            other => other,
        }
    }

    /// # Safety
    /// Caller must hold this leaf's lock and have already called `guard.mark_insert()`.
    unsafe fn write_entry(&self, phys: usize, key: &KeyView, value: V) {
        self.ikeys[phys].store(key.ikey(), Ordering::Relaxed);
        if key.has_suffix() {
            (*self.suffixes.get()).assign(phys, key.suffix());
            self.keylenx[phys].store(KEYLENX_HAS_SUFFIX, Ordering::Relaxed);
        } else {
            (*self.suffixes.get()).clear(phys);
            self.keylenx[phys].store(key.current_len() as u8, Ordering::Relaxed);
        }
        (*self.slots.get())[phys] = Slot::Value(value);
    }

    /// Insert a new entry at `logical_pos`, publishing via the permutation store.
    /// Caller must hold the lock and have room (`!is_full()`).
    pub fn insert_into_permutation(
        &self,
        logical_pos: usize,
        key: &KeyView,
        value: V,
        guard: &VersionGuard,
    ) -> usize {
        guard.mark_insert();
        let snap = self.permutation.snapshot();
        let free_phys = snap.free_slot();
        unsafe { self.write_entry(free_phys, key, value) };
        self.permutation.insert_from_back(logical_pos);
        free_phys
    }

    /// Overwrite the value at an existing slot found via `Lookup::Found`. Does not
    /// touch the permutation (no structural change) so callers may do this under
    /// `unlock_normal`.
    pub fn overwrite_value(&self, phys: usize, value: V) -> V {
        unsafe {
            let slot = &mut (*self.slots.get())[phys];
            match std::mem::replace(slot, Slot::Value(value)) {
                Slot::Value(old) => old,
                _ => unreachable!("overwrite_value called on a non-value slot"),
            }
        }
    }

    /// Remove the entry at `logical_pos`, returning its value. Caller holds the lock.
    pub fn remove_slot(&self, logical_pos: usize) -> V {
        let phys = self.permutation.snapshot().get(logical_pos);
        unsafe {
            (*self.suffixes.get()).clear(phys);
            self.keylenx[phys].store(0, Ordering::Relaxed);
            let old = std::mem::replace(&mut (*self.slots.get())[phys], Slot::Empty);
            self.permutation.remove(logical_pos);
            match old {
                Slot::Value(v) => v,
                _ => unreachable!("remove_slot called on a non-value slot"),
            }
        }
    }

    /// Turn an existing value slot into a sublayer link. Caller holds the lock.
    pub fn make_layer(&self, phys: usize, root: Child, guard: &VersionGuard) {
        guard.mark_insert();
        self.keylenx[phys].fetch_or(KEYLENX_LAYER, Ordering::Relaxed);
        unsafe {
            (*self.slots.get())[phys] = Slot::Sublayer(root);
        }
    }

    /// Install a brand-new sublayer link at a fresh logical position (used by
    /// `create_layer` when the colliding slot itself becomes the layer but the
    /// position is new, i.e. there was no prior value at this ikey at all).
    pub fn insert_layer(&self, logical_pos: usize, ikey: u64, root: Child, guard: &VersionGuard) {
        guard.mark_insert();
        let snap = self.permutation.snapshot();
        let free_phys = snap.free_slot();
        self.ikeys[free_phys].store(ikey, Ordering::Relaxed);
        self.keylenx[free_phys].store(KEYLENX_LAYER, Ordering::Relaxed);
        unsafe {
            (*self.suffixes.get()).clear(free_phys);
            (*self.slots.get())[free_phys] = Slot::Sublayer(root);
        }
        self.permutation.insert_from_back(logical_pos);
    }

    /// Choose the split point closest to the middle that does not separate two
    /// entries sharing an ikey (which would otherwise immediately trigger a
    /// sublayer creation on the very next insert).
    pub fn calculate_split_point(&self) -> usize {
        let snap = self.permutation.snapshot();
        debug_assert_eq!(snap.size(), FANOUT);
        let mut mid = (FANOUT + 1) / 2;
        while mid > 1 && self.ikey_at(snap.get(mid - 1)) == self.ikey_at(snap.get(mid)) {
            mid -= 1;
        }
        mid
    }

    /// Move logical entries `[mid, FANOUT)` of `self` into `right`, which must be a
    /// freshly allocated, not-yet-shared leaf. Caller holds `self`'s lock and has
    /// already called `guard.mark_split()`.
    pub fn split_into(&self, right: &Leaf<V>, mid: usize) {
        let snap = self.permutation.snapshot();
        debug_assert_eq!(snap.size(), FANOUT);
        for j in mid..FANOUT {
            let phys = snap.get(j);
            let new_phys = j - mid;
            right.ikeys[new_phys].store(self.ikey_at(phys), Ordering::Relaxed);
            right.keylenx[new_phys].store(self.keylenx_at(phys), Ordering::Relaxed);
            unsafe {
                if let Some(bytes) = (*self.suffixes.get()).get(phys) {
                    (*right.suffixes.get()).assign(new_phys, bytes);
                }
                (*right.slots.get())[new_phys] =
                    std::mem::replace(&mut (*self.slots.get())[phys], Slot::Empty);
                (*self.suffixes.get()).clear(phys);
            }
            self.keylenx[phys].store(0, Ordering::Relaxed);
        }
        let right_size = FANOUT - mid;
        let mut identity = [0u8; FANOUT];
        for (i, s) in identity.iter_mut().enumerate() {
            *s = i as u8;
        }
        right.permutation.store_raw(&identity, right_size);
        self.permutation.store_raw(snap.raw(), mid);
    }

    /// Splice `right` into the B-link chain immediately after `self`.
    ///
    /// # Safety
    /// Caller holds `self`'s lock and `right` is not yet reachable by any other
    /// thread.
    pub unsafe fn link_right(&self, right: *mut Leaf<V>) {
        let old_next = self.next.load(Ordering::Acquire);
        (*right).prev.store(self as *const _ as *mut _, Ordering::Release);
        (*right).next.store(old_next, Ordering::Release);
        self.next.store(right, Ordering::Release);
        if !old_next.is_null() {
            (*old_next).prev.store(right, Ordering::Release);
        }
    }

    pub fn is_empty_now(&self) -> bool {
        self.permutation.size() == 0
    }
}

impl<V> std::fmt::Debug for Leaf<V> {
    /// Best-effort snapshot for ad-hoc inspection in tests; does not take the lock, so
    /// the printed ikeys/keylenx may be torn if a writer is concurrently active.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.permutation.snapshot();
        f.debug_struct("Leaf")
            .field("size", &snap.size())
            .field(
                "ikeys",
                &snap.physical_slots().iter().map(|&p| self.ikey_at(p as usize)).collect::<Vec<_>>(),
            )
            .field(
                "keylenx",
                &snap
                    .physical_slots()
                    .iter()
                    .map(|&p| self.keylenx_at(p as usize))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bytes: &'static [u8]) -> KeyView<'static> {
        KeyView::new(bytes)
    }

    #[test]
    fn insert_and_find_round_trips() {
        let leaf = Leaf::<u32>::new_boxed();
        let g = leaf.version.lock();
        let snap = leaf.permutation.snapshot();
        let pos = snap.lower_bound(&[0u64; FANOUT], key(b"hello").ikey());
        leaf.insert_into_permutation(pos, &key(b"hello"), 42, &g);
        g.unlock_after_insert();

        let snap = leaf.permutation.snapshot();
        match leaf.find_for_read(&snap, &key(b"hello")) {
            Lookup::Found(slot) => assert_eq!(leaf.value_clone_at(slot), Some(42)),
            _ => panic!("expected found"),
        }
    }

    #[test]
    fn suffix_conflict_is_detected() {
        let leaf = Leaf::<u32>::new_boxed();
        let g = leaf.version.lock();
        let k1 = key(b"abcdefgh_one");
        leaf.insert_into_permutation(0, &k1, 1, &g);
        g.unlock_after_insert();

        let g = leaf.version.lock();
        let snap = leaf.permutation.snapshot();
        let k2 = key(b"abcdefgh_two");
        match leaf.lookup(&snap, &k2) {
            Lookup::Conflict(slot) => assert_eq!(leaf.ikey_at(slot), k2.ikey()),
            _ => panic!("expected conflict"),
        }
        g.unlock_normal();
    }

    #[test]
    fn split_into_preserves_all_entries() {
        let leaf = Leaf::<u32>::new_boxed();
        let g = leaf.version.lock();
        let key_bytes: Vec<[u8; 8]> = (0..FANOUT as u64).map(|i| i.to_be_bytes()).collect();
        for (i, bytes) in key_bytes.iter().enumerate() {
            let k = KeyView::new(bytes);
            let snap = leaf.permutation.snapshot();
            let pos = snap.lower_bound(&core::array::from_fn(|p| leaf.ikey_at(p)), k.ikey());
            leaf.insert_into_permutation(pos, &k, i as u32, &g);
        }
        g.mark_split();
        let right = Leaf::<u32>::new_boxed();
        let mid = leaf.calculate_split_point();
        leaf.split_into(&right, mid);
        g.unlock_after_split();
        assert_eq!(leaf.permutation.size() + right.permutation.size(), FANOUT);
    }
}
