//! C3: the leaf permutation word. A single 64-bit atomic encodes both the logical
//! size and the logical-to-physical slot mapping for up to `FANOUT` (15) entries, kept
//! as one plain atomic rather than wrapped behind extra indirection because the whole
//! word's atomicity is itself the insert linearization point.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::FANOUT;

const SIZE_SHIFT: u32 = 60;
const SLOT_BITS: u32 = 4;

fn slot_shift(i: usize) -> u32 {
    (i as u32) * SLOT_BITS
}

fn decode(word: u64) -> ([u8; FANOUT], usize) {
    let size = (word >> SIZE_SHIFT) as usize;
    let mut slots = [0u8; FANOUT];
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = ((word >> slot_shift(i)) & 0xF) as u8;
    }
    (slots, size)
}

fn encode(slots: &[u8; FANOUT], size: usize) -> u64 {
    let mut word = (size as u64) << SIZE_SHIFT;
    for (i, &slot) in slots.iter().enumerate() {
        word |= (slot as u64) << slot_shift(i);
    }
    word
}

fn identity() -> [u8; FANOUT] {
    let mut slots = [0u8; FANOUT];
    for (i, s) in slots.iter_mut().enumerate() {
        *s = i as u8;
    }
    slots
}

pub struct Permutation(AtomicU64);

impl Permutation {
    pub fn empty() -> Self {
        Permutation(AtomicU64::new(encode(&identity(), 0)))
    }

    pub fn snapshot(&self) -> PermSnapshot {
        let (slots, size) = decode(self.0.load(Ordering::Acquire));
        PermSnapshot { slots, size }
    }

    pub fn size(&self) -> usize {
        (self.0.load(Ordering::Acquire) >> SIZE_SHIFT) as usize
    }

    /// Insert a new logical entry at `logical_pos`, using the free physical slot
    /// (the one currently parked at position `size`). Returns the physical slot to
    /// write the new entry's data into. Callers must write the entry's data *before*
    /// calling this only in the sense that the returned slot is reserved for them; the
    /// permutation store itself is the publication point, matching C3's contract.
    pub fn insert_from_back(&self, logical_pos: usize) -> usize {
        let (mut slots, size) = decode(self.0.load(Ordering::Acquire));
        debug_assert!(size < FANOUT, "leaf is full");
        debug_assert!(logical_pos <= size);
        let free = slots[size];
        for i in (logical_pos..size).rev() {
            slots[i + 1] = slots[i];
        }
        slots[logical_pos] = free;
        let new_word = encode(&slots, size + 1);
        self.0.store(new_word, Ordering::Release);
        free as usize
    }

    /// Remove the logical entry at `logical_pos`, returning its physical slot to the
    /// free region.
    pub fn remove(&self, logical_pos: usize) {
        let (mut slots, size) = decode(self.0.load(Ordering::Acquire));
        debug_assert!(logical_pos < size);
        let removed = slots[logical_pos];
        for i in logical_pos..size - 1 {
            slots[i] = slots[i + 1];
        }
        slots[size - 1] = removed;
        self.0.store(encode(&slots, size - 1), Ordering::Release);
    }

    pub fn store_raw(&self, slots: &[u8; FANOUT], size: usize) {
        self.0.store(encode(slots, size), Ordering::Release);
    }
}

/// A torn-free snapshot of the permutation taken under a stable node version.
pub struct PermSnapshot {
    slots: [u8; FANOUT],
    size: usize,
}

impl PermSnapshot {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, logical: usize) -> usize {
        debug_assert!(logical < self.size);
        self.slots[logical] as usize
    }

    pub fn physical_slots(&self) -> &[u8] {
        &self.slots[..self.size]
    }

    /// The physical slot currently parked in the free region at position `size`,
    /// i.e. the one `insert_from_back` will claim next.
    pub fn free_slot(&self) -> usize {
        debug_assert!(self.size < FANOUT);
        self.slots[self.size] as usize
    }

    /// The raw 15-entry slot array backing this snapshot (occupied followed by free).
    pub fn raw(&self) -> &[u8; FANOUT] {
        &self.slots
    }

    /// First logical position whose ikey is `>= target`, using the supplied
    /// physical-indexed ikey array.
    pub fn lower_bound(&self, ikeys: &[u64; FANOUT], target: u64) -> usize {
        let mut lo = 0usize;
        let mut hi = self.size;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if ikeys[self.get(mid)] < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }
}
