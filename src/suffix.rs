//! C4: per-leaf overflow storage for the bytes of a key beyond the first 8. Mutated
//! only by the thread holding the owning leaf's lock; readers that consult it do so
//! under a `stable()` snapshot and revalidate afterwards, the same read-then-recheck
//! discipline used for the permutation word.

use crate::config::FANOUT;

#[derive(Clone, Copy, Default)]
struct SuffixSlot {
    offset: u32,
    len: u32,
}

/// Growable backing buffer plus per-slot `(offset, len)` metadata. Compacts in slot
/// order when fragmentation from repeated reassignment would otherwise force
/// unbounded growth.
pub struct SuffixBag {
    storage: Vec<u8>,
    meta: [SuffixSlot; FANOUT],
}

impl SuffixBag {
    pub fn new() -> Self {
        SuffixBag {
            storage: Vec::new(),
            meta: [SuffixSlot::default(); FANOUT],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&[u8]> {
        let m = self.meta[slot];
        if m.len == 0 {
            return None;
        }
        Some(&self.storage[m.offset as usize..(m.offset + m.len) as usize])
    }

    pub fn clear(&mut self, slot: usize) {
        self.meta[slot] = SuffixSlot::default();
    }

    /// Store `bytes` for `slot`, reusing in-place capacity when possible, else
    /// appending, else compacting live slots to the front and appending.
    pub fn assign(&mut self, slot: usize, bytes: &[u8]) {
        let m = self.meta[slot];
        if bytes.len() as u32 <= m.len {
            let start = m.offset as usize;
            self.storage[start..start + bytes.len()].copy_from_slice(bytes);
            self.meta[slot] = SuffixSlot {
                offset: m.offset,
                len: bytes.len() as u32,
            };
            return;
        }
        if self.would_fragment_too_much() {
            self.compact();
        }
        let offset = self.storage.len() as u32;
        self.storage.extend_from_slice(bytes);
        self.meta[slot] = SuffixSlot {
            offset,
            len: bytes.len() as u32,
        };
    }

    fn would_fragment_too_much(&self) -> bool {
        let live: usize = self.meta.iter().map(|m| m.len as usize).sum();
        self.storage.len() > live.saturating_mul(2) + 64
    }

    fn compact(&mut self) {
        let mut new_storage = Vec::with_capacity(self.storage.len());
        for m in self.meta.iter_mut() {
            if m.len == 0 {
                continue;
            }
            let start = m.offset as usize;
            let new_offset = new_storage.len() as u32;
            new_storage.extend_from_slice(&self.storage[start..start + m.len as usize]);
            m.offset = new_offset;
        }
        self.storage = new_storage;
    }
}

impl Default for SuffixBag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_and_get_round_trips() {
        let mut bag = SuffixBag::new();
        bag.assign(0, b"hello world");
        assert_eq!(bag.get(0), Some(&b"hello world"[..]));
        bag.clear(0);
        assert_eq!(bag.get(0), None);
    }

    #[test]
    fn compaction_preserves_live_data() {
        let mut bag = SuffixBag::new();
        for i in 0..FANOUT {
            bag.assign(i, format!("slot-{i}").as_bytes());
        }
        for i in 0..FANOUT {
            if i % 2 == 0 {
                bag.clear(i);
            }
        }
        for _ in 0..20 {
            bag.assign(1, b"grown-grown-grown-grown");
        }
        for i in 0..FANOUT {
            if i % 2 == 1 {
                assert!(bag.get(i).is_some());
            }
        }
    }
}
