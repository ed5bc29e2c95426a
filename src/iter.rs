//! C8: the range iterator. Walks the B-link leaf chain of the top layer (and,
//! transparently, into any sublayer a long or colliding key created), in either
//! direction, reconstructing each full key as it goes and filtering against the
//! caller's bounds.

use std::ops::Bound;

use crate::epoch;
use crate::leaf::{Leaf, KEYLENX_HAS_SUFFIX, KEYLENX_LAYER};
use crate::tree::Tree;

struct Frame<V> {
    leaf: *const Leaf<V>,
    /// Bytes contributed by all enclosing layers' ikeys, consumed before this leaf's
    /// own 8-byte window.
    prefix: Vec<u8>,
    /// Forward: next logical position to examine. Reverse: next logical position to
    /// examine counting down, or `-1` if this frame's starting position has not yet
    /// been computed (deferred because it depends on the leaf's size at visit time).
    pos: isize,
}

/// A forward or reverse walk over a key range. Holds an epoch pin for its whole
/// lifetime, so every leaf it can reach stays valid even if concurrently unlinked.
pub struct RangeIter<'a, V> {
    tree: &'a Tree<V>,
    reverse: bool,
    start: Bound<Vec<u8>>,
    end: Bound<Vec<u8>>,
    stack: Vec<Frame<V>>,
    done: bool,
    _pin: epoch::Guard<'a>,
}

fn after_start(start: &Bound<Vec<u8>>, key: &[u8]) -> bool {
    match start {
        Bound::Unbounded => true,
        Bound::Included(s) => key >= s.as_slice(),
        Bound::Excluded(s) => key > s.as_slice(),
    }
}

fn before_end(end: &Bound<Vec<u8>>, key: &[u8]) -> bool {
    match end {
        Bound::Unbounded => true,
        Bound::Included(e) => key <= e.as_slice(),
        Bound::Excluded(e) => key < e.as_slice(),
    }
}

fn reconstruct_tail<V>(leaf: &Leaf<V>, phys: usize, keylenx: u8) -> Vec<u8> {
    let ikey_bytes = leaf.ikey_at(phys).to_be_bytes();
    if keylenx == KEYLENX_HAS_SUFFIX {
        let mut tail = ikey_bytes.to_vec();
        if let Some(suffix) = leaf.suffix_at(phys) {
            tail.extend_from_slice(&suffix);
        }
        tail
    } else {
        ikey_bytes[..keylenx as usize].to_vec()
    }
}

impl<'a, V> RangeIter<'a, V> {
    pub(crate) fn new(
        tree: &'a Tree<V>,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
        reverse: bool,
    ) -> Self {
        let pin = tree.pin();
        let initial = if reverse {
            tree.initial_reverse_leaf(&end)
        } else {
            tree.initial_forward_leaf(&start)
        };
        let stack = if initial.is_null() {
            Vec::new()
        } else {
            vec![Frame {
                leaf: initial,
                prefix: Vec::new(),
                pos: if reverse { -1 } else { 0 },
            }]
        };
        RangeIter {
            tree,
            reverse,
            start,
            end,
            stack,
            done: false,
            _pin: pin,
        }
    }

    fn next_forward(&mut self) -> Option<(Vec<u8>, V)>
    where
        V: Clone,
    {
        loop {
            let frame = self.stack.last_mut()?;
            let leaf = unsafe { &*frame.leaf };
            let snap_v = leaf.version.stable();
            let psnap = leaf.permutation.snapshot();
            if (frame.pos as usize) >= psnap.size() {
                let next_ptr = leaf.next.load(std::sync::atomic::Ordering::Acquire);
                if leaf.version.has_changed(snap_v) {
                    continue;
                }
                let prefix = self.stack.pop().expect("frame present").prefix;
                if !next_ptr.is_null() {
                    self.stack.push(Frame {
                        leaf: next_ptr,
                        prefix,
                        pos: 0,
                    });
                }
                continue;
            }
            let phys = psnap.get(frame.pos as usize);
            let keylenx = leaf.keylenx_at(phys);
            if keylenx >= KEYLENX_LAYER {
                let child = leaf.child_at(phys);
                if leaf.version.has_changed(snap_v) {
                    continue;
                }
                let child = match child {
                    Some(c) => c,
                    None => continue,
                };
                let mut sub_prefix = frame.prefix.clone();
                sub_prefix.extend_from_slice(&leaf.ikey_at(phys).to_be_bytes());
                frame.pos += 1;
                let sub_leaf = self.tree.leftmost_of(child);
                self.stack.push(Frame {
                    leaf: sub_leaf,
                    prefix: sub_prefix,
                    pos: 0,
                });
                continue;
            }
            let tail = reconstruct_tail(leaf, phys, keylenx);
            let value = leaf.value_clone_at(phys);
            if leaf.version.has_changed(snap_v) {
                continue;
            }
            let value = match value {
                Some(v) => v,
                None => continue,
            };
            let mut full_key = frame.prefix.clone();
            full_key.extend_from_slice(&tail);
            frame.pos += 1;
            if !after_start(&self.start, &full_key) {
                continue;
            }
            if !before_end(&self.end, &full_key) {
                self.stack.clear();
                self.done = true;
                return None;
            }
            return Some((full_key, value));
        }
    }

    fn next_reverse(&mut self) -> Option<(Vec<u8>, V)>
    where
        V: Clone,
    {
        loop {
            let frame = self.stack.last_mut()?;
            let leaf = unsafe { &*frame.leaf };
            let snap_v = leaf.version.stable();
            let psnap = leaf.permutation.snapshot();
            if frame.pos < 0 {
                if psnap.size() == 0 {
                    frame.pos = -2; // sentinel: force the "exhausted" branch below
                } else {
                    frame.pos = psnap.size() as isize - 1;
                    continue;
                }
            }
            if frame.pos < 0 {
                let prev_ptr = leaf.prev.load(std::sync::atomic::Ordering::Acquire);
                if leaf.version.has_changed(snap_v) {
                    frame.pos = -1;
                    continue;
                }
                let prefix = self.stack.pop().expect("frame present").prefix;
                if !prev_ptr.is_null() {
                    self.stack.push(Frame {
                        leaf: prev_ptr,
                        prefix,
                        pos: -1,
                    });
                }
                continue;
            }
            let phys = psnap.get(frame.pos as usize);
            let keylenx = leaf.keylenx_at(phys);
            if keylenx >= KEYLENX_LAYER {
                let child = leaf.child_at(phys);
                if leaf.version.has_changed(snap_v) {
                    continue;
                }
                let child = match child {
                    Some(c) => c,
                    None => continue,
                };
                let mut sub_prefix = frame.prefix.clone();
                sub_prefix.extend_from_slice(&leaf.ikey_at(phys).to_be_bytes());
                frame.pos -= 1;
                let sub_leaf = self.tree.rightmost_of(child);
                self.stack.push(Frame {
                    leaf: sub_leaf,
                    prefix: sub_prefix,
                    pos: -1,
                });
                continue;
            }
            let tail = reconstruct_tail(leaf, phys, keylenx);
            let value = leaf.value_clone_at(phys);
            if leaf.version.has_changed(snap_v) {
                continue;
            }
            let value = match value {
                Some(v) => v,
                None => continue,
            };
            let mut full_key = frame.prefix.clone();
            full_key.extend_from_slice(&tail);
            frame.pos -= 1;
            if !before_end(&self.end, &full_key) {
                continue;
            }
            if !after_start(&self.start, &full_key) {
                self.stack.clear();
                self.done = true;
                return None;
            }
            return Some((full_key, value));
        }
    }
}

impl<'a, V: Clone> Iterator for RangeIter<'a, V> {
    type Item = (Vec<u8>, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.reverse {
            self.next_reverse()
        } else {
            self.next_forward()
        }
    }
}
