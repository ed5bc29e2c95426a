//! Tagged child pointers shared by the tree root, interior routing entries, and leaf
//! sublayer links. A child is either a leaf or an interior node; rather than a
//! trait-object vtable on the hot path, the leaf/interior distinction is packed into
//! the pointer's otherwise-unused low bit, since both node types are allocated with at
//! least 2-byte alignment.

use std::sync::atomic::{AtomicUsize, Ordering};

const LEAF_TAG: usize = 1;

/// A decoded child reference: a raw, untyped pointer plus the leaf/interior tag.
/// Callers cast `ptr` back to `*mut Leaf<V>` or `*mut Interior<V>` based on `is_leaf`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Child {
    pub ptr: usize,
    pub is_leaf: bool,
}

impl Child {
    pub const NULL: Child = Child {
        ptr: 0,
        is_leaf: false,
    };

    pub fn is_null(&self) -> bool {
        self.ptr == 0
    }

    pub fn leaf<V>(ptr: *mut super::leaf::Leaf<V>) -> Self {
        Child {
            ptr: ptr as usize,
            is_leaf: true,
        }
    }

    pub fn interior<V>(ptr: *mut super::interior::Interior<V>) -> Self {
        Child {
            ptr: ptr as usize,
            is_leaf: false,
        }
    }

    fn pack(self) -> usize {
        debug_assert_eq!(self.ptr & LEAF_TAG, 0, "node pointers must be 2-byte aligned");
        self.ptr | (self.is_leaf as usize)
    }

    fn unpack(bits: usize) -> Self {
        Child {
            ptr: bits & !LEAF_TAG,
            is_leaf: bits & LEAF_TAG != 0,
        }
    }
}

/// An atomically-updated [`Child`]. Used where a pointer is read without holding any
/// node's lock — currently only the tree's root.
pub struct AtomicChild(AtomicUsize);

impl AtomicChild {
    pub fn new(child: Child) -> Self {
        AtomicChild(AtomicUsize::new(child.pack()))
    }

    pub fn load(&self, order: Ordering) -> Child {
        Child::unpack(self.0.load(order))
    }

    pub fn store(&self, child: Child, order: Ordering) {
        self.0.store(child.pack(), order);
    }

    pub fn compare_exchange(
        &self,
        current: Child,
        new: Child,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Child, Child> {
        self.0
            .compare_exchange(current.pack(), new.pack(), success, failure)
            .map(Child::unpack)
            .map_err(Child::unpack)
    }
}
