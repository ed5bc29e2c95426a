//! A concurrent, in-memory, ordered index from variable-length byte-string keys to
//! arbitrary values: a trie of B⁺-trees keyed on 8-byte big-endian slices of the key
//! (the Masstree design). Lock-free readers, per-node locking for writers, epoch-based
//! memory reclamation, and range iteration that tolerates concurrent structural change.
//!
//! ```
//! use masstree::Tree;
//!
//! let tree = Tree::new();
//! tree.put(b"hello", 1).unwrap();
//! assert_eq!(tree.get(b"hello"), Some(1));
//! assert_eq!(tree.remove(b"hello"), Some(1));
//! ```

pub mod coalesce;
pub mod config;
pub mod counter;
pub mod epoch;
pub mod error;
pub mod interior;
pub mod iter;
pub mod key;
pub mod leaf;
pub mod node;
pub mod permutation;
pub mod pool;
pub mod suffix;
pub mod tree;
pub mod version;

pub use error::MasstreeError;
pub use iter::RangeIter;
pub use tree::Tree;

/// Range endpoint vocabulary for [`Tree::range`] / [`Tree::range_reverse`], re-exported
/// so callers do not need their own `use std::ops::Bound` for this crate's API alone.
pub use std::ops::Bound;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_round_trips() {
        let tree: Tree<&'static str> = Tree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.put(b"k1", "v1").unwrap(), None);
        assert_eq!(tree.put(b"k2", "v2").unwrap(), None);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(b"k1"), Some("v1"));
        let all: Vec<_> = tree.range(Bound::Unbounded, Bound::Unbounded).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(tree.remove(b"k1"), Some("v1"));
        assert_eq!(tree.len(), 1);
    }
}
