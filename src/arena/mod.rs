//! Packed storage for chain adjacency data
//!
//! Every chain owns two small growable lists of `(tag, reference)` pairs: its
//! subchains (tag = octant) and its touching edges (tag = direction). Rather
//! than one heap allocation per list, all lists of one kind share a
//! [`PackedPairArena`] made of fixed-width bins that are linked together when
//! a list outgrows its first bin.

pub mod slots;
pub mod packed;
pub mod checked;

pub use slots::SlotAllocator;
pub use packed::PackedPairArena;
pub use checked::CheckedPairArena;

use std::fmt::Debug;

/// Handle to one set inside a pair store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SetKey(pub(crate) u32);

impl SetKey {
    /// Raw index of the set's first bin
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Storage for many independent ordered lists of `(tag, reference)` pairs.
///
/// Indices are positions within one set. Removal swaps the last pair into
/// the hole, so order is not preserved across `swap_remove`.
pub trait PairStore<R: Copy + Default + PartialEq + Debug> {
    /// Single-pass iterator over one set
    type Iter<'a>: Iterator<Item = (i32, R)>
    where
        Self: 'a;

    /// Create an empty store whose bins hold `bin_width` pairs
    fn with_bin_width(bin_width: usize) -> Self;

    /// Create a new empty set
    fn allocate(&mut self) -> SetKey;

    /// Release all storage of a set. The key must not be used afterwards.
    fn free(&mut self, key: SetKey);

    /// Number of pairs in the set
    fn len(&self, key: SetKey) -> usize;

    /// Grow the set by `n` default pairs, returning the new length
    fn expand(&mut self, key: SetKey, n: usize) -> usize;

    fn get(&self, key: SetKey, index: usize) -> (i32, R);

    fn set(&mut self, key: SetKey, index: usize, tag: i32, reference: R);

    fn set_tag(&mut self, key: SetKey, index: usize, tag: i32);

    fn set_ref(&mut self, key: SetKey, index: usize, reference: R);

    /// Remove the pair at `index` by moving the last pair into its place
    fn swap_remove(&mut self, key: SetKey, index: usize) -> (i32, R);

    fn iter(&self, key: SetKey) -> Self::Iter<'_>;

    /// Append a pair
    fn push(&mut self, key: SetKey, tag: i32, reference: R) {
        let len = self.expand(key, 1);
        self.set(key, len - 1, tag, reference);
    }

    fn is_empty(&self, key: SetKey) -> bool {
        self.len(key) == 0
    }

    fn contains(&self, key: SetKey, tag: i32, reference: R) -> bool {
        self.iter(key).any(|(t, r)| t == tag && r == reference)
    }

    /// Index of the first pair matching the predicate
    fn position(&self, key: SetKey, mut predicate: impl FnMut(i32, R) -> bool) -> Option<usize> {
        self.iter(key).position(|(t, r)| predicate(t, r))
    }

    /// Append unless an identical pair is already present.
    /// Returns true if the pair was added.
    fn insert(&mut self, key: SetKey, tag: i32, reference: R) -> bool {
        if self.contains(key, tag, reference) {
            false
        } else {
            self.push(key, tag, reference);
            true
        }
    }

    /// Remove one pair equal to `(tag, reference)`. Returns true if found.
    fn remove_pair(&mut self, key: SetKey, tag: i32, reference: R) -> bool {
        match self.position(key, |t, r| t == tag && r == reference) {
            Some(index) => {
                self.swap_remove(key, index);
                true
            }
            None => false,
        }
    }

    /// Copy the set out, for callers that mutate the store while walking it
    fn to_vec(&self, key: SetKey) -> Vec<(i32, R)> {
        self.iter(key).collect()
    }

    /// Number of bins currently in use
    fn bins_in_use(&self) -> usize;
}
