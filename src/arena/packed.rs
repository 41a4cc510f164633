//! Bin-packed pair arena

use std::fmt::Debug;

use super::{PairStore, SetKey, SlotAllocator};

const NO_BIN: u32 = u32::MAX;

/// Many small pair lists packed into shared fixed-width bins.
///
/// A set is identified by its head bin. The head bin's `len` entry holds the
/// set length; `next` links continuation bins. Bins are numbered by a
/// [`SlotAllocator`], so freed bins are reused lowest-first and live data stays
/// near the front of the storage vectors.
#[derive(Debug, Clone)]
pub struct PackedPairArena<R> {
    bin_width: usize,
    tags: Vec<i32>,
    refs: Vec<R>,
    /// Per bin: next bin of the same set, or `NO_BIN`
    next: Vec<u32>,
    /// Per bin: set length (meaningful for head bins only)
    lens: Vec<u32>,
    bins: SlotAllocator,
}

impl<R: Copy + Default + PartialEq + Debug> PackedPairArena<R> {
    pub fn new(bin_width: usize) -> Self {
        assert!(bin_width > 0, "bin width must be non-zero");
        Self {
            bin_width,
            tags: Vec::new(),
            refs: Vec::new(),
            next: Vec::new(),
            lens: Vec::new(),
            bins: SlotAllocator::new(),
        }
    }

    pub fn bin_width(&self) -> usize {
        self.bin_width
    }

    /// Number of bins needed for a set of `len` pairs. The head bin always
    /// exists, even for an empty set.
    fn bins_for(&self, len: usize) -> usize {
        len.div_ceil(self.bin_width).max(1)
    }

    fn new_bin(&mut self) -> u32 {
        let bin = self.bins.acquire();
        if bin >= self.next.len() {
            let bins = bin + 1;
            self.next.resize(bins, NO_BIN);
            self.lens.resize(bins, 0);
            self.tags.resize(bins * self.bin_width, 0);
            self.refs.resize(bins * self.bin_width, R::default());
        }
        self.next[bin] = NO_BIN;
        self.lens[bin] = 0;
        bin as u32
    }

    /// The `n`th bin of a set
    fn nth_bin(&self, key: SetKey, n: usize) -> u32 {
        let mut bin = key.0;
        for _ in 0..n {
            bin = self.next[bin as usize];
            debug_assert_ne!(bin, NO_BIN);
        }
        bin
    }

    /// Storage offset of the pair at `index`
    fn address(&self, key: SetKey, index: usize) -> usize {
        assert!(
            index < self.len(key),
            "pair index {} out of range for set {:?} of length {}",
            index,
            key,
            self.len(key)
        );
        let bin = self.nth_bin(key, index / self.bin_width);
        bin as usize * self.bin_width + index % self.bin_width
    }
}

impl<R: Copy + Default + PartialEq + Debug> PairStore<R> for PackedPairArena<R> {
    type Iter<'a>
        = PairIter<'a, R>
    where
        Self: 'a;

    fn with_bin_width(bin_width: usize) -> Self {
        Self::new(bin_width)
    }

    fn allocate(&mut self) -> SetKey {
        SetKey(self.new_bin())
    }

    fn free(&mut self, key: SetKey) {
        let mut bin = key.0;
        while bin != NO_BIN {
            let next = self.next[bin as usize];
            self.next[bin as usize] = NO_BIN;
            self.bins.release(bin as usize);
            bin = next;
        }
    }

    fn len(&self, key: SetKey) -> usize {
        self.lens[key.0 as usize] as usize
    }

    fn expand(&mut self, key: SetKey, n: usize) -> usize {
        let old_len = self.len(key);
        let new_len = old_len + n;
        let have = self.bins_for(old_len);
        let need = self.bins_for(new_len);

        if need > have {
            let mut bin = self.nth_bin(key, have - 1);
            for _ in have..need {
                let fresh = self.new_bin();
                self.next[bin as usize] = fresh;
                bin = fresh;
            }
        }
        self.lens[key.0 as usize] = new_len as u32;

        for index in old_len..new_len {
            let at = self.address(key, index);
            self.tags[at] = 0;
            self.refs[at] = R::default();
        }
        new_len
    }

    fn get(&self, key: SetKey, index: usize) -> (i32, R) {
        let at = self.address(key, index);
        (self.tags[at], self.refs[at])
    }

    fn set(&mut self, key: SetKey, index: usize, tag: i32, reference: R) {
        let at = self.address(key, index);
        self.tags[at] = tag;
        self.refs[at] = reference;
    }

    fn set_tag(&mut self, key: SetKey, index: usize, tag: i32) {
        let at = self.address(key, index);
        self.tags[at] = tag;
    }

    fn set_ref(&mut self, key: SetKey, index: usize, reference: R) {
        let at = self.address(key, index);
        self.refs[at] = reference;
    }

    fn swap_remove(&mut self, key: SetKey, index: usize) -> (i32, R) {
        let len = self.len(key);
        let removed = self.get(key, index);
        let last = len - 1;
        if index != last {
            let (tag, reference) = self.get(key, last);
            self.set(key, index, tag, reference);
        }

        let keep = self.bins_for(last);
        if keep < self.bins_for(len) {
            let tail = self.nth_bin(key, keep - 1);
            let dropped = self.next[tail as usize];
            self.next[tail as usize] = NO_BIN;
            self.free(SetKey(dropped));
        }
        self.lens[key.0 as usize] = last as u32;
        removed
    }

    fn iter(&self, key: SetKey) -> Self::Iter<'_> {
        PairIter {
            arena: self,
            bin: key.0,
            offset: 0,
            remaining: self.len(key),
        }
    }

    fn bins_in_use(&self) -> usize {
        self.bins.len()
    }
}

/// Iterator over one set of a [`PackedPairArena`]
pub struct PairIter<'a, R> {
    arena: &'a PackedPairArena<R>,
    bin: u32,
    offset: usize,
    remaining: usize,
}

impl<R: Copy> Iterator for PairIter<'_, R> {
    type Item = (i32, R);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.offset == self.arena.bin_width {
            self.bin = self.arena.next[self.bin as usize];
            self.offset = 0;
        }
        let at = self.bin as usize * self.arena.bin_width + self.offset;
        self.offset += 1;
        self.remaining -= 1;
        Some((self.arena.tags[at], self.arena.refs[at]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Copy> ExactSizeIterator for PairIter<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get_across_bins() {
        let mut arena = PackedPairArena::<u32>::new(3);
        let set = arena.allocate();
        for i in 0..10 {
            arena.push(set, i as i32, i * 10);
        }
        assert_eq!(arena.len(set), 10);
        assert_eq!(arena.bins_in_use(), 4);
        for i in 0..10 {
            assert_eq!(arena.get(set, i), (i as i32, i as u32 * 10));
        }
        let collected: Vec<_> = arena.iter(set).collect();
        assert_eq!(collected.len(), 10);
        assert_eq!(collected[9], (9, 90));
    }

    #[test]
    fn test_swap_remove_releases_trailing_bin() {
        let mut arena = PackedPairArena::<u32>::new(2);
        let set = arena.allocate();
        for i in 0..5 {
            arena.push(set, i, i as u32);
        }
        assert_eq!(arena.bins_in_use(), 3);

        assert_eq!(arena.swap_remove(set, 1), (1, 1));
        assert_eq!(arena.len(set), 4);
        assert_eq!(arena.get(set, 1), (4, 4));
        assert_eq!(arena.bins_in_use(), 2);

        while arena.len(set) > 0 {
            arena.swap_remove(set, 0);
        }
        assert_eq!(arena.bins_in_use(), 1);
    }

    #[test]
    fn test_sets_are_independent() {
        let mut arena = PackedPairArena::<u32>::new(2);
        let a = arena.allocate();
        let b = arena.allocate();
        for i in 0..4 {
            arena.push(a, 1, i);
            arena.push(b, 2, 100 + i);
        }
        arena.set_ref(a, 3, 77);
        arena.set_tag(b, 0, -4);
        assert_eq!(arena.get(a, 3), (1, 77));
        assert_eq!(arena.get(b, 0), (-4, 100));
        assert_eq!(arena.get(b, 3), (2, 103));

        arena.free(a);
        assert_eq!(arena.bins_in_use(), 2);
        let c = arena.allocate();
        assert_eq!(c.index(), a.index());
        assert_eq!(arena.len(c), 0);
    }

    #[test]
    fn test_expand_fills_defaults() {
        let mut arena = PackedPairArena::<u32>::new(4);
        let set = arena.allocate();
        arena.push(set, 9, 9);
        arena.swap_remove(set, 0);
        assert_eq!(arena.expand(set, 6), 6);
        for i in 0..6 {
            assert_eq!(arena.get(set, i), (0, 0));
        }
    }

    #[test]
    fn test_insert_and_remove_pair() {
        let mut arena = PackedPairArena::<u32>::new(6);
        let set = arena.allocate();
        assert!(arena.insert(set, 1, 5));
        assert!(!arena.insert(set, 1, 5));
        assert!(arena.insert(set, -1, 5));
        assert!(arena.contains(set, -1, 5));
        assert!(arena.remove_pair(set, 1, 5));
        assert!(!arena.remove_pair(set, 1, 5));
        assert_eq!(arena.to_vec(set), vec![(-1, 5)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range_panics() {
        let mut arena = PackedPairArena::<u32>::new(4);
        let set = arena.allocate();
        arena.push(set, 0, 0);
        arena.get(set, 1);
    }
}
