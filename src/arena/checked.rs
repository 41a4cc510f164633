//! Pair store that cross-checks the packed arena against plain vectors.
//!
//! Every operation is applied to both a [`PackedPairArena`] and a map of
//! per-set `Vec`s, and every read asserts that the two agree. Slow, but any
//! bookkeeping bug in the bin layout shows up at the first diverging access.

use std::collections::HashMap;
use std::fmt::Debug;

use super::{PackedPairArena, PairStore, SetKey};

/// Verifying pair store for tests and audits
#[derive(Debug, Clone)]
pub struct CheckedPairArena<R> {
    packed: PackedPairArena<R>,
    mirror: HashMap<SetKey, Vec<(i32, R)>>,
}

impl<R: Copy + Default + PartialEq + Debug> CheckedPairArena<R> {
    pub fn new(bin_width: usize) -> Self {
        Self {
            packed: PackedPairArena::new(bin_width),
            mirror: HashMap::new(),
        }
    }

    /// Number of live sets
    pub fn set_count(&self) -> usize {
        self.mirror.len()
    }

    fn mirror(&self, key: SetKey) -> &Vec<(i32, R)> {
        self.mirror
            .get(&key)
            .unwrap_or_else(|| panic!("set {:?} is not allocated", key))
    }

    fn mirror_mut(&mut self, key: SetKey) -> &mut Vec<(i32, R)> {
        self.mirror
            .get_mut(&key)
            .unwrap_or_else(|| panic!("set {:?} is not allocated", key))
    }

    /// Assert the whole set matches its mirror
    fn check(&self, key: SetKey) {
        let packed = self.packed.to_vec(key);
        assert_eq!(&packed, self.mirror(key), "packed set {:?} diverged", key);
    }
}

impl<R: Copy + Default + PartialEq + Debug> PairStore<R> for CheckedPairArena<R> {
    type Iter<'a>
        = std::vec::IntoIter<(i32, R)>
    where
        Self: 'a;

    fn with_bin_width(bin_width: usize) -> Self {
        Self::new(bin_width)
    }

    fn allocate(&mut self) -> SetKey {
        let key = self.packed.allocate();
        let previous = self.mirror.insert(key, Vec::new());
        assert!(previous.is_none(), "set {:?} handed out twice", key);
        key
    }

    fn free(&mut self, key: SetKey) {
        self.check(key);
        self.packed.free(key);
        self.mirror.remove(&key);
    }

    fn len(&self, key: SetKey) -> usize {
        let len = self.packed.len(key);
        assert_eq!(len, self.mirror(key).len(), "length of set {:?} diverged", key);
        len
    }

    fn expand(&mut self, key: SetKey, n: usize) -> usize {
        let len = self.packed.expand(key, n);
        let mirror = self.mirror_mut(key);
        mirror.resize(mirror.len() + n, (0, R::default()));
        assert_eq!(len, mirror.len());
        len
    }

    fn get(&self, key: SetKey, index: usize) -> (i32, R) {
        let pair = self.packed.get(key, index);
        assert_eq!(pair, self.mirror(key)[index], "pair {} of set {:?} diverged", index, key);
        pair
    }

    fn set(&mut self, key: SetKey, index: usize, tag: i32, reference: R) {
        self.packed.set(key, index, tag, reference);
        self.mirror_mut(key)[index] = (tag, reference);
    }

    fn set_tag(&mut self, key: SetKey, index: usize, tag: i32) {
        self.packed.set_tag(key, index, tag);
        self.mirror_mut(key)[index].0 = tag;
    }

    fn set_ref(&mut self, key: SetKey, index: usize, reference: R) {
        self.packed.set_ref(key, index, reference);
        self.mirror_mut(key)[index].1 = reference;
    }

    fn swap_remove(&mut self, key: SetKey, index: usize) -> (i32, R) {
        let removed = self.packed.swap_remove(key, index);
        let expected = self.mirror_mut(key).swap_remove(index);
        assert_eq!(removed, expected, "removed pair of set {:?} diverged", key);
        self.check(key);
        removed
    }

    fn iter(&self, key: SetKey) -> Self::Iter<'_> {
        self.check(key);
        self.mirror(key).clone().into_iter()
    }

    fn bins_in_use(&self) -> usize {
        self.packed.bins_in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirrors_random_operations() {
        let mut arena = CheckedPairArena::<u32>::new(3);
        let mut sets: Vec<SetKey> = Vec::new();
        let mut state = 99u64;
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as usize
        };

        for step in 0..4000 {
            let roll = next() % 10;
            if sets.is_empty() || roll == 0 {
                sets.push(arena.allocate());
                continue;
            }
            let key = sets[next() % sets.len()];
            match roll {
                1 if sets.len() > 1 => {
                    let at = sets.iter().position(|k| *k == key).unwrap();
                    arena.free(sets.swap_remove(at));
                }
                2 => {
                    arena.expand(key, next() % 4);
                }
                3..=5 => arena.push(key, (next() % 8) as i32, step),
                6 | 7 if arena.len(key) > 0 => {
                    let index = next() % arena.len(key);
                    arena.swap_remove(key, index);
                }
                8 if arena.len(key) > 0 => {
                    let index = next() % arena.len(key);
                    arena.set_tag(key, index, -(step as i32));
                    arena.set_ref(key, index, step * 2);
                    arena.get(key, index);
                }
                _ => {
                    arena.iter(key).count();
                }
            }
        }

        for key in sets {
            arena.len(key);
            arena.free(key);
        }
        assert_eq!(arena.set_count(), 0);
        assert_eq!(arena.bins_in_use(), 0);
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn test_use_after_free_panics() {
        let mut arena = CheckedPairArena::<u32>::new(4);
        let key = arena.allocate();
        arena.free(key);
        arena.push(key, 1, 1);
    }
}
