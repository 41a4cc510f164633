//! Lowest-free slot allocator
//!
//! Hands out the smallest unused non-negative integer. Occupancy is kept in a
//! hierarchical bitmap: level 0 has one bit per slot, and each higher level has
//! one bit per word of the level below, set when that word is completely full.
//! Finding the lowest free slot descends from the single top word, so both
//! acquire and release cost O(log64 n).

const WORD_BITS: usize = 64;

/// Allocator for dense integer slots
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    /// `levels[0]` is the occupancy bitmap, the last level always has one word
    levels: Vec<Vec<u64>>,
    /// Number of slots currently in use
    live: usize,
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotAllocator {
    /// Create an allocator with no slots in use
    pub fn new() -> Self {
        Self {
            levels: vec![vec![0]],
            live: 0,
        }
    }

    /// Take the lowest free slot and mark it used
    pub fn acquire(&mut self) -> usize {
        let slot = self.lowest_free();
        self.mark_used(slot);
        slot
    }

    /// Return a slot to the pool.
    ///
    /// Panics if the slot is not currently in use.
    pub fn release(&mut self, slot: usize) {
        assert!(self.is_used(slot), "release of free slot {}", slot);

        let mut index = slot;
        for level in self.levels.iter_mut() {
            let word = index / WORD_BITS;
            let bit = index % WORD_BITS;
            let was_full = level[word] == u64::MAX;
            level[word] &= !(1u64 << bit);
            // Ancestors only track fullness; stop once a word was not full.
            if !was_full {
                break;
            }
            index = word;
        }
        self.live -= 1;
    }

    /// Whether the slot is in use
    pub fn is_used(&self, slot: usize) -> bool {
        let word = slot / WORD_BITS;
        self.levels[0]
            .get(word)
            .is_some_and(|w| w & (1u64 << (slot % WORD_BITS)) != 0)
    }

    /// Number of slots in use
    pub fn len(&self) -> usize {
        self.live
    }

    /// True when no slots are in use
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots the bitmap can describe without growing
    pub fn capacity(&self) -> usize {
        self.levels[0].len() * WORD_BITS
    }

    /// One past the highest slot in use
    pub fn high_water(&self) -> usize {
        for (word_index, word) in self.levels[0].iter().enumerate().rev() {
            if *word != 0 {
                return word_index * WORD_BITS + (WORD_BITS - word.leading_zeros() as usize);
            }
        }
        0
    }

    fn lowest_free(&self) -> usize {
        let mut index = 0;
        for depth in (0..self.levels.len()).rev() {
            let level = &self.levels[depth];
            if index >= level.len() {
                // Everything that exists below is full.
                return self.capacity();
            }
            let free = !level[index];
            if free == 0 {
                return self.capacity();
            }
            index = index * WORD_BITS + free.trailing_zeros() as usize;
        }
        index
    }

    fn mark_used(&mut self, slot: usize) {
        self.reserve(slot + 1);

        let mut index = slot;
        for level in self.levels.iter_mut() {
            let word = index / WORD_BITS;
            let bit = index % WORD_BITS;
            debug_assert!(level[word] & (1u64 << bit) == 0, "slot {} already used", slot);
            level[word] |= 1u64 << bit;
            if level[word] != u64::MAX {
                break;
            }
            index = word;
        }
        self.live += 1;
    }

    /// Grow the bitmap so `slots` slots can be described
    fn reserve(&mut self, slots: usize) {
        if slots <= self.capacity() {
            return;
        }
        let words = slots.div_ceil(WORD_BITS);
        self.levels[0].resize(words, 0);

        let mut depth = 0;
        loop {
            let below = self.levels[depth].len();
            if below == 1 {
                self.levels.truncate(depth + 1);
                return;
            }
            let needed = below.div_ceil(WORD_BITS);
            if depth + 1 == self.levels.len() {
                // New top level: derive fullness bits from the level below.
                let mut top = vec![0u64; needed];
                for (i, word) in self.levels[depth].iter().enumerate() {
                    if *word == u64::MAX {
                        top[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
                    }
                }
                self.levels.push(top);
            } else {
                self.levels[depth + 1].resize(needed, 0);
            }
            depth += 1;
        }
    }
}
