//! Chains: connected components of solid voxels at one octree level
//!
//! A chain belongs to one node. A composite chain (in an internal node) is
//! made of subchains, one or more per child, glued together by touching edges
//! between the children. A full chain spans a whole full node and has no
//! substructure. Touching edges link chains of equal size in face-adjacent
//! nodes and are kept symmetric: `(d, b)` in `a` iff `(-d, a)` in `b`.
//!
//! All links between chains are [`ChainId`] handles resolved through the
//! tree's chain arena, and all variable-length lists live in the tree's pair
//! arenas.

use crate::arena::{PairStore, SetKey, SlotAllocator};
use crate::core::IVec3;

use super::node::{FullKind, NodeId};
use super::octant::{adjacent, adjacent_across, is_octant_on_side, octant_offset, DIRECTIONS};
use super::tree::Tree;

/// Generational handle to a chain.
///
/// A handle stays comparable after its chain is destroyed, and a later chain
/// reusing the slot gets a new generation, so stale handles read as inactive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    index: u32,
    generation: u32,
}

/// Per-chain bookkeeping
#[derive(Debug, Clone)]
pub(crate) struct Chain {
    /// Node whose voxels this chain partitions
    pub node: NodeId,
    /// Chain one level up containing this one
    pub parent: Option<ChainId>,
    /// Contains an unavailable region somewhere below
    pub supported: bool,
    /// `(octant, child chain)` pairs; `None` for full chains
    pub subchains: Option<SetKey>,
    /// `(direction, chain)` pairs
    pub touching: SetKey,
}

#[derive(Debug, Default)]
struct ChainSlot {
    generation: u32,
    chain: Option<Chain>,
}

/// Generational chain storage
#[derive(Debug, Default)]
pub(crate) struct ChainArena {
    slots: Vec<ChainSlot>,
    ids: SlotAllocator,
}

impl ChainArena {
    pub fn insert(&mut self, chain: Chain) -> ChainId {
        let index = self.ids.acquire();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, ChainSlot::default);
        }
        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        slot.chain = Some(chain);
        ChainId {
            index: index as u32,
            generation: slot.generation,
        }
    }

    pub fn remove(&mut self, id: ChainId) -> Chain {
        let chain = self
            .slot_mut(id)
            .and_then(|slot| slot.chain.take())
            .unwrap_or_else(|| panic!("chain {:?} is not active", id));
        self.ids.release(id.index as usize);
        chain
    }

    pub fn get(&self, id: ChainId) -> Option<&Chain> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.chain.as_ref())
    }

    pub fn get_mut(&mut self, id: ChainId) -> Option<&mut Chain> {
        self.slot_mut(id).and_then(|slot| slot.chain.as_mut())
    }

    fn slot_mut(&mut self, id: ChainId) -> Option<&mut ChainSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl<S: PairStore<ChainId>> Tree<S> {
    pub(crate) fn chain(&self, id: ChainId) -> &Chain {
        self.chains
            .get(id)
            .unwrap_or_else(|| panic!("chain {:?} is not active", id))
    }

    pub(crate) fn chain_mut(&mut self, id: ChainId) -> &mut Chain {
        self.chains
            .get_mut(id)
            .unwrap_or_else(|| panic!("chain {:?} is not active", id))
    }

    /// Whether the handle refers to a live chain
    pub fn is_active(&self, id: ChainId) -> bool {
        self.chains.get(id).is_some()
    }

    /// Chain one level up, if any
    pub fn parent(&self, id: ChainId) -> Option<ChainId> {
        self.chain(id).parent
    }

    /// Whether the chain contains an unavailable region
    pub fn is_supported(&self, id: ChainId) -> bool {
        self.chain(id).supported
    }

    pub(crate) fn is_full_chain(&self, id: ChainId) -> bool {
        self.chain(id).subchains.is_none()
    }

    /// Edge length of the chain's node
    pub fn chain_size(&self, id: ChainId) -> i32 {
        self.nodes.get(self.chain(id).node).size
    }

    /// Highest ancestor of a live chain
    pub fn topmost(&self, id: ChainId) -> ChainId {
        let mut current = id;
        while let Some(parent) = self.chain(current).parent {
            current = parent;
        }
        current
    }

    pub(crate) fn subchain_list(&self, id: ChainId) -> Vec<(u8, ChainId)> {
        match self.chain(id).subchains {
            Some(key) => self
                .subchains
                .iter(key)
                .map(|(octant, child)| (octant as u8, child))
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn touching_list(&self, id: ChainId) -> Vec<(i8, ChainId)> {
        self.touching
            .iter(self.chain(id).touching)
            .map(|(direction, other)| (direction as i8, other))
            .collect()
    }

    pub(crate) fn new_full_chain(&mut self, node: NodeId, kind: FullKind) -> ChainId {
        let touching = self.touching.allocate();
        self.chains.insert(Chain {
            node,
            parent: None,
            supported: kind.is_supported(),
            subchains: None,
            touching,
        })
    }

    /// Create a composite chain from child chains, point the children at it,
    /// and derive the touching edges its children imply across the node
    /// boundary. The caller registers the chain with its node.
    pub(crate) fn new_composite_chain(
        &mut self,
        node: NodeId,
        parts: &[(u8, ChainId)],
        parent: Option<ChainId>,
    ) -> ChainId {
        let subchains = self.subchains.allocate();
        let touching = self.touching.allocate();
        let mut supported = false;
        for &(octant, child) in parts {
            self.subchains.push(subchains, octant as i32, child);
            supported |= self.chain(child).supported;
        }
        let id = self.chains.insert(Chain {
            node,
            parent,
            supported,
            subchains: Some(subchains),
            touching,
        });

        for &(_, child) in parts {
            self.chain_mut(child).parent = Some(id);
        }
        for &(octant, child) in parts {
            for (direction, other) in self.touching_list(child) {
                if !is_octant_on_side(octant, direction) {
                    continue;
                }
                if let Some(other_parent) = self.chain(other).parent {
                    if other_parent != id {
                        self.add_touching(id, other_parent, direction);
                    }
                }
            }
        }
        id
    }

    /// Record that `a` touches `b` in `direction`, on both sides
    pub(crate) fn add_touching(&mut self, a: ChainId, b: ChainId, direction: i8) {
        debug_assert_ne!(a, b, "chain touching itself");
        let a_key = self.chain(a).touching;
        let b_key = self.chain(b).touching;
        self.touching.insert(a_key, direction as i32, b);
        self.touching.insert(b_key, -direction as i32, a);
    }

    /// Forget that `a` touches `b` in `direction`, on both sides
    pub(crate) fn remove_touching(&mut self, a: ChainId, b: ChainId, direction: i8) {
        let a_key = self.chain(a).touching;
        let b_key = self.chain(b).touching;
        self.touching.remove_pair(a_key, direction as i32, b);
        self.touching.remove_pair(b_key, -direction as i32, a);
    }

    pub(crate) fn add_subchain(&mut self, parent: ChainId, octant: u8, child: ChainId) {
        let key = self.subchain_key(parent);
        self.subchains.push(key, octant as i32, child);
    }

    /// Remove `child` from `parent`'s subchains, returning its octant
    pub(crate) fn remove_subchain(&mut self, parent: ChainId, child: ChainId) -> u8 {
        let key = self.subchain_key(parent);
        let index = self
            .subchains
            .position(key, |_, c| c == child)
            .unwrap_or_else(|| panic!("chain {:?} is not a subchain of {:?}", child, parent));
        self.subchains.swap_remove(key, index).0 as u8
    }

    fn subchain_key(&self, id: ChainId) -> SetKey {
        self.chain(id)
            .subchains
            .unwrap_or_else(|| panic!("full chain {:?} has no subchains", id))
    }

    pub(crate) fn subchain_count(&self, id: ChainId) -> usize {
        self.chain(id)
            .subchains
            .map_or(0, |key| self.subchains.len(key))
    }

    /// Recompute `supported` from the subchains. Full chains keep theirs.
    pub(crate) fn reset_supported(&mut self, id: ChainId) {
        if let Some(key) = self.chain(id).subchains {
            let supported = self
                .subchains
                .iter(key)
                .any(|(_, child)| self.chain(child).supported);
            self.chain_mut(id).supported = supported;
        }
    }

    /// Absorb `sibling` into `this`. Both must be composite chains of the same
    /// node. Parents that differ are merged as well, level by level.
    pub(crate) fn merge(&mut self, this: ChainId, sibling: ChainId) {
        let (mut this, mut sibling) = (this, sibling);
        loop {
            assert_ne!(this, sibling, "chain {:?} merged with itself", this);
            let this_chain = self.chain(this).clone();
            let other = self.chain(sibling).clone();
            assert_eq!(this_chain.node, other.node, "merge of chains in different nodes");
            if let Some(parent) = other.parent {
                assert!(self.is_active(parent), "merge with inactive parent {:?}", parent);
            }
            let this_subchains = self.subchain_key(this);
            let other_subchains = self.subchain_key(sibling);

            for (octant, child) in self.subchains.to_vec(other_subchains) {
                self.subchains.push(this_subchains, octant, child);
                self.chain_mut(child).parent = Some(this);
            }
            for (direction, far) in self.touching.to_vec(other.touching) {
                self.add_touching(this, far, direction as i8);
            }

            let mut next = None;
            match (this_chain.parent, other.parent) {
                (None, Some(other_parent)) => {
                    // Take over the sibling's place in its parent.
                    let key = self.subchain_key(other_parent);
                    let index = self
                        .subchains
                        .position(key, |_, c| c == sibling)
                        .unwrap_or_else(|| panic!("chain {:?} missing from its parent", sibling));
                    self.subchains.set_ref(key, index, this);
                    self.chain_mut(this).parent = Some(other_parent);
                }
                (Some(this_parent), Some(other_parent)) => {
                    self.remove_subchain(other_parent, sibling);
                    if this_parent != other_parent {
                        next = Some((this_parent, other_parent));
                    }
                }
                (_, None) => {}
            }

            self.inactivate(sibling, false);

            if other.supported && !this_chain.supported {
                self.chain_mut(this).supported = true;
                self.mark_ancestors_supported(this);
            }

            match next {
                Some((this_parent, other_parent)) => {
                    this = this_parent;
                    sibling = other_parent;
                }
                None => break,
            }
        }
    }

    fn mark_ancestors_supported(&mut self, id: ChainId) {
        let mut current = self.chain(id).parent;
        while let Some(ancestor) = current {
            let chain = self.chain_mut(ancestor);
            chain.supported = true;
            current = chain.parent;
        }
    }

    /// Swap `this` for a structurally equivalent chain in a rebuilt node.
    /// `replacement` takes over the subchains, the touching edges it really
    /// has, and `this`'s entry in the parent.
    pub(crate) fn replace_with(&mut self, this: ChainId, replacement: ChainId) {
        let old = self.chain(this).clone();

        if let Some(key) = old.subchains {
            let replacement_key = self.chain(replacement).subchains;
            for (octant, child) in self.subchains.to_vec(key) {
                self.chain_mut(child).parent = Some(replacement);
                if let Some(replacement_key) = replacement_key {
                    self.subchains.push(replacement_key, octant, child);
                }
            }
        }

        for (direction, far) in self.touching_list(this) {
            self.remove_touching(this, far, direction);
            if self.base_is_touching(replacement, far, direction) {
                self.add_touching(replacement, far, direction);
            }
        }

        if let Some(parent) = old.parent {
            let key = self.subchain_key(parent);
            let index = self
                .subchains
                .position(key, |_, c| c == this)
                .unwrap_or_else(|| panic!("chain {:?} missing from its parent", this));
            self.subchains.set_ref(key, index, replacement);
            if self.chain(replacement).supported != old.supported {
                let mut current = Some(parent);
                while let Some(ancestor) = current {
                    self.reset_supported(ancestor);
                    current = self.chain(ancestor).parent;
                }
            }
        }
        self.chain_mut(replacement).parent = old.parent;

        self.destroy_chain(this);
    }

    /// Ground truth: do `a` and `b` touch in `direction`, judged from the
    /// cached touching edges one level down. A direction of 0 means both
    /// chains are in the same node.
    pub(crate) fn base_is_touching(&self, a: ChainId, b: ChainId, direction: i8) -> bool {
        if self.is_full_chain(b) {
            debug_assert_ne!(direction, 0);
            return self.is_touching_side(a, direction);
        }
        if self.is_full_chain(a) {
            debug_assert_ne!(direction, 0);
            return self.is_touching_side(b, -direction);
        }
        let a_key = self.subchain_key(a);
        let b_key = self.subchain_key(b);
        for (a_octant, a_child) in self.subchains.iter(a_key) {
            for (b_octant, b_child) in self.subchains.iter(b_key) {
                let across = adjacent_across(a_octant as u8, b_octant as u8, direction);
                if across != 0 && self.is_touching(a_child, b_child, across) {
                    return true;
                }
            }
        }
        false
    }

    /// Cached adjacency test. A direction of 0 falls back to the ground truth.
    pub(crate) fn is_touching(&self, a: ChainId, b: ChainId, direction: i8) -> bool {
        if direction == 0 {
            self.base_is_touching(a, b, 0)
        } else {
            self.touching.contains(self.chain(a).touching, direction as i32, b)
        }
    }

    /// Whether the chain reaches the face of its node named by `side`
    pub(crate) fn is_touching_side(&self, id: ChainId, side: i8) -> bool {
        match self.chain(id).subchains {
            None => true,
            Some(key) => self.subchains.iter(key).any(|(octant, child)| {
                is_octant_on_side(octant as u8, side) && self.is_touching_side(child, side)
            }),
        }
    }

    /// Whether the chain reaches any face of its node. For a topmost chain
    /// this means reaching the boundary of the loaded region.
    pub fn is_touching_any_side(&self, id: ChainId) -> bool {
        DIRECTIONS.iter().any(|side| self.is_touching_side(id, *side))
    }

    /// Like [`base_is_touching`](Self::base_is_touching), but records every
    /// touching pair found on the way down so the cache stays complete.
    pub(crate) fn update_touching(&mut self, a: ChainId, b: ChainId, direction: i8) -> bool {
        if self.is_full_chain(b) || self.is_full_chain(a) {
            let touching = self.base_is_touching(a, b, direction);
            if touching && direction != 0 {
                self.add_touching(a, b, direction);
            }
            return touching;
        }

        let mut touching = false;
        for (a_octant, a_child) in self.subchain_list(a) {
            for (b_octant, b_child) in self.subchain_list(b) {
                let across = adjacent_across(a_octant, b_octant, direction);
                if across != 0 && self.update_touching(a_child, b_child, across) {
                    touching = true;
                }
            }
        }
        if touching && direction != 0 {
            self.add_touching(a, b, direction);
        }
        touching
    }

    /// Re-examine a chain whose subchains changed, splitting it into one
    /// chain per connected component, then do the same for each ancestor.
    ///
    /// Returns the chains that end up at the highest level reached: the
    /// topmost chain if nothing split there, otherwise the fragments.
    pub(crate) fn check_connectivity(&mut self, start: ChainId) -> Vec<ChainId> {
        let mut current = start;
        loop {
            let parent = self.chain(current).parent;
            let result = if self.is_full_chain(current) {
                vec![current]
            } else {
                self.split_components(current, parent)
            };
            match parent {
                Some(parent) => current = parent,
                None => return result,
            }
        }
    }

    /// One level of [`check_connectivity`](Self::check_connectivity)
    fn split_components(&mut self, id: ChainId, parent: Option<ChainId>) -> Vec<ChainId> {
        let mut unvisited = self.subchain_list(id);
        let total = unvisited.len();
        let mut components: Vec<Vec<(u8, ChainId)>> = Vec::new();

        while let Some(seed) = unvisited.pop() {
            let mut component = Vec::new();
            let mut stack = vec![seed];
            while let Some(current) = stack.pop() {
                component.push(current);
                let mut i = 0;
                while i < unvisited.len() {
                    let (octant, other) = unvisited[i];
                    let direction = adjacent(current.0, octant);
                    if direction != 0 && self.is_touching(current.1, other, direction) {
                        stack.push(unvisited.swap_remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            components.push(component);
        }

        if components.len() == 1 && components[0].len() == total {
            self.reset_supported(id);
            for (direction, far) in self.touching_list(id) {
                if !self.base_is_touching(id, far, direction) {
                    self.remove_touching(id, far, direction);
                }
            }
            return vec![id];
        }

        let node = self.chain(id).node;
        let old_touching = self.touching_list(id);
        let mut fragments = Vec::with_capacity(components.len());
        for component in &components {
            let fragment = self.new_composite_chain(node, component, parent);
            for &(direction, far) in &old_touching {
                if self.base_is_touching(fragment, far, direction) {
                    self.add_touching(fragment, far, direction);
                }
            }
            fragments.push(fragment);
        }

        if let Some(parent) = parent {
            let octant = self.remove_subchain(parent, id);
            for &fragment in &fragments {
                self.add_subchain(parent, octant, fragment);
            }
        }
        self.inactivate(id, false);
        let node = self.nodes.get_mut(node);
        for &fragment in &fragments {
            node.register_chain(fragment);
        }
        log::trace!("chain {:?} split into {} pieces", id, fragments.len());
        fragments
    }

    /// Destroy a chain and every descendant that still points at it, removing
    /// all their touching edges. With `remove_ancestors`, the chain is also
    /// taken out of its parent, and ancestors left without subchains are
    /// destroyed in turn.
    pub(crate) fn inactivate(&mut self, id: ChainId, remove_ancestors: bool) {
        let parent = self.chain(id).parent;

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if let Some(key) = self.chain(current).subchains {
                for (_, child) in self.subchains.iter(key) {
                    if self.chains.get(child).is_some_and(|c| c.parent == Some(current)) {
                        pending.push(child);
                    }
                }
            }
            self.destroy_chain(current);
        }

        if !remove_ancestors {
            return;
        }
        let mut child = id;
        let mut current = parent;
        while let Some(ancestor) = current {
            self.remove_subchain(ancestor, child);
            if self.subchain_count(ancestor) > 0 {
                break;
            }
            current = self.chain(ancestor).parent;
            self.destroy_chain(ancestor);
            child = ancestor;
        }
    }

    /// Unregister a single chain from its node, drop its touching edges on
    /// both sides and release its storage.
    fn destroy_chain(&mut self, id: ChainId) {
        for (direction, far) in self.touching_list(id) {
            let far_key = self.chain(far).touching;
            self.touching.remove_pair(far_key, -direction as i32, id);
        }
        let chain = self.chains.remove(id);
        self.nodes.get_mut(chain.node).unregister_chain(id);
        self.touching.free(chain.touching);
        if let Some(key) = chain.subchains {
            self.subchains.free(key);
        }
    }

    /// Absolute voxel positions covered by a chain whose node corner is at `origin`
    pub(crate) fn positions_into(&self, id: ChainId, origin: IVec3, out: &mut Vec<IVec3>) {
        let mut stack = vec![(id, origin)];
        while let Some((current, corner)) = stack.pop() {
            let size = self.chain_size(current);
            match self.chain(current).subchains {
                None => {
                    for x in 0..size {
                        for y in 0..size {
                            for z in 0..size {
                                out.push(corner + IVec3::new(x, y, z));
                            }
                        }
                    }
                }
                Some(key) => {
                    for (octant, child) in self.subchains.iter(key) {
                        stack.push((child, corner + octant_offset(octant as u8, size / 2)));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_chain() -> Chain {
        Chain {
            node: NodeId(0),
            parent: None,
            supported: false,
            subchains: None,
            touching: SetKey(0),
        }
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut arena = ChainArena::default();
        let first = arena.insert(detached_chain());
        arena.remove(first);
        let second = arena.insert(detached_chain());
        assert_eq!(second.index, first.index);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
    }

    #[test]
    fn test_generation_wraps_on_hot_slot() {
        let mut arena = ChainArena::default();
        let first = arena.insert(detached_chain());
        arena.remove(first);
        arena.slots[0].generation = u32::MAX;

        let wrapped = arena.insert(detached_chain());
        assert_eq!(wrapped.generation, 0);
        assert!(arena.get(wrapped).is_some());
        assert!(arena.get(first).is_none());
        assert_eq!(arena.len(), 1);
    }
}
