//! Building nodes from scratch: internal nodes from children, chunk subtrees
//! from solidity grids, and root expansion

use crate::arena::PairStore;
use crate::core::IVec3;

use super::chain::ChainId;
use super::grid::SolidityGrid;
use super::node::{FullKind, Node, NodeId, NodeKind};
use super::octant::{adjacent, octant_of, octant_offset, wrap};
use super::tree::Tree;

impl<S: PairStore<ChainId>> Tree<S> {
    /// Create an internal node over `children`, grouping the children's
    /// chains into one composite chain per connected component. Touching
    /// edges between the children are recorded on the way.
    pub(crate) fn new_internal_node(&mut self, size: i32, children: [NodeId; 8]) -> NodeId {
        let id = self.nodes.insert(Node {
            size,
            kind: NodeKind::Internal {
                children,
                chains: Vec::new(),
            },
        });

        let mut remaining: Vec<(u8, ChainId)> = Vec::new();
        for (octant, child) in children.iter().enumerate() {
            for chain in self.node_chains(*child) {
                remaining.push((octant as u8, *chain));
            }
        }

        while let Some(seed) = remaining.pop() {
            let mut component = vec![seed];
            let mut frontier = vec![seed];
            while let Some((octant, chain)) = frontier.pop() {
                let mut i = 0;
                while i < remaining.len() {
                    let (other_octant, other) = remaining[i];
                    let direction = adjacent(octant, other_octant);
                    if direction != 0 && self.update_touching(chain, other, direction) {
                        let joined = remaining.swap_remove(i);
                        component.push(joined);
                        frontier.push(joined);
                    } else {
                        i += 1;
                    }
                }
            }
            // Pairs inside one component that were never compared directly
            // still need their edges cached.
            for (a, &(a_octant, a_chain)) in component.iter().enumerate() {
                for &(b_octant, b_chain) in &component[a + 1..] {
                    let direction = adjacent(a_octant, b_octant);
                    if direction != 0 && !self.is_touching(a_chain, b_chain, direction) {
                        self.update_touching(a_chain, b_chain, direction);
                    }
                }
            }
            let chain = self.new_composite_chain(id, &component, None);
            self.nodes.get_mut(id).register_chain(chain);
        }
        id
    }

    /// Build the subtree for one chunk
    pub(crate) fn build_node(&mut self, grid: &SolidityGrid) -> NodeId {
        self.build_region(grid, grid.size(), IVec3::ZERO)
    }

    fn build_region(&mut self, grid: &SolidityGrid, size: i32, corner: IVec3) -> NodeId {
        if size == 1 {
            return if grid.get(corner) {
                self.full_node(1, FullKind::Material)
            } else {
                self.empty_node(1)
            };
        }

        let half = size / 2;
        let children: [NodeId; 8] =
            std::array::from_fn(|octant| {
                self.build_region(grid, half, corner + octant_offset(octant as u8, half))
            });

        if children.iter().all(|child| self.node(*child).is_empty()) {
            return self.empty_node(size);
        }
        if children
            .iter()
            .all(|child| self.node(*child).full_kind() == Some(FullKind::Material))
        {
            for child in children {
                self.discard_subtree(child);
            }
            return self.full_node(size, FullKind::Material);
        }
        self.new_internal_node(size, children)
    }

    /// Wrap `old` in internal nodes until it sits at `pos` inside a node of
    /// edge `size`. Every other region of the new nodes is unavailable.
    pub(crate) fn build_expanded_node(&mut self, old: NodeId, pos: IVec3, size: i32) -> NodeId {
        let old_size = self.node_size(old);
        if old_size == size {
            return old;
        }
        let half = size / 2;
        let inner = if old_size < half {
            self.build_expanded_node(old, wrap(pos, half), half)
        } else {
            old
        };
        let octant = octant_of(pos, size) as usize;
        let children: [NodeId; 8] = std::array::from_fn(|index| {
            if index == octant {
                inner
            } else {
                self.full_node(half, FullKind::Unavailable)
            }
        });
        self.new_internal_node(size, children)
    }
}
