//! Structural edits: inserting full regions, removing voxels, splicing in
//! loaded chunks

use crate::arena::PairStore;
use crate::core::IVec3;

use super::chain::ChainId;
use super::node::{FullKind, NodeId, NodeShape};
use super::octant::{is_octant_on_side, is_position_on_side, octant_of, step, wrap, DIRECTIONS};
use super::tree::{Shrink, Tree};

/// Result of inserting a full region into a node: the node that now stands
/// in its place, the chain containing the inserted region at that level, and
/// the chains outside the node it was found to touch.
pub(crate) type Inserted = (NodeId, ChainId, Vec<(i8, ChainId)>);

impl<S: PairStore<ChainId>> Tree<S> {
    pub(crate) fn set_child(&mut self, node: NodeId, octant: u8, child: NodeId) {
        self.nodes.get_mut(node).set_child(octant, child);
    }

    /// Insert a full cube of edge `full_size` and `kind` at `pos` (relative to
    /// `node`). `siblings` are the face-adjacent nodes of the same size the
    /// cube reaches, with the direction towards each.
    pub(crate) fn insert_full_node(
        &mut self,
        node: NodeId,
        pos: IVec3,
        full_size: i32,
        kind: FullKind,
        siblings: &[(i8, NodeId)],
    ) -> Inserted {
        let size = self.node_size(node);
        assert!(full_size <= size, "cube of size {} does not fit node of size {}", full_size, size);
        if size == full_size {
            return self.replace_with_full_node(node, kind, siblings);
        }
        let internal = match self.node(node).shape() {
            NodeShape::Empty => {
                let empty = self.empty_node(size / 2);
                self.new_internal_node(size, [empty; 8])
            }
            NodeShape::Full(..) => self.equivalent_internal_node(node),
            NodeShape::Internal(_) => node,
        };
        self.insert_into_internal(internal, pos, full_size, kind, siblings)
    }

    fn insert_into_internal(
        &mut self,
        node: NodeId,
        pos: IVec3,
        full_size: i32,
        kind: FullKind,
        siblings: &[(i8, NodeId)],
    ) -> Inserted {
        let size = self.node_size(node);
        let half = size / 2;
        let octant = octant_of(pos, size);
        let sub_pos = wrap(pos, half);
        let NodeShape::Internal(children) = self.node(node).shape() else {
            unreachable!("insert_into_internal on a leaf");
        };

        let mut next_siblings = Vec::new();
        for side in DIRECTIONS {
            if is_octant_on_side(octant, -side)
                && is_position_on_side(sub_pos, side, full_size, half)
            {
                let neighbour = children[step(octant, side) as usize];
                if !self.node(neighbour).is_empty() {
                    next_siblings.push((side, neighbour));
                }
            }
        }
        for &(side, sibling) in siblings {
            debug_assert!(is_octant_on_side(octant, side));
            if let Some(facing) = self.node(sibling).children() {
                let facing = facing[step(octant, side) as usize];
                if !self.node_chains(facing).is_empty() {
                    next_siblings.push((side, facing));
                }
            }
        }

        let (child, inserted, child_touching) = self.insert_full_node(
            children[octant as usize],
            sub_pos,
            full_size,
            kind,
            &next_siblings,
        );
        self.set_child(node, octant, child);

        if self.chain(inserted).parent.is_none() {
            let wrapper = self.new_composite_chain(node, &[(octant, inserted)], None);
            self.nodes.get_mut(node).register_chain(wrapper);
        }

        let mut next_touching = Vec::new();
        for &(side, sibling) in siblings {
            if let NodeShape::Full(_, chain) = self.node(sibling).shape() {
                next_touching.push((side, chain));
            }
        }
        for (direction, far) in child_touching {
            let far_parent = self
                .chain(far)
                .parent
                .unwrap_or_else(|| panic!("touching chain {:?} has no parent", far));
            let own = self.owning_parent(inserted);
            if far_parent == own {
                continue;
            }
            if self.chain(far_parent).node == node {
                self.merge(far_parent, own);
            } else {
                next_touching.push((direction, far_parent));
            }
        }

        let own = self.owning_parent(inserted);
        for &(direction, far) in &next_touching {
            self.add_touching(own, far, direction);
        }

        if let Some(uniform) = self.uniform_kind(node) {
            let mut outer: Vec<(i8, NodeId)> = Vec::new();
            for (direction, far) in self.touching_list(own) {
                let far_node = self.chain(far).node;
                if !outer.contains(&(direction, far_node)) {
                    outer.push((direction, far_node));
                }
            }
            return self.replace_with_full_node(node, uniform, &outer);
        }

        (node, own, next_touching)
    }

    fn owning_parent(&self, chain: ChainId) -> ChainId {
        self.chain(chain)
            .parent
            .unwrap_or_else(|| panic!("chain {:?} lost its parent", chain))
    }

    /// Kind shared by all eight children if every one is full and alike
    fn uniform_kind(&self, node: NodeId) -> Option<FullKind> {
        let children = self.node(node).children()?;
        let first = self.node(children[0]).full_kind()?;
        children[1..]
            .iter()
            .all(|child| self.node(*child).full_kind() == Some(first))
            .then_some(first)
    }

    /// Swap a node for a fresh full node of the same size. The old node's
    /// chains are merged into one and retired, its subtree freed, and the new
    /// chain is linked to whatever it touches in `siblings`.
    pub(crate) fn replace_with_full_node(
        &mut self,
        old: NodeId,
        kind: FullKind,
        siblings: &[(i8, NodeId)],
    ) -> Inserted {
        let size = self.node_size(old);
        let old_chains = self.node_chains(old).to_vec();
        if let Some((&first, rest)) = old_chains.split_first() {
            for &other in rest {
                self.merge(first, other);
            }
            self.inactivate(first, true);
        }
        if !self.node(old).is_empty() {
            self.release_subtree(old);
        }

        let node = self.full_node(size, kind);
        let NodeShape::Full(_, chain) = self.node(node).shape() else {
            unreachable!("full_node built a non-full node");
        };
        let mut next_touching = Vec::new();
        for &(direction, sibling) in siblings {
            for far in self.node_chains(sibling).to_vec() {
                if self.update_touching(chain, far, direction) {
                    next_touching.push((direction, far));
                }
            }
        }
        (node, chain, next_touching)
    }

    /// Split a full node into an internal node of eight full children with
    /// the same content. The old chain's place in its parent and its touching
    /// edges pass to the single chain of the new node.
    pub(crate) fn equivalent_internal_node(&mut self, full: NodeId) -> NodeId {
        let size = self.node_size(full);
        let NodeShape::Full(kind, old_chain) = self.node(full).shape() else {
            panic!("node {:?} is not full", full);
        };
        let children: [NodeId; 8] = std::array::from_fn(|_| self.full_node(size / 2, kind));
        let internal = self.new_internal_node(size, children);
        let replacement = self.node_chains(internal)[0];

        for (direction, far) in self.touching_list(old_chain) {
            for (octant, far_child) in self.subchain_list(far) {
                if is_octant_on_side(octant, -direction)
                    && self.is_touching_side(far_child, -direction)
                {
                    let near = self.node_chains(children[step(octant, direction) as usize])[0];
                    self.add_touching(far_child, near, -direction);
                }
            }
        }
        self.replace_with(old_chain, replacement);
        self.nodes.remove(full);
        internal
    }

    /// Remove the single voxel at `pos` (relative to `node`). Returns the node
    /// that now stands in its place and the chains at the highest level the
    /// change reached.
    pub(crate) fn remove_voxel(&mut self, node: NodeId, pos: IVec3) -> (NodeId, Vec<ChainId>) {
        let size = self.node_size(node);
        match self.node(node).shape() {
            NodeShape::Empty => panic!("removing voxel at relative {} from an empty region", pos),
            NodeShape::Full(FullKind::Unavailable, _) => {
                panic!("removing voxel at relative {} from an unavailable region", pos)
            }
            NodeShape::Full(FullKind::Material, chain) if size == 1 => {
                let affected = match self.chain(chain).parent {
                    Some(parent) => {
                        self.remove_subchain(parent, chain);
                        self.inactivate(chain, false);
                        self.check_connectivity(parent)
                    }
                    None => {
                        self.inactivate(chain, false);
                        Vec::new()
                    }
                };
                self.nodes.remove(node);
                (self.empty_node(1), affected)
            }
            NodeShape::Full(FullKind::Material, _) => {
                let internal = self.equivalent_internal_node(node);
                self.remove_voxel(internal, pos)
            }
            NodeShape::Internal(children) => {
                let octant = octant_of(pos, size);
                let (child, affected) =
                    self.remove_voxel(children[octant as usize], wrap(pos, size / 2));
                self.set_child(node, octant, child);
                if self.node_chains(node).is_empty() {
                    self.release_subtree(node);
                    return (self.empty_node(size), affected);
                }
                (node, affected)
            }
        }
    }

    /// Splice a freshly built chunk into the unavailable placeholder covering
    /// `pos` (relative to `node`). Returns the chains at the highest level the
    /// change reached.
    pub(crate) fn insert_new_chunk(
        &mut self,
        node: NodeId,
        chunk: NodeId,
        pos: IVec3,
    ) -> Vec<ChainId> {
        let size = self.node_size(node);
        let chunk_size = self.node_size(chunk);
        let NodeShape::Internal(children) = self.node(node).shape() else {
            panic!("chunk at {} inserted into an already loaded region", pos);
        };
        if chunk_size >= size {
            log::warn!("Chunk at {} is already loaded, discarding", pos);
            self.discard_subtree(chunk);
            return Vec::new();
        }

        let octant = octant_of(pos, size);
        let half = size / 2;
        let sub_pos = wrap(pos, half);
        let old_child = children[octant as usize];
        let NodeShape::Full(FullKind::Unavailable, placeholder) = self.node(old_child).shape()
        else {
            return self.insert_new_chunk(old_child, chunk, sub_pos);
        };

        let expanded = self.build_expanded_node(chunk, sub_pos, half);
        self.set_child(node, octant, expanded);

        let parent = self.owning_parent(placeholder);
        self.remove_subchain(parent, placeholder);
        let edges = self.touching_list(placeholder);
        for loaded in self.node_chains(expanded).to_vec() {
            self.chain_mut(loaded).parent = Some(parent);
            self.add_subchain(parent, octant, loaded);
            for &(direction, far) in &edges {
                self.update_touching(loaded, far, direction);
            }
        }
        self.inactivate(placeholder, false);
        self.nodes.remove(old_child);
        self.check_connectivity(parent)
    }

    /// How far the subtree at `node` could collapse
    pub(crate) fn can_shrink(&self, node: NodeId) -> Shrink {
        match self.node(node).shape() {
            NodeShape::Full(FullKind::Unavailable, _) => Shrink::NoneLoaded,
            NodeShape::Internal(children) => {
                let mut loaded = (0..8u8)
                    .filter(|octant| !self.node(children[*octant as usize]).is_unavailable());
                match (loaded.next(), loaded.next()) {
                    (None, _) => Shrink::NoneLoaded,
                    (Some(octant), None) => Shrink::SingleChild(octant),
                    _ => Shrink::Multiple,
                }
            }
            _ => Shrink::Multiple,
        }
    }
}
