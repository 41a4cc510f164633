//! The support tree: octree, chain arena and root window

use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arena::{CheckedPairArena, PackedPairArena, PairStore};
use crate::core::{IVec3, SupportConfig};

use super::chain::{ChainArena, ChainId};
use super::grid::SolidityGrid;
use super::node::{FullKind, Node, NodeArena, NodeId, NodeKind};
use super::octant::{octant_of, octant_offset, wrap};

/// Tree whose pair arenas cross-check every access against plain vectors
pub type CheckedTree = Tree<CheckedPairArena<ChainId>>;

/// Position and extent of the root node in world coordinates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RootWindow {
    pub node: NodeId,
    pub position: IVec3,
}

/// Result of asking whether the root can collapse onto one child
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shrink {
    /// Nothing below is loaded
    NoneLoaded,
    /// Exactly one child holds loaded content
    SingleChild(u8),
    /// More than one child is loaded, or the node has no children
    Multiple,
}

/// Counters describing the current state of a tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub chains: usize,
    pub subchain_bins: usize,
    pub touching_bins: usize,
    pub root_position: Option<[i32; 3]>,
    pub root_size: Option<i32>,
    pub root_chains: usize,
}

/// One group of voxels found to be detached
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedGroup {
    /// Absolute voxel positions, in no particular order
    pub positions: Vec<IVec3>,
}

impl DetachedGroup {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Inclusive bounding box
    pub fn bounds(&self) -> Option<(IVec3, IVec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p))),
        )
    }
}

/// Incremental connectivity tracker for a loaded voxel world.
///
/// Owns every node and chain. Not thread-safe for mutation; one owner applies
/// commands in sequence.
pub struct Tree<S = PackedPairArena<ChainId>> {
    pub(crate) nodes: NodeArena,
    pub(crate) chains: ChainArena,
    pub(crate) subchains: S,
    pub(crate) touching: S,
    /// Canonical empty node per size
    empty_nodes: HashMap<i32, NodeId>,
    root: Option<RootWindow>,
    chunk_size: i32,
    root_offset: i32,
}

impl Tree {
    /// Tree backed by the packed pair arenas
    pub fn new(config: &SupportConfig) -> Self {
        Self::with_store(config)
    }
}

impl<S: PairStore<ChainId>> Tree<S> {
    /// Tree backed by any pair store
    pub fn with_store(config: &SupportConfig) -> Self {
        Self {
            nodes: NodeArena::default(),
            chains: ChainArena::default(),
            subchains: S::with_bin_width(config.subchain_bin_width),
            touching: S::with_bin_width(config.touching_bin_width),
            empty_nodes: HashMap::new(),
            root: None,
            chunk_size: config.chunk_size,
            root_offset: config.aligned_root_offset(),
        }
    }

    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    /// World position of the root corner, if anything is loaded
    pub fn root_position(&self) -> Option<IVec3> {
        self.root.map(|root| root.position)
    }

    /// Edge length of the root, if anything is loaded
    pub fn root_size(&self) -> Option<i32> {
        self.root.map(|root| self.nodes.get(root.node).size)
    }

    pub(crate) fn root_node(&self) -> Option<NodeId> {
        self.root.map(|root| root.node)
    }

    /// Chains of the root node
    pub fn root_chains(&self) -> Vec<ChainId> {
        self.root
            .map(|root| self.nodes.get(root.node).chains().to_vec())
            .unwrap_or_default()
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id)
    }

    pub(crate) fn node_chains(&self, id: NodeId) -> &[ChainId] {
        self.nodes.get(id).chains()
    }

    pub(crate) fn node_size(&self, id: NodeId) -> i32 {
        self.nodes.get(id).size
    }

    /// Canonical empty node of a size
    pub(crate) fn empty_node(&mut self, size: i32) -> NodeId {
        if let Some(id) = self.empty_nodes.get(&size) {
            return *id;
        }
        let id = self.nodes.insert(Node {
            size,
            kind: NodeKind::Empty,
        });
        self.empty_nodes.insert(size, id);
        id
    }

    /// Fresh full node with its own chain
    pub(crate) fn full_node(&mut self, size: i32, kind: FullKind) -> NodeId {
        // The chain needs the node id, so the node is created first with a
        // placeholder that is replaced straight away.
        let id = self.nodes.insert(Node {
            size,
            kind: NodeKind::Empty,
        });
        let chain = self.new_full_chain(id, kind);
        self.nodes.get_mut(id).kind = NodeKind::Full { kind, chain };
        id
    }

    /// Free a node that has been detached from the tree, together with every
    /// node below it. All their chains must already be destroyed.
    pub(crate) fn release_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = self.nodes.get(current);
            match &node.kind {
                NodeKind::Empty => continue,
                NodeKind::Full { chain, .. } => {
                    debug_assert!(!self.is_active(*chain), "releasing node with live chain");
                }
                NodeKind::Internal { children, chains } => {
                    debug_assert!(chains.is_empty(), "releasing node with live chains");
                    pending.extend_from_slice(children);
                }
            }
            self.nodes.remove(current);
        }
    }

    /// Destroy every chain of a detached subtree and free its nodes
    pub(crate) fn discard_subtree(&mut self, id: NodeId) {
        for chain in self.node_chains(id).to_vec() {
            if self.is_active(chain) {
                self.inactivate(chain, false);
            }
        }
        self.release_subtree(id);
    }

    fn contains_position(&self, root: RootWindow, pos: IVec3) -> bool {
        let size = self.nodes.get(root.node).size;
        let relative = pos - root.position;
        relative.cmpge(IVec3::ZERO).all() && relative.cmplt(IVec3::splat(size)).all()
    }

    /// Leaf node containing a world position, or `None` outside the root
    fn leaf_at(&self, pos: IVec3) -> Option<(NodeId, IVec3)> {
        let root = self.root?;
        if !self.contains_position(root, pos) {
            return None;
        }
        let mut node = root.node;
        let mut relative = pos - root.position;
        loop {
            let current = self.nodes.get(node);
            match current.children() {
                Some(children) => {
                    node = children[octant_of(relative, current.size) as usize];
                    relative = wrap(relative, current.size / 2);
                }
                None => return Some((node, relative)),
            }
        }
    }

    /// Whether a world position holds loaded, known content
    pub fn is_loaded(&self, pos: IVec3) -> bool {
        self.leaf_at(pos)
            .is_some_and(|(node, _)| !self.nodes.get(node).is_unavailable())
    }

    /// Whether a world position is a loaded solid voxel
    pub fn is_solid(&self, pos: IVec3) -> bool {
        self.leaf_at(pos)
            .is_some_and(|(node, _)| self.nodes.get(node).full_kind() == Some(FullKind::Material))
    }

    /// Topmost chain containing a world position
    pub fn chain_at(&self, pos: IVec3) -> Option<ChainId> {
        let (leaf, _) = self.leaf_at(pos)?;
        match self.nodes.get(leaf).kind {
            NodeKind::Full { chain, .. } => Some(self.topmost(chain)),
            _ => None,
        }
    }

    /// Add a solid voxel at a world position. Returns the topmost chain that
    /// now contains it, or `None` if the position is not loaded.
    pub fn add_block(&mut self, pos: IVec3) -> Option<ChainId> {
        let root = self.root?;
        if !self.is_loaded(pos) {
            log::warn!("Ignoring block added at {} outside loaded content", pos);
            return None;
        }
        let (node, chain, _) = self.insert_full_node(
            root.node,
            pos - root.position,
            1,
            FullKind::Material,
            &[],
        );
        self.set_root_node(node);
        Some(self.topmost(chain))
    }

    /// Remove a solid voxel at a world position. Returns the chains at the
    /// highest level affected by the removal.
    pub fn remove_block(&mut self, pos: IVec3) -> Vec<ChainId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        if !self.is_loaded(pos) {
            log::warn!("Ignoring block removed at {} outside loaded content", pos);
            return Vec::new();
        }
        assert!(self.is_solid(pos), "removing voxel at {} from an empty region", pos);
        let (node, chains) = self.remove_voxel(root.node, pos - root.position);
        self.set_root_node(node);
        chains
    }

    fn set_root_node(&mut self, node: NodeId) {
        if let Some(root) = self.root.as_mut() {
            root.node = node;
        }
    }

    /// Replace the unavailable placeholder at a chunk position with real
    /// content, growing the root window first if needed. Returns the chains
    /// at the highest level affected.
    pub fn load_chunk(&mut self, grid: &SolidityGrid, position: IVec3) -> Vec<ChainId> {
        assert_eq!(grid.size(), self.chunk_size, "chunk grid has the wrong size");
        assert_eq!(
            wrap(position, self.chunk_size),
            IVec3::ZERO,
            "chunk position {} is not aligned",
            position
        );

        if self.root.is_some() && self.is_loaded(position) {
            log::warn!("Chunk at {} is already loaded, ignoring", position);
            return Vec::new();
        }

        let chunk = self.build_node(grid);

        let Some(mut root) = self.root else {
            log::debug!("First chunk at {} becomes the root", position);
            self.root = Some(RootWindow {
                node: chunk,
                position,
            });
            return self.node_chains(chunk).to_vec();
        };

        while !self.contains_position(root, position) {
            let size = self.nodes.get(root.node).size * 2;
            let relative = wrap(IVec3::splat(self.root_offset).wrapping_add(root.position), size);
            root = RootWindow {
                node: self.build_expanded_node(root.node, relative, size),
                position: root.position - relative,
            };
            log::debug!("Root grown to size {} at {}", size, root.position);
        }
        self.root = Some(root);

        self.insert_new_chunk(root.node, chunk, position - root.position)
    }

    /// Replace the chunk at a position with an unavailable placeholder and
    /// shrink the root window where possible.
    pub fn unload_chunk(&mut self, position: IVec3) {
        let Some(root) = self.root else {
            log::warn!("Ignoring unload of {} with nothing loaded", position);
            return;
        };
        if !self.contains_position(root, position) || !self.is_loaded(position) {
            log::warn!("Ignoring unload of chunk {} that is not loaded", position);
            return;
        }

        let (node, _, _) = self.insert_full_node(
            root.node,
            position - root.position,
            self.chunk_size,
            FullKind::Unavailable,
            &[],
        );
        self.set_root_node(node);
        self.shrink_root();
    }

    /// Collapse the root onto its only loaded child while possible, or drop
    /// it when nothing is loaded
    fn shrink_root(&mut self) {
        while let Some(root) = self.root {
            match self.can_shrink(root.node) {
                Shrink::NoneLoaded => {
                    log::debug!("Nothing loaded, dropping root");
                    self.discard_subtree(root.node);
                    self.root = None;
                }
                Shrink::SingleChild(octant) => {
                    let old = self.nodes.get(root.node);
                    let (size, children) = match old.children() {
                        Some(children) => (old.size, *children),
                        None => return,
                    };
                    if size / 2 < self.chunk_size {
                        return;
                    }
                    let kept = children[octant as usize];
                    for chain in self.node_chains(kept).to_vec() {
                        self.chain_mut(chain).parent = None;
                    }
                    for chain in self.node_chains(root.node).to_vec() {
                        self.inactivate(chain, false);
                    }
                    for (index, child) in children.iter().enumerate() {
                        if index != octant as usize {
                            self.release_subtree(*child);
                        }
                    }
                    self.nodes.remove(root.node);

                    let position = root.position + octant_offset(octant, size / 2);
                    log::debug!("Root shrunk to size {} at {}", size / 2, position);
                    self.root = Some(RootWindow {
                        node: kept,
                        position,
                    });
                }
                Shrink::Multiple => return,
            }
        }
    }

    /// Whether a chain is a live topmost chain that is neither supported nor
    /// touching the boundary of the loaded region
    pub fn is_detached(&self, id: ChainId) -> bool {
        self.is_active(id)
            && self.chain(id).parent.is_none()
            && !self.chain(id).supported
            && !self.is_touching_any_side(id)
    }

    /// Absolute positions of the voxels in a topmost chain
    pub fn group_positions(&self, id: ChainId) -> Vec<IVec3> {
        let mut positions = Vec::new();
        if let Some(root) = self.root {
            self.positions_into(id, root.position, &mut positions);
        }
        positions
    }

    /// Walk recorded chains to their current topmost ancestors and report
    /// every distinct one that is detached. Stale handles are skipped.
    pub fn detached_groups(&self, recorded: impl IntoIterator<Item = ChainId>) -> Vec<DetachedGroup>
    where
        S: Sync,
    {
        let mut seen = HashSet::new();
        let roots: Vec<ChainId> = recorded
            .into_iter()
            .filter(|id| self.is_active(*id))
            .map(|id| self.topmost(id))
            .filter(|root| seen.insert(*root))
            .filter(|root| self.is_detached(*root))
            .collect();

        roots
            .par_iter()
            .map(|root| DetachedGroup {
                positions: self.group_positions(*root),
            })
            .collect()
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats {
            nodes: self.nodes.len(),
            chains: self.chains.len(),
            subchain_bins: self.subchains.bins_in_use(),
            touching_bins: self.touching.bins_in_use(),
            root_position: self.root_position().map(|p| p.to_array()),
            root_size: self.root_size(),
            root_chains: self.root_chains().len(),
        }
    }
}
