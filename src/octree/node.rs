//! Region nodes of the support octree

use serde::{Deserialize, Serialize};

use crate::arena::SlotAllocator;
use super::chain::ChainId;

/// Handle to a node in a [`Tree`](super::Tree)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// What a uniformly solid region is made of
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FullKind {
    /// Ordinary solid voxels
    Material,
    /// Contents not streamed in. Always solid and always supported.
    Unavailable,
}

impl FullKind {
    /// Whether chains of this kind count as ground
    pub fn is_supported(self) -> bool {
        matches!(self, FullKind::Unavailable)
    }
}

/// Shape of a region
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    /// No solid voxels
    Empty,
    /// Every voxel solid, one chain spanning the region
    Full { kind: FullKind, chain: ChainId },
    /// Mixed content split into eight children of half the size
    Internal {
        children: [NodeId; 8],
        chains: Vec<ChainId>,
    },
}

/// Copyable summary of a node's kind, for matching without holding a borrow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeShape {
    Empty,
    Full(FullKind, ChainId),
    Internal([NodeId; 8]),
}

/// A cube of edge `size` and its content
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub size: i32,
    pub kind: NodeKind,
}

impl Node {
    pub fn shape(&self) -> NodeShape {
        match &self.kind {
            NodeKind::Empty => NodeShape::Empty,
            NodeKind::Full { kind, chain } => NodeShape::Full(*kind, *chain),
            NodeKind::Internal { children, .. } => NodeShape::Internal(*children),
        }
    }

    /// Chains partitioning the node's solid voxels
    pub fn chains(&self) -> &[ChainId] {
        match &self.kind {
            NodeKind::Empty => &[],
            NodeKind::Full { chain, .. } => std::slice::from_ref(chain),
            NodeKind::Internal { chains, .. } => chains,
        }
    }

    pub fn full_kind(&self) -> Option<FullKind> {
        match self.kind {
            NodeKind::Full { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, NodeKind::Empty)
    }

    pub fn is_unavailable(&self) -> bool {
        self.full_kind() == Some(FullKind::Unavailable)
    }

    pub fn children(&self) -> Option<&[NodeId; 8]> {
        match &self.kind {
            NodeKind::Internal { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Point one octant of an internal node at a new child
    pub fn set_child(&mut self, octant: u8, child: NodeId) {
        match &mut self.kind {
            NodeKind::Internal { children, .. } => children[octant as usize] = child,
            other => panic!("cannot set child of {:?} node", other),
        }
    }

    /// Register a chain with an internal node
    pub fn register_chain(&mut self, chain: ChainId) {
        match &mut self.kind {
            NodeKind::Internal { chains, .. } => chains.push(chain),
            other => panic!("cannot register chain {:?} with {:?} node", chain, other),
        }
    }

    /// Forget a chain. Full nodes are discarded together with their chain,
    /// so only internal nodes keep a list to update.
    pub fn unregister_chain(&mut self, chain: ChainId) {
        if let NodeKind::Internal { chains, .. } = &mut self.kind {
            if let Some(index) = chains.iter().position(|c| *c == chain) {
                chains.swap_remove(index);
            }
        }
    }
}

/// Slot-allocated node storage
#[derive(Debug, Default)]
pub(crate) struct NodeArena {
    slots: Vec<Option<Node>>,
    ids: SlotAllocator,
}

impl NodeArena {
    pub fn insert(&mut self, node: Node) -> NodeId {
        let index = self.ids.acquire();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(node);
        NodeId(index as u32)
    }

    pub fn remove(&mut self, id: NodeId) -> Node {
        let node = self.slots[id.0 as usize]
            .take()
            .unwrap_or_else(|| panic!("node {:?} removed twice", id));
        self.ids.release(id.0 as usize);
        node
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.slots
            .get(id.0 as usize)
            .and_then(|slot| slot.as_ref())
            .unwrap_or_else(|| panic!("dangling node {:?}", id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .unwrap_or_else(|| panic!("dangling node {:?}", id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
