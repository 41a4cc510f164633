//! Connectivity octree
//!
//! The loaded world is a single octree. Leaves are empty, fully solid, or
//! unavailable (not streamed in, treated as solid ground). Every node keeps
//! its solid voxels partitioned into chains, and chains of neighbouring
//! nodes cache which of them touch, so a local edit only revisits the nodes
//! on the path from the edited voxel to the root.

pub mod octant;
pub mod grid;
pub mod node;
pub mod chain;
pub mod tree;
mod build;
mod edit;
mod validate;


pub use chain::ChainId;
pub use grid::SolidityGrid;
pub use node::{FullKind, NodeId};
pub use tree::{CheckedTree, DetachedGroup, Shrink, Tree, TreeStats};
