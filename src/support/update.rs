//! Structural updates queued for the worker

use crate::arena::PairStore;
use crate::core::IVec3;
use crate::octree::{ChainId, SolidityGrid, Tree};

/// One structural change to the loaded world
#[derive(Debug, Clone)]
pub enum Update {
    /// A solid block appeared
    AddBlock(IVec3),
    /// A solid block was removed
    RemoveBlock(IVec3),
    /// A chunk finished loading
    LoadChunk { position: IVec3, grid: SolidityGrid },
    /// A chunk is about to be unloaded
    UnloadChunk(IVec3),
}

impl Update {
    /// Apply the update and return the chains worth checking for detachment
    pub fn apply<S: PairStore<ChainId>>(&self, tree: &mut Tree<S>) -> Vec<ChainId> {
        log::trace!("Applying {:?}", self.kind());
        match self {
            Update::AddBlock(pos) => tree.add_block(*pos).into_iter().collect(),
            Update::RemoveBlock(pos) => tree.remove_block(*pos),
            Update::LoadChunk { position, grid } => tree.load_chunk(grid, *position),
            Update::UnloadChunk(position) => {
                tree.unload_chunk(*position);
                Vec::new()
            }
        }
    }

    /// Short description without the grid payload
    pub fn kind(&self) -> String {
        match self {
            Update::AddBlock(pos) => format!("add {}", pos),
            Update::RemoveBlock(pos) => format!("remove {}", pos),
            Update::LoadChunk { position, grid } => {
                format!("load {} ({} solid)", position, grid.solid_count())
            }
            Update::UnloadChunk(position) => format!("unload {}", position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SupportConfig;

    #[test]
    fn test_apply_sequence() {
        let mut tree = Tree::new(&SupportConfig::with_chunk_size(4));
        let grid = SolidityGrid::from_fn(4, |p| p.y == 0);
        let loaded = Update::LoadChunk {
            position: IVec3::ZERO,
            grid,
        }
        .apply(&mut tree);
        assert_eq!(loaded.len(), 1);

        let added = Update::AddBlock(IVec3::new(1, 1, 1)).apply(&mut tree);
        assert_eq!(added, loaded.iter().map(|c| tree.topmost(*c)).collect::<Vec<_>>());

        let removed = Update::RemoveBlock(IVec3::new(1, 0, 1)).apply(&mut tree);
        assert!(!removed.is_empty());
        tree.validate().unwrap();

        assert!(Update::UnloadChunk(IVec3::ZERO).apply(&mut tree).is_empty());
        assert_eq!(tree.root_size(), None);
    }

    #[test]
    fn test_kind_omits_grid() {
        let update = Update::LoadChunk {
            position: IVec3::new(4, 0, 0),
            grid: SolidityGrid::filled(2, true),
        };
        assert_eq!(update.kind(), "load [4, 0, 0] (8 solid)");
    }
}
