//! Solidity snapshot of one chunk

use crate::core::IVec3;

/// Which voxels of a cubic chunk are solid, indexed `(x * size + y) * size + z`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidityGrid {
    size: i32,
    cells: Vec<bool>,
}

impl SolidityGrid {
    /// All-air grid
    pub fn empty(size: i32) -> Self {
        Self::filled(size, false)
    }

    /// Grid with every cell set to `solid`
    pub fn filled(size: i32, solid: bool) -> Self {
        assert!(
            size > 0 && size.count_ones() == 1,
            "grid size must be a power of two, got {}",
            size
        );
        Self {
            size,
            cells: vec![solid; (size * size * size) as usize],
        }
    }

    /// Grid whose cells are produced by `solid(local_position)`
    pub fn from_fn(size: i32, mut solid: impl FnMut(IVec3) -> bool) -> Self {
        let mut grid = Self::empty(size);
        for x in 0..size {
            for y in 0..size {
                for z in 0..size {
                    let pos = IVec3::new(x, y, z);
                    if solid(pos) {
                        grid.set(pos, true);
                    }
                }
            }
        }
        grid
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    fn index(&self, pos: IVec3) -> usize {
        assert!(
            pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(self.size)).all(),
            "position {} outside grid of size {}",
            pos,
            self.size
        );
        ((pos.x * self.size + pos.y) * self.size + pos.z) as usize
    }

    pub fn get(&self, pos: IVec3) -> bool {
        self.cells[self.index(pos)]
    }

    pub fn set(&mut self, pos: IVec3, solid: bool) {
        let index = self.index(pos);
        self.cells[index] = solid;
    }

    /// Number of solid cells
    pub fn solid_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}
