//! Keystone - incremental connectivity tracking for voxel worlds
//!
//! Keeps every loaded solid voxel grouped into connected components inside
//! an octree and finds the groups that lose contact with the ground after an
//! edit, without re-scanning the world.

pub mod core;
pub mod arena;
pub mod octree;
pub mod support;
pub mod debug;
