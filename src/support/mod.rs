//! Driving the tree from a stream of world changes
//!
//! [`Update`]s describe structural changes, the worker applies them in order
//! and reports detached groups, and [`assess_group`] lets a host decide
//! whether a detached group really falls.

pub mod update;
pub mod worker;
pub mod levitation;

pub use levitation::{assess_group, BlockProperties, GroupAssessment};
pub use update::Update;
pub use worker::{ChainReport, SupportClient, SupportEvent, SupportHandle};
