//! Deciding whether a detached group actually falls

use serde::{Deserialize, Serialize};

use crate::core::IVec3;
use crate::octree::DetachedGroup;

/// Per-voxel physical properties supplied by the host
pub trait BlockProperties {
    /// Mass of the block at a position
    fn mass(&self, pos: IVec3) -> f32;

    /// Levitation strength of the block at a position, if it levitates.
    /// A strength of zero holds up any mass.
    fn levitation(&self, pos: IVec3) -> Option<f32>;
}

/// Totals for one detached group
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupAssessment {
    pub mass: f32,
    /// Summed levitation strength; infinite if any block levitates unconditionally
    pub levitation: f32,
}

impl GroupAssessment {
    /// The group falls when its levitation cannot carry its mass
    pub fn falls(&self) -> bool {
        self.levitation < self.mass
    }
}

/// Sum mass and levitation over every block of a group
pub fn assess_group(group: &DetachedGroup, properties: &impl BlockProperties) -> GroupAssessment {
    let mut mass = 0.0;
    let mut levitation = 0.0;
    for pos in &group.positions {
        mass += properties.mass(*pos);
        match properties.levitation(*pos) {
            Some(strength) if strength == 0.0 => levitation = f32::INFINITY,
            Some(strength) => levitation += strength,
            None => {}
        }
    }
    log::debug!(
        "Group of {} blocks: mass {}, levitation {}",
        group.len(),
        mass,
        levitation
    );
    GroupAssessment { mass, levitation }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uniform {
        mass: f32,
        levitating: Option<(IVec3, f32)>,
    }

    impl BlockProperties for Uniform {
        fn mass(&self, _pos: IVec3) -> f32 {
            self.mass
        }

        fn levitation(&self, pos: IVec3) -> Option<f32> {
            self.levitating
                .filter(|(at, _)| *at == pos)
                .map(|(_, strength)| strength)
        }
    }

    fn group(n: i32) -> DetachedGroup {
        DetachedGroup {
            positions: (0..n).map(|x| IVec3::new(x, 0, 0)).collect(),
        }
    }

    #[test]
    fn test_plain_group_falls() {
        let props = Uniform {
            mass: 2.0,
            levitating: None,
        };
        let result = assess_group(&group(3), &props);
        assert_eq!(result.mass, 6.0);
        assert_eq!(result.levitation, 0.0);
        assert!(result.falls());
    }

    #[test]
    fn test_enough_levitation_holds() {
        let props = Uniform {
            mass: 1.0,
            levitating: Some((IVec3::ZERO, 3.0)),
        };
        assert!(!assess_group(&group(3), &props).falls());
        assert!(assess_group(&group(4), &props).falls());
    }

    #[test]
    fn test_zero_strength_is_unlimited() {
        let props = Uniform {
            mass: 1000.0,
            levitating: Some((IVec3::new(1, 0, 0), 0.0)),
        };
        let result = assess_group(&group(5), &props);
        assert!(result.levitation.is_infinite());
        assert!(!result.falls());
    }
}
