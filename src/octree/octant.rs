//! Octant and direction arithmetic
//!
//! An octant is a 3-bit code: bit 4 = far half on x, bit 2 = far half on y,
//! bit 1 = far half on z. A direction is one of ±4, ±2, ±1, naming the axis by
//! the same bit and the sign by the half it points to. Moving from an octant
//! one step in a direction that stays inside the parent is plain addition.

use crate::core::IVec3;

/// The six face directions
pub const DIRECTIONS: [i8; 6] = [-4, -2, -1, 1, 2, 4];

/// Whether `octant` lies on the face of its parent named by `side`
#[inline]
pub fn is_octant_on_side(octant: u8, side: i8) -> bool {
    if side > 0 {
        octant & side as u8 != 0
    } else {
        octant & (-side) as u8 == 0
    }
}

/// Direction from `from` to `to` if the two octants share a face, else 0
#[inline]
pub fn adjacent(from: u8, to: u8) -> i8 {
    if (from ^ to).count_ones() == 1 {
        to as i8 - from as i8
    } else {
        0
    }
}

/// Direction in which octant `from` of one node touches octant `to` of the
/// node next to it in `direction`; 0 if they do not share a face.
///
/// A `direction` of 0 means both octants belong to the same node.
#[inline]
pub fn adjacent_across(from: u8, to: u8, direction: i8) -> i8 {
    if direction == 0 {
        adjacent(from, to)
    } else if is_octant_on_side(from, direction)
        && is_octant_on_side(to, -direction)
        && from as i8 - direction == to as i8
    {
        direction
    } else {
        0
    }
}

/// Octant reached by stepping from `octant` in `direction` and wrapping
/// around the parent. Inside the parent this is the neighbouring octant;
/// across the boundary it is the mirrored octant of the next node.
#[inline]
pub fn step(octant: u8, direction: i8) -> u8 {
    octant ^ direction.unsigned_abs()
}

/// Octant of a node of edge `size` that contains `pos` (relative to the node)
#[inline]
pub fn octant_of(pos: IVec3, size: i32) -> u8 {
    let half = size / 2;
    let mut octant = 0;
    if pos.x >= half {
        octant |= 4;
    }
    if pos.y >= half {
        octant |= 2;
    }
    if pos.z >= half {
        octant |= 1;
    }
    octant
}

/// Offset of an octant's corner inside a node whose children have edge `child_size`
#[inline]
pub fn octant_offset(octant: u8, child_size: i32) -> IVec3 {
    IVec3::new(
        if octant & 4 != 0 { child_size } else { 0 },
        if octant & 2 != 0 { child_size } else { 0 },
        if octant & 1 != 0 { child_size } else { 0 },
    )
}

/// Component-wise Euclidean remainder
#[inline]
pub fn wrap(pos: IVec3, size: i32) -> IVec3 {
    IVec3::new(pos.x.rem_euclid(size), pos.y.rem_euclid(size), pos.z.rem_euclid(size))
}

/// Whether a cube of edge `inner` at `pos` reaches the face named by `side`
/// of the enclosing cube of edge `size`
#[inline]
pub fn is_position_on_side(pos: IVec3, side: i8, inner: i32, size: i32) -> bool {
    let coord = match side.abs() {
        4 => pos.x,
        2 => pos.y,
        1 => pos.z,
        _ => panic!("invalid direction {}", side),
    };
    if side > 0 {
        coord + inner == size
    } else {
        coord == 0
    }
}

/// Unit vector of a direction
#[inline]
pub fn direction_vector(direction: i8) -> IVec3 {
    let sign = direction.signum() as i32;
    match direction.abs() {
        4 => IVec3::new(sign, 0, 0),
        2 => IVec3::new(0, sign, 0),
        1 => IVec3::new(0, 0, sign),
        _ => panic!("invalid direction {}", direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octant_on_side() {
        assert!(is_octant_on_side(4, 4));
        assert!(!is_octant_on_side(4, -4));
        assert!(is_octant_on_side(0, -1));
        assert!(is_octant_on_side(7, 1));
        assert!(!is_octant_on_side(6, 1));
    }

    #[test]
    fn test_adjacent() {
        assert_eq!(adjacent(0, 4), 4);
        assert_eq!(adjacent(4, 0), -4);
        assert_eq!(adjacent(3, 1), -2);
        assert_eq!(adjacent(0, 3), 0);
        assert_eq!(adjacent(5, 5), 0);
    }

    #[test]
    fn test_adjacent_across() {
        // Octant 4 (+x half) of one node touches octant 0 of the node at +x.
        assert_eq!(adjacent_across(4, 0, 4), 4);
        assert_eq!(adjacent_across(0, 4, -4), -4);
        assert_eq!(adjacent_across(4, 1, 4), 0);
        assert_eq!(adjacent_across(0, 4, 4), 0);
        assert_eq!(adjacent_across(2, 6, 0), 4);
    }

    #[test]
    fn test_step_wraps_across_boundary() {
        assert_eq!(step(0, 4), 4);
        assert_eq!(step(4, 4), 0);
        assert_eq!(step(3, -2), 1);
    }

    #[test]
    fn test_octant_of_and_offset() {
        let size = 8;
        for octant in 0..8u8 {
            let corner = octant_offset(octant, size / 2);
            assert_eq!(octant_of(corner, size), octant);
            assert_eq!(octant_of(corner + IVec3::splat(3), size), octant);
        }
    }

    #[test]
    fn test_wrap_negative() {
        assert_eq!(wrap(IVec3::new(-1, 33, 0), 32), IVec3::new(31, 1, 0));
    }

    #[test]
    fn test_position_on_side() {
        assert!(is_position_on_side(IVec3::new(0, 3, 3), -4, 1, 4));
        assert!(is_position_on_side(IVec3::new(3, 0, 0), 4, 1, 4));
        assert!(!is_position_on_side(IVec3::new(2, 0, 0), 4, 1, 4));
        assert!(is_position_on_side(IVec3::new(2, 0, 0), 4, 2, 4));
    }
}
