//! Rays, ray packets and per-lane hit records.

use smallvec::SmallVec;

use crate::config::MAX_PACKET_SIZE;
use crate::tree::INVALID;
use crate::util::{Error, Result, Vec3};

/// Inline lane storage; packets larger than this spill to the heap.
pub type LaneVec<T> = SmallVec<[T; 8]>;

/// Direction components at or below this magnitude get an infinite inverse.
const INV_DIR_EPSILON: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let inv = |d: f32| if d.abs() > INV_DIR_EPSILON { 1.0 / d } else { f32::INFINITY };
        Self {
            origin,
            direction,
            inv_direction: Vec3::new(inv(direction.x), inv(direction.y), inv(direction.z)),
        }
    }

    /// Point at parameter `t`.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Fixed batch of rays traversed together, with a per-lane active mask.
#[derive(Debug, Clone)]
pub struct RayPacket {
    rays: LaneVec<Ray>,
    mask: u64,
}

#[inline]
fn full_mask(len: usize) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

impl RayPacket {
    /// All lanes active.
    pub fn new(rays: &[Ray]) -> Result<Self> {
        Self::with_mask(rays, u64::MAX)
    }

    /// Lanes whose bit is clear in `mask` start inactive and always miss.
    pub fn with_mask(rays: &[Ray], mask: u64) -> Result<Self> {
        if rays.len() > MAX_PACKET_SIZE {
            return Err(Error::input(format!(
                "packet of {} rays exceeds {} lanes",
                rays.len(),
                MAX_PACKET_SIZE
            )));
        }
        Ok(Self {
            rays: rays.iter().copied().collect(),
            mask: mask & full_mask(rays.len()),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    #[inline]
    pub fn rays(&self) -> &[Ray] {
        &self.rays
    }

    #[inline]
    pub fn active_mask(&self) -> u64 {
        self.mask
    }
}

/// Closest hit for one lane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub distance: f32,
    /// Unit geometric normal, `(v1 - v0) x (v2 - v0)` orientation.
    pub normal: Vec3,
    /// Primitive index, [`INVALID`] on a miss.
    pub primitive: u32,
    pub hit: bool,
}

impl Hit {
    pub const MISS: Self = Self {
        distance: f32::INFINITY,
        normal: Vec3::ZERO,
        primitive: INVALID,
        hit: false,
    };

    /// Primitive index when the lane hit something.
    #[inline]
    pub fn primitive(&self) -> Option<u32> {
        self.hit.then_some(self.primitive)
    }
}

impl Default for Hit {
    fn default() -> Self {
        Self::MISS
    }
}

/// Iterate set bit positions of `mask`, lowest first.
#[inline]
pub(crate) fn lanes(mut mask: u64) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let lane = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(lane)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_direction() {
        let r = Ray::new(Vec3::ZERO, Vec3::new(0.0, 2.0, -4.0));
        assert_eq!(r.inv_direction.x, f32::INFINITY);
        assert_eq!(r.inv_direction.y, 0.5);
        assert_eq!(r.inv_direction.z, -0.25);
        assert_eq!(r.at(2.0), Vec3::new(0.0, 4.0, -8.0));
    }

    #[test]
    fn test_packet_mask() {
        let r = Ray::new(Vec3::ZERO, Vec3::Z);
        let p = RayPacket::new(&[r; 3]).unwrap();
        assert_eq!(p.active_mask(), 0b111);
        let p = RayPacket::with_mask(&[r; 3], 0b1010).unwrap();
        assert_eq!(p.active_mask(), 0b010);
        let p = RayPacket::new(&[r; 64]).unwrap();
        assert_eq!(p.active_mask(), u64::MAX);
        assert!(RayPacket::new(&[r; 65]).is_err());
    }

    #[test]
    fn test_lanes() {
        assert_eq!(lanes(0b1011).collect::<Vec<_>>(), vec![0, 1, 3]);
        assert_eq!(lanes(0).count(), 0);
        assert_eq!(lanes(1 << 63).collect::<Vec<_>>(), vec![63]);
    }
}
