//! Morton (Z-order) keys from triangle centroids.

use bytemuck::{Pod, Zeroable};
use rayon::prelude::*;

use crate::geometry::Triangle;
use crate::util::{Aabb, Vec3};

/// Bits per axis.
pub const MORTON_BITS: u32 = 10;

/// Quantization grid resolution per axis.
const MORTON_SCALE: f32 = (1u32 << MORTON_BITS) as f32;

/// Axis extents below this are floored so coincident centroids do not divide by zero.
pub const MIN_EXTENT: f32 = 1e-6;

/// Sort key: 30-bit interleaved code, then primitive index.
///
/// Field order makes the derived `Ord` compare `(code, index)`, a strict
/// total order as long as indices are unique.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Pod, Zeroable)]
pub struct MortonKey {
    pub code: u32,
    pub index: u32,
}

impl MortonKey {
    /// Code and index concatenated; strictly increasing over sorted keys.
    #[inline]
    pub fn extended(&self) -> u64 {
        ((self.code as u64) << 32) | self.index as u64
    }
}

/// Spread the low 10 bits of `v` so there are two zero bits between each.
#[inline]
pub fn expand_bits(v: u32) -> u32 {
    let mut x = v & 0x3FF;
    x = (x | (x << 16)) & 0x0300_00FF;
    // x = ---- --98 ---- ---- ---- ---- 7654 3210
    x = (x | (x << 8)) & 0x0300_F00F;
    // x = ---- --98 ---- ---- 7654 ---- ---- 3210
    x = (x | (x << 4)) & 0x030C_30C3;
    // x = ---- --98 ---- 76-- --54 ---- 32-- --10
    x = (x | (x << 2)) & 0x0924_9249;
    // x = ---- 9--8 --7- -6-- 5--4 --3- -2-- 1--0
    x
}

/// Interleave three 10-bit coordinates as `x2 y1 z0` per bit triple.
#[inline]
pub fn morton3(x: u32, y: u32, z: u32) -> u32 {
    (expand_bits(x) << 2) | (expand_bits(y) << 1) | expand_bits(z)
}

/// Quantize a point normalized to `[0,1]` onto the 10-bit grid.
#[inline]
fn quantize(unit: Vec3) -> [u32; 3] {
    let q = (unit.clamp(Vec3::ZERO, Vec3::ONE) * MORTON_SCALE).min(Vec3::splat(MORTON_SCALE - 1.0));
    // NaN casts to 0
    [q.x as u32, q.y as u32, q.z as u32]
}

/// Bounds of all triangle centroids.
pub fn centroid_bounds(triangles: &[Triangle]) -> Aabb {
    triangles
        .par_iter()
        .fold(
            || Aabb::EMPTY,
            |mut b, t| {
                b.expand_by_point(t.centroid());
                b
            },
        )
        .reduce(|| Aabb::EMPTY, |a, b| a.union(&b))
}

/// Morton code of `p` within `bounds`.
#[inline]
pub fn morton_code(p: Vec3, bounds: &Aabb) -> u32 {
    let extent = bounds.size().max(Vec3::splat(MIN_EXTENT));
    let [x, y, z] = quantize((p - bounds.min) / extent);
    morton3(x, y, z)
}

/// Compute one key per triangle into `keys`, reusing its allocation.
#[tracing::instrument(skip_all, fields(tri_count = triangles.len()))]
pub fn generate_keys_into(triangles: &[Triangle], keys: &mut Vec<MortonKey>) {
    let bounds = centroid_bounds(triangles);
    // An all-NaN scene leaves the bounds empty; quantize everything to the origin
    let bounds = if bounds.is_empty() {
        Aabb::from_point(Vec3::ZERO)
    } else {
        bounds
    };
    tracing::debug!(?bounds, "centroid bounds");

    triangles
        .par_iter()
        .enumerate()
        .map(|(i, t)| MortonKey {
            code: morton_code(t.centroid(), &bounds),
            index: i as u32,
        })
        .collect_into_vec(keys);
}

/// Compute one key per triangle.
pub fn generate_keys(triangles: &[Triangle]) -> Vec<MortonKey> {
    let mut keys = Vec::with_capacity(triangles.len());
    generate_keys_into(triangles, &mut keys);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_bits() {
        assert_eq!(expand_bits(0), 0);
        assert_eq!(expand_bits(1), 1);
        assert_eq!(expand_bits(0b11), 0b1001);
        assert_eq!(expand_bits(0x3FF), 0x0924_9249);
        // Bits above the low 10 are ignored
        assert_eq!(expand_bits(0x400), 0);
    }

    #[test]
    fn test_morton3_interleave() {
        assert_eq!(morton3(1, 0, 0), 0b100);
        assert_eq!(morton3(0, 1, 0), 0b010);
        assert_eq!(morton3(0, 0, 1), 0b001);
        assert_eq!(morton3(1023, 1023, 1023), (1 << 30) - 1);
    }

    #[test]
    fn test_code_range() {
        let b = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(morton_code(Vec3::ZERO, &b), 0);
        assert_eq!(morton_code(Vec3::ONE, &b), (1 << 30) - 1);
        // Outside points clamp to the grid
        assert_eq!(morton_code(Vec3::splat(5.0), &b), (1 << 30) - 1);
    }

    #[test]
    fn test_degenerate_scene() {
        // All centroids coincide: extent floored, every key is 0
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        let keys = generate_keys(&[t; 5]);
        assert_eq!(keys.len(), 5);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(k.code, 0);
            assert_eq!(k.index, i as u32);
        }
    }

    #[test]
    fn test_nan_vertices() {
        let nan = Triangle::new(Vec3::splat(f32::NAN), Vec3::splat(f32::NAN), Vec3::splat(f32::NAN));
        let ok = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        let keys = generate_keys(&[nan, ok]);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].code, 0);
    }

    #[test]
    fn test_key_order() {
        let a = MortonKey { code: 1, index: 9 };
        let b = MortonKey { code: 2, index: 0 };
        let c = MortonKey { code: 2, index: 1 };
        assert!(a < b && b < c);
        assert!(a.extended() < b.extended() && b.extended() < c.extended());
    }
}
