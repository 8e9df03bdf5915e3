//! Half-precision bounding boxes with conservative rounding.
//!
//! Bounds are stored as six `f16` values packed into three `u32` words,
//! the same layout WGSL `pack2x16float` produces:
//!
//! ```text
//! word0 = min.x (lo) | min.y (hi)
//! word1 = min.z (lo) | max.x (hi)
//! word2 = max.y (lo) | max.z (hi)
//! ```
//!
//! Conversion from `f32` rounds minimums toward -inf and maximums toward
//! +inf, so the packed box always contains the source box. The directed
//! rounding is done on raw bit patterns (next-up / next-down) on top of
//! `half`'s round-to-nearest conversion.

use bytemuck::{Pod, Zeroable};
use half::f16;

use super::math::{Aabb, Vec3};

const SIGN_MASK: u16 = 0x8000;
const EXP_MASK: u16 = 0x7C00;
const MANT_MASK: u16 = 0x03FF;

#[inline]
fn is_nan_bits(bits: u16) -> bool {
    bits & EXP_MASK == EXP_MASK && bits & MANT_MASK != 0
}

/// Smallest `f16` strictly greater than `bits` (identity on NaN and +inf).
#[inline]
pub fn f16_next_up(bits: u16) -> u16 {
    if is_nan_bits(bits) || bits == EXP_MASK {
        return bits;
    }
    if bits & !SIGN_MASK == 0 {
        // +0 or -0 -> smallest positive subnormal
        return 0x0001;
    }
    if bits & SIGN_MASK == 0 {
        bits + 1
    } else {
        bits - 1
    }
}

/// Largest `f16` strictly less than `bits` (identity on NaN and -inf).
#[inline]
pub fn f16_next_down(bits: u16) -> u16 {
    if is_nan_bits(bits) || bits == (SIGN_MASK | EXP_MASK) {
        return bits;
    }
    if bits & !SIGN_MASK == 0 {
        return SIGN_MASK | 0x0001;
    }
    if bits & SIGN_MASK == 0 {
        bits - 1
    } else {
        bits + 1
    }
}

/// Convert to `f16`, rounding toward -inf. NaN maps to +inf.
#[inline]
pub fn f16_round_down(x: f32) -> u16 {
    if x.is_nan() {
        return f16::INFINITY.to_bits();
    }
    let h = f16::from_f32(x);
    if h.to_f32() > x {
        f16_next_down(h.to_bits())
    } else {
        h.to_bits()
    }
}

/// Convert to `f16`, rounding toward +inf. NaN maps to -inf.
#[inline]
pub fn f16_round_up(x: f32) -> u16 {
    if x.is_nan() {
        return f16::NEG_INFINITY.to_bits();
    }
    let h = f16::from_f32(x);
    if h.to_f32() < x {
        f16_next_up(h.to_bits())
    } else {
        h.to_bits()
    }
}

#[inline]
fn pack_pair(lo: u16, hi: u16) -> u32 {
    lo as u32 | ((hi as u32) << 16)
}

#[inline]
fn unpack_pair(word: u32) -> (f32, f32) {
    (
        f16::from_bits(word as u16).to_f32(),
        f16::from_bits((word >> 16) as u16).to_f32(),
    )
}

/// Compressed min/max bounds: six half floats in three words.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedBounds {
    pub words: [u32; 3],
}

impl PackedBounds {
    /// Inverted box (+inf min, -inf max). Fails every slab test.
    pub const EMPTY: Self = Self {
        words: [
            0x7C00 | (0x7C00 << 16),
            0x7C00 | (0xFC00 << 16),
            0xFC00 | (0xFC00 << 16),
        ],
    };

    /// Pack `aabb` with outward rounding so the result contains it.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        if aabb.is_empty() {
            return Self::EMPTY;
        }
        let (mn, mx) = (aabb.min, aabb.max);
        Self {
            words: [
                pack_pair(f16_round_down(mn.x), f16_round_down(mn.y)),
                pack_pair(f16_round_down(mn.z), f16_round_up(mx.x)),
                pack_pair(f16_round_up(mx.y), f16_round_up(mx.z)),
            ],
        }
    }

    /// Build from raw words, as stored in serialized trees.
    #[inline]
    pub const fn from_words(words: [u32; 3]) -> Self {
        Self { words }
    }

    /// Decode to single precision. Exact: every `f16` is an `f32`.
    #[inline]
    pub fn to_aabb(&self) -> Aabb {
        let (min_x, min_y) = unpack_pair(self.words[0]);
        let (min_z, max_x) = unpack_pair(self.words[1]);
        let (max_y, max_z) = unpack_pair(self.words[2]);
        Aabb::new(Vec3::new(min_x, min_y, min_z), Vec3::new(max_x, max_y, max_z))
    }

    /// Exact union; the decoded values are representable, so repacking loses nothing.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_aabb(&self.to_aabb().union(&other.to_aabb()))
    }

    /// True when min > max on any axis (or a component is NaN).
    pub fn is_empty(&self) -> bool {
        let b = self.to_aabb();
        !(b.min.x <= b.max.x && b.min.y <= b.max.y && b.min.z <= b.max.z)
    }
}

impl Default for PackedBounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for PackedBounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.to_aabb();
        write!(f, "PackedBounds({:?} - {:?})", b.min, b.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_up_down() {
        let one = f16::ONE.to_bits();
        assert!(f16::from_bits(f16_next_up(one)) > f16::ONE);
        assert!(f16::from_bits(f16_next_down(one)) < f16::ONE);
        assert_eq!(f16_next_down(f16_next_up(one)), one);

        let neg = f16::from_f32(-2.0).to_bits();
        assert!(f16::from_bits(f16_next_up(neg)).to_f32() > -2.0);
        assert!(f16::from_bits(f16_next_down(neg)).to_f32() < -2.0);

        assert_eq!(f16_next_up(0x0000), 0x0001);
        assert_eq!(f16_next_up(0x8000), 0x0001);
        assert_eq!(f16_next_down(0x0000), 0x8001);
        assert_eq!(f16_next_up(f16::INFINITY.to_bits()), f16::INFINITY.to_bits());
        assert_eq!(f16_next_down(f16::MAX.to_bits() + 1), f16::MAX.to_bits());
        assert_eq!(
            f16_next_up(f16::NEG_INFINITY.to_bits()),
            (-f16::MAX).to_bits()
        );
    }

    #[test]
    fn test_directed_rounding() {
        for &x in &[0.1f32, -0.1, 1.0 / 3.0, -7.77, 1234.567, 1e-6, -1e-6, 0.0] {
            let lo = f16::from_bits(f16_round_down(x)).to_f32();
            let hi = f16::from_bits(f16_round_up(x)).to_f32();
            assert!(lo <= x, "round_down({x}) = {lo}");
            assert!(hi >= x, "round_up({x}) = {hi}");
        }
        // Exactly representable values are not widened
        assert_eq!(f16_round_down(0.5), f16::from_f32(0.5).to_bits());
        assert_eq!(f16_round_up(0.5), f16::from_f32(0.5).to_bits());
        // Overflow: minimum clamps to the largest finite value
        assert_eq!(f16_round_down(70000.0), f16::MAX.to_bits());
        assert_eq!(f16_round_up(70000.0), f16::INFINITY.to_bits());
    }

    #[test]
    fn test_pack_contains_source() {
        let b = Aabb::new(Vec3::new(-0.33, 0.1, 2.71), Vec3::new(0.77, 0.3, 3.14159));
        let packed = PackedBounds::from_aabb(&b);
        assert!(packed.to_aabb().contains_box(&b));
        assert!(!packed.is_empty());
    }

    #[test]
    fn test_empty() {
        assert!(PackedBounds::EMPTY.is_empty());
        assert!(PackedBounds::from_aabb(&Aabb::EMPTY).is_empty());
        let b = PackedBounds::from_aabb(&Aabb::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(b.union(&PackedBounds::EMPTY), b);
    }

    #[test]
    fn test_union_exact() {
        let a = PackedBounds::from_aabb(&Aabb::new(Vec3::splat(-1.1), Vec3::splat(0.2)));
        let b = PackedBounds::from_aabb(&Aabb::new(Vec3::splat(0.5), Vec3::splat(2.3)));
        let u = a.union(&b).to_aabb();
        assert_eq!(u.min, a.to_aabb().min);
        assert_eq!(u.max, b.to_aabb().max);
    }

    #[test]
    fn test_word_layout() {
        let b = Aabb::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        let p = PackedBounds::from_aabb(&b);
        let h = |v: f32| f16::from_f32(v).to_bits() as u32;
        assert_eq!(p.words[0], h(1.0) | (h(2.0) << 16));
        assert_eq!(p.words[1], h(3.0) | (h(4.0) << 16));
        assert_eq!(p.words[2], h(5.0) | (h(6.0) << 16));
    }
}
