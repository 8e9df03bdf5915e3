//! Triangle soup input.
//!
//! The store is a passive read-only buffer: a flat sequence of 9 floats per
//! triangle (3 vertices x xyz), viewed as [`Triangle`]s without copying.

use bytemuck::{Pod, Zeroable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::util::{Aabb, Error, Result, Vec3};

/// Floats per triangle in the flat input buffer.
pub const FLOATS_PER_TRIANGLE: usize = 9;

/// Triangle primitive (36 bytes, castable from `[f32; 9]`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Triangle {
    pub v0: [f32; 3],
    pub v1: [f32; 3],
    pub v2: [f32; 3],
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            v0: v0.to_array(),
            v1: v1.to_array(),
            v2: v2.to_array(),
        }
    }

    /// Vertices as glam vectors.
    #[inline]
    pub fn vertices(&self) -> [Vec3; 3] {
        [
            Vec3::from_array(self.v0),
            Vec3::from_array(self.v1),
            Vec3::from_array(self.v2),
        ]
    }

    /// Compute AABB of this triangle.
    pub fn aabb(&self) -> Aabb {
        let mut b = Aabb::EMPTY;
        for v in self.vertices() {
            b.expand_by_point(v);
        }
        b
    }

    /// Centroid of the triangle (mean of the vertices).
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.vertices();
        (a + b + c) / 3.0
    }
}

/// Owned, read-only triangle buffer.
#[derive(Debug, Clone, Default)]
pub struct TriangleStore {
    triangles: Vec<Triangle>,
}

impl TriangleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a flat `[x, y, z] x 3` buffer. Length must be a multiple of 9.
    pub fn from_flat(flat: &[f32]) -> Result<Self> {
        Ok(Self {
            triangles: cast_flat(flat)?.to_vec(),
        })
    }

    pub fn from_triangles(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    /// Replace the contents, reusing the allocation.
    pub(crate) fn assign(&mut self, triangles: &[Triangle]) {
        self.triangles.clear();
        self.triangles.extend_from_slice(triangles);
    }

    pub(crate) fn reserve_total(&mut self, capacity: usize) {
        self.triangles
            .reserve(capacity.saturating_sub(self.triangles.len()));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Flat float view of the buffer.
    pub fn as_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.triangles)
    }
}

/// View a flat float buffer as triangles without copying.
pub fn cast_flat(flat: &[f32]) -> Result<&[Triangle]> {
    if flat.len() % FLOATS_PER_TRIANGLE != 0 {
        return Err(Error::input(format!(
            "flat buffer length {} is not a multiple of {}",
            flat.len(),
            FLOATS_PER_TRIANGLE
        )));
    }
    bytemuck::try_cast_slice(flat).map_err(|e| Error::input(format!("cannot view buffer as triangles: {e}")))
}

/// Seeded synthetic scene: `count` small triangles, one per cell of a
/// square XY grid, each at a random depth.
///
/// Triangle projections onto the XY plane never overlap, so a ray travelling
/// along +Z through a triangle's centroid hits that triangle first.
pub fn synthetic_scene(count: usize, seed: u64) -> Vec<Triangle> {
    let mut rng = StdRng::seed_from_u64(seed);
    let side = (count as f64).sqrt().ceil().max(1.0) as usize;
    let cell = 1.0f32;
    let margin = 0.1 * cell;

    (0..count)
        .map(|i| {
            let cx = (i % side) as f32 * cell;
            let cy = (i / side) as f32 * cell;
            let z = rng.gen_range(-5.0f32..5.0);
            let mut corner = || {
                Vec3::new(
                    cx + rng.gen_range(margin..cell - margin),
                    cy + rng.gen_range(margin..cell - margin),
                    z + rng.gen_range(-0.25f32..0.25),
                )
            };
            let (a, b, c) = (corner(), corner(), corner());
            Triangle::new(a, b, c)
        })
        .collect()
}
