//! Ray-box and ray-triangle intersection kernels.
//!
//! Numerical policy: degenerate triangles (zero area, NaN vertices) and
//! near-parallel rays fail the determinant or barycentric checks and are
//! reported as misses, never as errors.

use super::ray::{lanes, Hit, Ray};
use crate::geometry::Triangle;
use crate::util::{Aabb, Vec3};

/// Rays with `|det|` below this are treated as parallel to the triangle.
pub const PARALLEL_EPSILON: f32 = 1e-7;

/// Hits at or below this distance are rejected (self-intersection).
pub const MIN_HIT_DISTANCE: f32 = 1e-6;

/// Slab test. Returns the entry distance when the ray hits `bounds` at or
/// after its origin and before `max_t`. Empty boxes always miss.
#[inline]
pub fn intersect_aabb(ray: &Ray, bounds: &Aabb, max_t: f32) -> Option<f32> {
    if bounds.is_empty() {
        return None;
    }
    let mut t_min = f32::NEG_INFINITY;
    let mut t_max = f32::INFINITY;
    for axis in 0..3 {
        let t1 = (bounds.min[axis] - ray.origin[axis]) * ray.inv_direction[axis];
        let t2 = (bounds.max[axis] - ray.origin[axis]) * ray.inv_direction[axis];
        // 0 * inf: a parallel ray starting on a slab face is inside that slab
        if t1.is_nan() || t2.is_nan() {
            continue;
        }
        t_min = t_min.max(t1.min(t2));
        t_max = t_max.min(t1.max(t2));
    }
    (t_max >= t_min.max(0.0) && t_min < max_t).then_some(t_min)
}

/// Masked slab test for a packet. Returns the surviving lanes and the
/// smallest entry distance among them.
#[inline]
pub fn intersect_aabb_packet(rays: &[Ray], best: &[Hit], mask: u64, bounds: &Aabb) -> (u64, f32) {
    if bounds.is_empty() {
        return (0, f32::INFINITY);
    }
    let mut hit_mask = 0u64;
    let mut nearest = f32::INFINITY;
    for lane in lanes(mask) {
        if let Some(t) = intersect_aabb(&rays[lane], bounds, best[lane].distance) {
            hit_mask |= 1 << lane;
            nearest = nearest.min(t);
        }
    }
    (hit_mask, nearest)
}

/// Möller–Trumbore. Returns `(t, unit geometric normal)`.
#[inline]
pub fn intersect_triangle(ray: &Ray, tri: &Triangle) -> Option<(f32, Vec3)> {
    let [v0, v1, v2] = tri.vertices();
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.is_nan() || det.abs() < PARALLEL_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - v0;
    let u = inv_det * s.dot(p);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = inv_det * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = inv_det * e2.dot(q);
    if t.is_nan() || t <= MIN_HIT_DISTANCE {
        return None;
    }
    Some((t, e1.cross(e2).normalize_or_zero()))
}

/// Test one primitive against the active lanes, keeping the closer hits.
#[inline]
pub fn intersect_triangle_packet(rays: &[Ray], best: &mut [Hit], mask: u64, tri: &Triangle, primitive: u32) {
    for lane in lanes(mask) {
        if let Some((t, normal)) = intersect_triangle(&rays[lane], tri) {
            if t < best[lane].distance {
                best[lane] = Hit {
                    distance: t,
                    normal,
                    primitive,
                    hit: true,
                };
            }
        }
    }
}
