//! Bottom-up bounds reduction with atomic arrival counters.
//!
//! One task per leaf writes the leaf's packed bounds, then climbs parent
//! links. At each internal node the task bumps the node's arrival counter:
//! the first arrival stops, the second merges both children (both already
//! written) and keeps climbing. Each internal node is merged exactly once
//! and total climbing work is bounded by the leaf count.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use super::morton::MortonKey;
use crate::geometry::Triangle;
use crate::tree::INVALID;
use crate::util::PackedBounds;

/// Packed bounds shared across reduction tasks.
#[derive(Debug, Default)]
pub struct AtomicBounds([AtomicU32; 3]);

impl AtomicBounds {
    #[inline]
    pub fn store(&self, b: PackedBounds) {
        for (slot, word) in self.0.iter().zip(b.words) {
            slot.store(word, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn load(&self) -> PackedBounds {
        PackedBounds::from_words([
            self.0[0].load(Ordering::Relaxed),
            self.0[1].load(Ordering::Relaxed),
            self.0[2].load(Ordering::Relaxed),
        ])
    }
}

/// Conservative leaf bounds: dilated by `eps`, then rounded outward to f16.
#[inline]
pub fn leaf_bounds(triangle: &Triangle, eps: f32) -> PackedBounds {
    PackedBounds::from_aabb(&triangle.aabb().dilate(eps))
}

/// Compute bounds for all `2n-1` nodes. Returns the number of internal
/// nodes merged (always `n-1`).
///
/// `flags` (one per internal node) must be zeroed by the caller.
/// Bound words are stored relaxed; the acquire-release counter increment
/// orders a child's stores before the sibling task's loads.
#[tracing::instrument(skip_all, fields(leaf_count = sorted.len()))]
pub fn reduce_bounds(
    triangles: &[Triangle],
    sorted: &[MortonKey],
    children: &[[u32; 2]],
    parents: &[AtomicU32],
    flags: &[AtomicU32],
    bounds: &[AtomicBounds],
    eps: f32,
) -> usize {
    let n = sorted.len();
    if n == 0 {
        return 0;
    }
    debug_assert_eq!(children.len(), n - 1);
    debug_assert_eq!(flags.len(), n - 1);
    debug_assert_eq!(bounds.len(), 2 * n - 1);

    let merged: usize = (0..n)
        .into_par_iter()
        .map(|k| {
            let leaf = n - 1 + k;
            let prim = sorted[k].index as usize;
            bounds[leaf].store(leaf_bounds(&triangles[prim], eps));

            let mut merged = 0;
            let mut node = parents[leaf].load(Ordering::Relaxed);
            while node != INVALID {
                let idx = node as usize;
                if flags[idx].fetch_add(1, Ordering::AcqRel) == 0 {
                    // Sibling subtree still running; it will finish this node
                    break;
                }
                let [left, right] = children[idx];
                let b = bounds[left as usize].load().union(&bounds[right as usize].load());
                bounds[idx].store(b);
                merged += 1;
                node = parents[idx].load(Ordering::Relaxed);
            }
            merged
        })
        .sum();

    debug_assert_eq!(merged, n - 1);
    merged
}
