//! LBVH construction pipeline.
//!
//! ```text
//! triangles -> Morton keys -> sort -> connectivity -> bounds reduction -> collapse
//! ```
//!
//! Key generation and the sort complete before anything else starts.
//! Connectivity and reduction are data parallel (one task per node); the
//! only synchronization between reduction tasks is a per-node atomic
//! arrival counter. Collapse runs once the binary tree is complete.

pub mod collapse;
pub mod connectivity;
pub mod morton;
pub mod reduce;
pub mod sort;

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::BvhConfig;
use crate::geometry::Triangle;
use crate::tree::{BinaryNode, BinaryTree, WideTree, INVALID};
use crate::util::Result;

pub use collapse::{collapse, collapse_into};
pub use morton::MortonKey;
pub use reduce::AtomicBounds;

/// Per-build scratch buffers. Contents are only meaningful during a build;
/// allocations are kept across rebuilds.
#[derive(Debug, Default)]
pub struct BuildScratch {
    pub(crate) keys: Vec<MortonKey>,
    pub(crate) sorted_codes: Vec<u32>,
    pub(crate) sorted_indices: Vec<u32>,
    children: Vec<[u32; 2]>,
    parents: Vec<AtomicU32>,
    /// Arrival counters, one per internal node.
    flags: Vec<AtomicU32>,
    bounds: Vec<AtomicBounds>,
}

impl BuildScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate for `n` primitives.
    pub fn with_capacity(n: usize) -> Self {
        let mut scratch = Self::default();
        scratch.reserve(n);
        scratch
    }

    /// Make room for `n` primitives in total.
    pub fn reserve(&mut self, n: usize) {
        let nodes = (2 * n).saturating_sub(1);
        let internal = n.saturating_sub(1);
        self.keys.reserve(n.saturating_sub(self.keys.len()));
        self.sorted_codes.reserve(n.saturating_sub(self.sorted_codes.len()));
        self.sorted_indices.reserve(n.saturating_sub(self.sorted_indices.len()));
        self.children.reserve(internal.saturating_sub(self.children.len()));
        self.parents.reserve(nodes.saturating_sub(self.parents.len()));
        self.flags.reserve(internal.saturating_sub(self.flags.len()));
        self.bounds.reserve(nodes.saturating_sub(self.bounds.len()));
    }

    /// Size node buffers for `n` primitives and reset counters and links.
    fn prepare(&mut self, n: usize) {
        let nodes = (2 * n).saturating_sub(1);
        let internal = n.saturating_sub(1);
        self.parents.resize_with(nodes, || AtomicU32::new(INVALID));
        self.flags.resize_with(internal, || AtomicU32::new(0));
        self.bounds.resize_with(nodes, AtomicBounds::default);
        self.parents
            .par_iter_mut()
            .for_each(|p| *p.get_mut() = INVALID);
        self.flags.par_iter_mut().for_each(|f| *f.get_mut() = 0);
    }
}

/// Build the binary tree for `triangles` into `out`, reusing allocations.
#[tracing::instrument(skip_all, fields(tri_count = triangles.len()))]
pub fn build_binary_into(triangles: &[Triangle], eps: f32, scratch: &mut BuildScratch, out: &mut BinaryTree) {
    let n = triangles.len();
    out.nodes.clear();
    scratch.prepare(n);

    // Phase 1: keys and sort (sequential dependency)
    morton::generate_keys_into(triangles, &mut scratch.keys);
    sort::sort_keys(&mut scratch.keys);
    sort::split_sorted(&scratch.keys, &mut scratch.sorted_codes, &mut scratch.sorted_indices);
    if n == 0 {
        return;
    }

    // Phase 2: topology and bounds (data parallel)
    connectivity::build_connectivity(&scratch.keys, &mut scratch.children, &scratch.parents);
    reduce::reduce_bounds(
        triangles,
        &scratch.keys,
        &scratch.children,
        &scratch.parents,
        &scratch.flags,
        &scratch.bounds,
        eps,
    );

    let scratch = &*scratch;
    let leaf_base = n - 1;
    (0..2 * n - 1)
        .into_par_iter()
        .map(|i| {
            let bounds = scratch.bounds[i].load();
            let parent = scratch.parents[i].load(Ordering::Relaxed);
            if i < leaf_base {
                let [left, right] = scratch.children[i];
                BinaryNode::internal(bounds, left, right, parent)
            } else {
                BinaryNode::leaf(bounds, scratch.keys[i - leaf_base].index, parent)
            }
        })
        .collect_into_vec(&mut out.nodes);

    tracing::debug!(nodes = out.nodes.len(), "binary tree built");
}

/// One-shot build of both trees with fresh scratch buffers.
pub fn build(triangles: &[Triangle], config: &BvhConfig) -> Result<(BinaryTree, WideTree)> {
    config.validate()?;
    let mut scratch = BuildScratch::with_capacity(triangles.len());
    let mut binary = BinaryTree::default();
    build_binary_into(triangles, config.bound_epsilon, &mut scratch, &mut binary);
    let wide = collapse(&binary, config.arity, config.collapse_heuristic)?;
    Ok((binary, wide))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::synthetic_scene;

    #[test]
    fn test_node_count() {
        let config = BvhConfig::default();
        for n in [0usize, 1, 2, 3, 7, 64, 100] {
            let tris = synthetic_scene(n, 1);
            let (binary, wide) = build(&tris, &config).unwrap();
            assert_eq!(binary.len(), (2 * n).saturating_sub(1), "n = {n}");
            assert_eq!(binary.leaf_count(), n);
            assert_eq!(wide.leaf_count(), n);
        }
    }

    #[test]
    fn test_scratch_reuse_matches_fresh_build() {
        let config = BvhConfig::default();
        let mut scratch = BuildScratch::new();
        let mut tree = BinaryTree::default();

        // Bigger scene first so the second build runs over stale buffers
        build_binary_into(&synthetic_scene(300, 3), config.bound_epsilon, &mut scratch, &mut tree);
        let small = synthetic_scene(50, 4);
        build_binary_into(&small, config.bound_epsilon, &mut scratch, &mut tree);

        let (fresh, _) = build(&small, &config).unwrap();
        assert_eq!(tree, fresh);
        assert_eq!(scratch.sorted_indices.len(), 50);
    }

    #[test]
    fn test_root_parent_is_invalid() {
        let (binary, _) = build(&synthetic_scene(10, 2), &BvhConfig::default()).unwrap();
        assert_eq!(binary.nodes()[0].parent, INVALID);
        assert!(binary.nodes()[1..].iter().all(|n| n.parent != INVALID));
    }
}
