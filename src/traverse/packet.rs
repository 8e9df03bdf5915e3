//! Stack-based packet traversal of the wide tree.
//!
//! All lanes share one explicit stack of `(node, lane mask)` entries. A node
//! is re-tested when popped, since lanes may have found closer hits since it
//! was pushed. Internal nodes push their surviving children far-to-near by
//! the smallest entry distance across the packet, so the nearest is popped
//! first. When the stack is full the farthest children are the ones dropped.

use smallvec::{smallvec, SmallVec};
use std::ops::AddAssign;

use super::kernels::{intersect_aabb_packet, intersect_triangle_packet};
use super::ray::{Hit, LaneVec, RayPacket};
use crate::config::MAX_ARITY;
use crate::geometry::Triangle;
use crate::tree::WideTree;

/// `(entry distance, node, lane mask)` for a child that survived the box test.
type Candidate = (f32, u32, u64);
type NodeStack = SmallVec<[(u32, u64); 64]>;

/// Counters gathered while tracing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Stack entries popped.
    pub nodes_visited: u64,
    /// Leaf primitives tested against at least one lane.
    pub leaf_tests: u64,
    /// Child pushes dropped because the stack was full.
    pub stack_truncations: u64,
}

impl AddAssign for TraversalStats {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_visited += rhs.nodes_visited;
        self.leaf_tests += rhs.leaf_tests;
        self.stack_truncations += rhs.stack_truncations;
    }
}

/// Read-only view used to trace packets against one built tree.
#[derive(Debug, Clone, Copy)]
pub struct PacketTraversal<'a> {
    tree: &'a WideTree,
    triangles: &'a [Triangle],
    max_stack_depth: usize,
}

impl<'a> PacketTraversal<'a> {
    pub fn new(tree: &'a WideTree, triangles: &'a [Triangle], max_stack_depth: usize) -> Self {
        Self {
            tree,
            triangles,
            max_stack_depth: max_stack_depth.max(1),
        }
    }

    /// Closest hit per lane. Inactive lanes report a miss.
    ///
    /// A tree deeper than the stack capacity is under-traversed: dropped
    /// pushes are counted in `stats` (and assert in debug builds).
    pub fn trace(&self, packet: &RayPacket, stats: &mut TraversalStats) -> LaneVec<Hit> {
        let mut hits: LaneVec<Hit> = smallvec![Hit::MISS; packet.len()];
        if self.tree.is_empty() || packet.active_mask() == 0 {
            return hits;
        }

        let rays = packet.rays();
        let nodes = self.tree.nodes();
        let mut truncated = 0u64;
        let mut stack = NodeStack::new();
        stack.push((0, packet.active_mask()));

        while let Some((idx, mask)) = stack.pop() {
            stats.nodes_visited += 1;
            let node = &nodes[idx as usize];
            let (mask, _) = intersect_aabb_packet(rays, &hits, mask, &node.bounds.to_aabb());
            if mask == 0 {
                continue;
            }

            if let Some(prim) = node.primitive() {
                stats.leaf_tests += 1;
                intersect_triangle_packet(rays, &mut hits, mask, &self.triangles[prim as usize], prim);
                continue;
            }

            let mut candidates: SmallVec<[Candidate; MAX_ARITY]> = SmallVec::new();
            for child in node.children() {
                let bounds = nodes[child as usize].bounds.to_aabb();
                let (child_mask, entry) = intersect_aabb_packet(rays, &hits, mask, &bounds);
                if child_mask != 0 {
                    candidates.push((entry, child, child_mask));
                }
            }
            // Far first so the nearest ends on top
            candidates.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));
            truncated += push_nearest(&mut stack, &candidates, self.max_stack_depth);
        }

        if truncated > 0 {
            tracing::warn!(
                truncated,
                capacity = self.max_stack_depth,
                "traversal stack overflow, closest hits may be missed"
            );
            debug_assert!(
                truncated == 0,
                "traversal stack overflow: capacity {}",
                self.max_stack_depth
            );
        }
        stats.stack_truncations += truncated;
        hits
    }
}

/// Push far-to-near `candidates`, dropping the farthest ones that do not
/// fit under `capacity`. Returns the number dropped.
fn push_nearest(stack: &mut NodeStack, candidates: &[Candidate], capacity: usize) -> u64 {
    let room = capacity.saturating_sub(stack.len());
    let dropped = candidates.len().saturating_sub(room);
    stack.extend(candidates[dropped..].iter().map(|&(_, node, mask)| (node, mask)));
    dropped as u64
}

/// Upper bound on stack occupancy for a wide tree of the given depth and arity.
pub fn required_stack_depth(depth: usize, arity: usize) -> usize {
    if depth == 0 {
        return 0;
    }
    1 + (depth - 1) * (arity - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build;
    use crate::config::BvhConfig;
    use crate::geometry::synthetic_scene;
    use crate::traverse::ray::Ray;
    use crate::util::Vec3;

    #[test]
    fn test_empty_tree_short_circuits() {
        let tree = WideTree::new(4);
        let trav = PacketTraversal::new(&tree, &[], 64);
        let packet = RayPacket::new(&[Ray::new(Vec3::ZERO, Vec3::Z); 4]).unwrap();
        let mut stats = TraversalStats::default();
        let hits = trav.trace(&packet, &mut stats);
        assert!(hits.iter().all(|h| !h.hit));
        assert_eq!(stats.nodes_visited, 0);
    }

    #[test]
    fn test_inactive_lanes_miss() {
        let tris = synthetic_scene(16, 5);
        let (_, wide) = build(&tris, &BvhConfig::default()).unwrap();
        let trav = PacketTraversal::new(&wide, &tris, 64);
        let rays: Vec<Ray> = tris
            .iter()
            .take(4)
            .map(|t| Ray::new(t.centroid() - Vec3::Z * 20.0, Vec3::Z))
            .collect();
        let packet = RayPacket::with_mask(&rays, 0b0101).unwrap();
        let hits = trav.trace(&packet, &mut TraversalStats::default());
        assert_eq!(hits[0].primitive(), Some(0));
        assert_eq!(hits[2].primitive(), Some(2));
        assert!(!hits[1].hit && !hits[3].hit);
    }

    /// One ray per 16th triangle, so every root child sees some lane.
    fn spread_packet(tris: &[Triangle]) -> RayPacket {
        let rays: Vec<Ray> = tris
            .iter()
            .step_by(16)
            .map(|t| Ray::new(t.centroid() - Vec3::Z * 50.0, Vec3::Z))
            .collect();
        RayPacket::new(&rays).unwrap()
    }

    #[test]
    fn test_push_nearest_drops_farthest() {
        let candidates = [(9.0, 1, 0b1), (5.0, 2, 0b10), (1.0, 3, 0b100)];

        let mut stack = NodeStack::new();
        assert_eq!(push_nearest(&mut stack, &candidates, 64), 0);
        assert_eq!(stack.as_slice(), &[(1, 0b1), (2, 0b10), (3, 0b100)]);

        let mut stack = NodeStack::new();
        stack.push((7, 1));
        assert_eq!(push_nearest(&mut stack, &candidates, 2), 2);
        assert_eq!(stack.as_slice(), &[(7, 1), (3, 0b100)]);

        let mut stack: NodeStack = smallvec![(7, 1), (8, 1)];
        assert_eq!(push_nearest(&mut stack, &candidates, 2), 3);
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn test_required_stack_depth() {
        assert_eq!(required_stack_depth(0, 4), 0);
        assert_eq!(required_stack_depth(1, 4), 1);
        assert_eq!(required_stack_depth(5, 4), 13);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "traversal stack overflow")]
    fn test_stack_overflow_asserts_in_debug() {
        let tris = synthetic_scene(256, 9);
        let (_, wide) = build(&tris, &BvhConfig::default()).unwrap();
        let trav = PacketTraversal::new(&wide, &tris, 1);
        let packet = spread_packet(&tris);
        trav.trace(&packet, &mut TraversalStats::default());
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_stack_overflow_truncates_in_release() {
        let tris = synthetic_scene(256, 9);
        let (_, wide) = build(&tris, &BvhConfig::default()).unwrap();
        let trav = PacketTraversal::new(&wide, &tris, 1);
        let packet = spread_packet(&tris);
        let mut stats = TraversalStats::default();
        trav.trace(&packet, &mut stats);
        assert!(stats.stack_truncations > 0);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_overflow_keeps_nearest_child() {
        // Four stacked copies of one triangle at z = 0..3 under a single root
        let tris: Vec<Triangle> = (0..4)
            .map(|i| {
                let z = Vec3::Z * i as f32;
                Triangle::new(z, Vec3::X + z, Vec3::Y + z)
            })
            .collect();
        let (_, wide) = build(&tris, &BvhConfig::default()).unwrap();
        assert_eq!(wide.nodes()[0].children().count(), 4);

        let trav = PacketTraversal::new(&wide, &tris, 1);
        let packet = RayPacket::new(&[Ray::new(Vec3::new(0.25, 0.25, -1.0), Vec3::Z)]).unwrap();
        let mut stats = TraversalStats::default();
        let hits = trav.trace(&packet, &mut stats);
        assert_eq!(stats.stack_truncations, 3);
        assert_eq!(hits[0].primitive(), Some(0));
        assert!((hits[0].distance - 1.0).abs() < 1e-5);
    }
}
