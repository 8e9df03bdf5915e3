//! Build context: owns geometry, scratch buffers and both trees.
//!
//! There is no global state. Every `rebuild` is a full build from scratch
//! that replaces the previous trees; allocations are kept across rebuilds.

use rayon::prelude::*;

use crate::build::{self, BuildScratch, MortonKey};
use crate::config::BvhConfig;
use crate::geometry::{cast_flat, Triangle, TriangleStore};
use crate::traverse::kernels::intersect_triangle_packet;
use crate::traverse::{required_stack_depth, Hit, LaneVec, PacketTraversal, Ray, RayPacket, TraversalStats};
use crate::tree::{BinaryTree, WideTree};
use crate::util::{Error, Result};

#[derive(Debug)]
pub struct Engine {
    config: BvhConfig,
    /// Primitive capacity reserved across all buffers.
    capacity: usize,
    store: TriangleStore,
    scratch: BuildScratch,
    binary: BinaryTree,
    wide: WideTree,
}

impl Engine {
    /// Empty engine. Fails if `config` is out of range.
    pub fn new(config: BvhConfig) -> Result<Self> {
        Self::with_capacity(0, config)
    }

    /// Empty engine with buffers preallocated for `capacity` primitives.
    pub fn with_capacity(capacity: usize, config: BvhConfig) -> Result<Self> {
        config.validate()?;
        let mut engine = Self {
            wide: WideTree::new(config.arity),
            config,
            capacity: 0,
            store: TriangleStore::new(),
            scratch: BuildScratch::new(),
            binary: BinaryTree::default(),
        };
        engine.reserve(capacity);
        Ok(engine)
    }

    /// Grow buffers to hold at least `capacity` primitives. Never shrinks.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.store.reserve_total(capacity);
        self.scratch.reserve(capacity);
        let nodes = (2 * capacity).saturating_sub(1);
        self.binary.nodes.reserve(nodes.saturating_sub(self.binary.nodes.len()));
        self.wide.nodes.reserve(nodes.saturating_sub(self.wide.nodes.len()));
        self.capacity = capacity;
        tracing::debug!(capacity, "reserved");
    }

    /// Rebuild from a flat buffer of 9 floats per triangle.
    pub fn rebuild(&mut self, flat: &[f32]) -> Result<()> {
        let triangles = cast_flat(flat)?;
        self.rebuild_triangles(triangles)
    }

    /// Rebuild both trees for `triangles`.
    ///
    /// With `auto_grow` off, a count beyond the reserved capacity fails with
    /// [`Error::CapacityExceeded`] and leaves the previous trees untouched.
    #[tracing::instrument(skip_all, fields(tri_count = triangles.len(), arity = self.config.arity))]
    pub fn rebuild_triangles(&mut self, triangles: &[Triangle]) -> Result<()> {
        let n = triangles.len();
        if n > PRIM_LIMIT {
            return Err(Error::input(format!("{n} primitives exceed the {PRIM_LIMIT} index limit")));
        }
        if n > self.capacity {
            if !self.config.auto_grow {
                return Err(Error::CapacityExceeded {
                    requested: n,
                    capacity: self.capacity,
                });
            }
            self.reserve(n);
        }

        self.store.assign(triangles);
        build::build_binary_into(
            self.store.as_slice(),
            self.config.bound_epsilon,
            &mut self.scratch,
            &mut self.binary,
        );
        build::collapse_into(
            &self.binary,
            self.config.arity,
            self.config.collapse_heuristic,
            &mut self.wide,
        )?;

        let needed = required_stack_depth(self.wide.depth(), self.config.arity);
        if needed > self.config.max_stack_depth {
            tracing::warn!(
                needed,
                max_stack_depth = self.config.max_stack_depth,
                "wide tree may overflow the traversal stack"
            );
        }
        tracing::info!(
            binary_nodes = self.binary.len(),
            wide_nodes = self.wide.len(),
            wide_depth = self.wide.depth(),
            "rebuilt"
        );
        Ok(())
    }

    /// Drop geometry and trees, keeping allocations.
    pub fn clear(&mut self) {
        self.store.assign(&[]);
        self.scratch.keys.clear();
        self.scratch.sorted_codes.clear();
        self.scratch.sorted_indices.clear();
        self.binary.nodes.clear();
        self.wide.nodes.clear();
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn triangles(&self) -> &[Triangle] {
        self.store.as_slice()
    }

    pub fn binary_tree(&self) -> &BinaryTree {
        &self.binary
    }

    pub fn wide_tree(&self) -> &WideTree {
        &self.wide
    }

    /// Keys of the last build in sorted order.
    pub fn sorted_keys(&self) -> &[MortonKey] {
        &self.scratch.keys
    }

    /// Morton codes of the last build in leaf order.
    pub fn sorted_codes(&self) -> &[u32] {
        &self.scratch.sorted_codes
    }

    /// Primitive indices of the last build in leaf order.
    pub fn sorted_primitive_indices(&self) -> &[u32] {
        &self.scratch.sorted_indices
    }

    /// Traversal over the current wide tree.
    pub fn traversal(&self) -> PacketTraversal<'_> {
        PacketTraversal::new(&self.wide, self.store.as_slice(), self.config.max_stack_depth)
    }

    /// Closest hit per lane of `packet`.
    pub fn intersect_packet(&self, packet: &RayPacket, stats: &mut TraversalStats) -> LaneVec<Hit> {
        self.traversal().trace(packet, stats)
    }

    /// Closest hit for a single ray.
    pub fn intersect(&self, ray: &Ray) -> Hit {
        let mut stats = TraversalStats::default();
        match RayPacket::new(std::slice::from_ref(ray)) {
            Ok(packet) => self.intersect_packet(&packet, &mut stats)[0],
            Err(_) => Hit::MISS,
        }
    }

    /// Trace `rays` in packets of `packet_size`, packets in parallel.
    pub fn intersect_rays(&self, rays: &[Ray]) -> (Vec<Hit>, TraversalStats) {
        let traversal = self.traversal();
        let per_packet: Vec<(LaneVec<Hit>, TraversalStats)> = rays
            .par_chunks(self.config.packet_size)
            .map(|chunk| {
                let mut stats = TraversalStats::default();
                // packet_size is validated to fit a packet
                let hits = match RayPacket::new(chunk) {
                    Ok(packet) => traversal.trace(&packet, &mut stats),
                    Err(_) => chunk.iter().map(|_| Hit::MISS).collect(),
                };
                (hits, stats)
            })
            .collect();

        let mut hits = Vec::with_capacity(rays.len());
        let mut total = TraversalStats::default();
        for (packet_hits, stats) in per_packet {
            hits.extend(packet_hits);
            total += stats;
        }
        (hits, total)
    }

    /// Reference closest hit testing every primitive, no tree.
    pub fn intersect_brute_force(&self, ray: &Ray) -> Hit {
        let rays = [*ray];
        let mut best = [Hit::MISS];
        for (prim, tri) in self.store.as_slice().iter().enumerate() {
            intersect_triangle_packet(&rays, &mut best, 1, tri, prim as u32);
        }
        best[0]
    }
}

/// Primitive indices must leave the leaf flag bit clear.
const PRIM_LIMIT: usize = crate::tree::PRIM_MASK as usize;
