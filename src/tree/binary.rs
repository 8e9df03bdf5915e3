//! Binary LBVH node array.
//!
//! Layout for `n` primitives: internal nodes at `[0, n-2]`, leaves at
//! `[n-1, 2n-2]`, root at 0. With one primitive the root is the only leaf.

use bytemuck::{Pod, Zeroable};

use super::{INVALID, LEAF_FLAG, PRIM_MASK};
use crate::util::PackedBounds;

/// Binary node (28 bytes).
///
/// Internal: `left`/`right` are node indices, `meta` is 0.
/// Leaf: `left`/`right` are [`INVALID`], `meta` = `LEAF_FLAG | primitive`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct BinaryNode {
    pub bounds: PackedBounds,
    pub left: u32,
    pub right: u32,
    pub meta: u32,
    /// Parent index, [`INVALID`] for the root.
    pub parent: u32,
}

impl BinaryNode {
    pub fn internal(bounds: PackedBounds, left: u32, right: u32, parent: u32) -> Self {
        Self { bounds, left, right, meta: 0, parent }
    }

    pub fn leaf(bounds: PackedBounds, primitive: u32, parent: u32) -> Self {
        Self {
            bounds,
            left: INVALID,
            right: INVALID,
            meta: LEAF_FLAG | (primitive & PRIM_MASK),
            parent,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.meta & LEAF_FLAG != 0
    }

    /// Primitive index for leaves, `None` for internal nodes.
    #[inline]
    pub fn primitive(&self) -> Option<u32> {
        self.is_leaf().then_some(self.meta & PRIM_MASK)
    }
}

/// Completed binary tree. Read-only between builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryTree {
    pub(crate) nodes: Vec<BinaryNode>,
}

impl BinaryTree {
    pub fn from_nodes(nodes: Vec<BinaryNode>) -> Self {
        Self { nodes }
    }

    #[inline]
    pub fn nodes(&self) -> &[BinaryNode] {
        &self.nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of primitives the tree was built over.
    pub fn primitive_count(&self) -> usize {
        (self.nodes.len() + 1) / 2
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of levels on the longest root-to-leaf path (0 when empty).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0u32, 1usize)];
        while let Some((idx, depth)) = stack.pop() {
            let node = &self.nodes[idx as usize];
            max_depth = max_depth.max(depth);
            if !node.is_leaf() {
                stack.push((node.left, depth + 1));
                stack.push((node.right, depth + 1));
            }
        }
        max_depth
    }

    /// Node bytes for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }
}
