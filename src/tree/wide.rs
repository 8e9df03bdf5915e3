//! K-ary node array produced by collapsing the binary tree.
//!
//! Wide leaves hold exactly one primitive. Child slots past the last used
//! one hold [`INVALID`]. Child indices are always greater than the parent's.

use bytemuck::{Pod, Zeroable};
use std::collections::VecDeque;
use std::fmt::Write as _;

use super::{INVALID, LEAF_FLAG, PRIM_MASK};
use crate::config::MAX_ARITY;
use crate::util::PackedBounds;

/// Wide node (48 bytes). Storage always has [`MAX_ARITY`] slots; only the
/// tree's arity is serialized.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct WideNode {
    pub bounds: PackedBounds,
    pub children: [u32; MAX_ARITY],
    pub meta: u32,
}

impl WideNode {
    pub const PLACEHOLDER: Self = Self {
        bounds: PackedBounds::EMPTY,
        children: [INVALID; MAX_ARITY],
        meta: 0,
    };

    pub fn leaf(bounds: PackedBounds, primitive: u32) -> Self {
        Self {
            bounds,
            children: [INVALID; MAX_ARITY],
            meta: LEAF_FLAG | (primitive & PRIM_MASK),
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.meta & LEAF_FLAG != 0
    }

    #[inline]
    pub fn primitive(&self) -> Option<u32> {
        self.is_leaf().then_some(self.meta & PRIM_MASK)
    }

    /// Present child indices, in slot order.
    #[inline]
    pub fn children(&self) -> impl Iterator<Item = u32> + '_ {
        self.children.iter().copied().filter(|&c| c != INVALID)
    }
}

/// Completed wide tree. Read-only between builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideTree {
    pub(crate) arity: usize,
    pub(crate) nodes: Vec<WideNode>,
}

impl WideTree {
    pub fn new(arity: usize) -> Self {
        Self { arity, nodes: Vec::new() }
    }

    pub fn from_nodes(arity: usize, nodes: Vec<WideNode>) -> Self {
        Self { arity, nodes }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[inline]
    pub fn nodes(&self) -> &[WideNode] {
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

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of levels on the longest root-to-leaf path (0 when empty).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        // Children follow their parent in the array, so one forward pass suffices.
        let mut depth = vec![0usize; self.nodes.len()];
        depth[0] = 1;
        let mut max_depth = 1;
        for (i, node) in self.nodes.iter().enumerate() {
            for child in node.children() {
                depth[child as usize] = depth[i] + 1;
                max_depth = max_depth.max(depth[i] + 1);
            }
        }
        max_depth
    }

    /// Breadth-first listing of nodes down to `max_depth` (root is depth 0).
    pub fn describe(&self, max_depth: usize) -> String {
        let mut out = String::new();
        if self.nodes.is_empty() {
            out.push_str("(empty)\n");
            return out;
        }
        let mut queue = VecDeque::from([(0u32, 0usize)]);
        while let Some((idx, depth)) = queue.pop_front() {
            let node = &self.nodes[idx as usize];
            let kind = if node.is_leaf() { "LEAF" } else { "INTERNAL" };
            let _ = write!(out, "Node {idx} | depth {depth} | {kind} | kids:");
            for child in node.children() {
                let _ = write!(out, " {child}");
            }
            if let Some(prim) = node.primitive() {
                let _ = write!(out, " | prim {prim}");
            }
            out.push('\n');
            if depth < max_depth {
                queue.extend(node.children().map(|c| (c, depth + 1)));
            }
        }
        out
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }
}
