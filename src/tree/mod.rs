//! Tree storage: the binary LBVH and the collapsed wide tree.
//!
//! Both trees are flat node arrays addressed by `u32` index; the root is
//! always node 0. Leaves carry `LEAF_FLAG | primitive` in their metadata word.

pub mod binary;
pub mod format;
pub mod wide;

pub use binary::{BinaryNode, BinaryTree};
pub use format::{load_words, read_words, save_words, write_words};
pub use wide::{WideNode, WideTree};

/// Metadata bit marking a leaf.
pub const LEAF_FLAG: u32 = 0x8000_0000;

/// Mask for the primitive index in leaf metadata.
pub const PRIM_MASK: u32 = 0x7FFF_FFFF;

/// Absent child / parent sentinel.
pub const INVALID: u32 = u32::MAX;
