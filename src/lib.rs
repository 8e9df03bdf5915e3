//! # LBVH
//!
//! Parallel linear bounding volume hierarchy over triangle soups.
//!
//! Construction sorts primitives by 30-bit Morton keys, derives binary
//! topology per internal node, and reduces half-precision bounds bottom-up
//! with atomic arrival counters. The binary tree is then collapsed into a
//! K-ary tree that ray packets traverse for closest hits.
//!
//! ## Modules
//!
//! - [`util`] - Errors, AABBs, conservative half-float bounds
//! - [`geometry`] - Triangle store and synthetic scenes
//! - [`config`] - Engine configuration
//! - [`build`] - Keys, sort, connectivity, reduction, collapse
//! - [`tree`] - Binary and wide node arrays, word formats
//! - [`traverse`] - Rays, packets, intersection kernels
//! - [`engine`] - Owning build context and query API
//!
//! ## Example
//!
//! ```ignore
//! use lbvh::prelude::*;
//!
//! let mut engine = Engine::new(BvhConfig::default())?;
//! engine.rebuild(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])?;
//!
//! let hit = engine.intersect(&Ray::new(Vec3::new(0.25, 0.25, -1.0), Vec3::Z));
//! assert!(hit.hit);
//! ```

pub mod util;
pub mod geometry;
pub mod config;
pub mod tree;
pub mod build;
pub mod traverse;
pub mod engine;

// Re-export commonly used types
pub use config::{BvhConfig, CollapseHeuristic};
pub use engine::Engine;
pub use geometry::{Triangle, TriangleStore};
pub use util::{Error, Result};

pub mod prelude {
    pub use crate::config::{BvhConfig, CollapseHeuristic};
    pub use crate::engine::Engine;
    pub use crate::geometry::{synthetic_scene, Triangle, TriangleStore};
    pub use crate::traverse::{Hit, Ray, RayPacket, TraversalStats};
    pub use crate::tree::{BinaryTree, WideTree};
    pub use crate::util::{Aabb, Error, Result, Vec3};
}
