//! Ray packet traversal of the wide tree.
//!
//! - [`ray`] - rays, packets, hit records
//! - [`kernels`] - slab and Möller–Trumbore tests, scalar and masked
//! - [`packet`] - stack-based closest-hit traversal

pub mod kernels;
pub mod packet;
pub mod ray;

pub use kernels::{intersect_aabb, intersect_triangle};
pub use packet::{required_stack_depth, PacketTraversal, TraversalStats};
pub use ray::{Hit, LaneVec, Ray, RayPacket};
