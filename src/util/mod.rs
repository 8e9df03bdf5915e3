//! Utility types shared by the build and traversal modules.
//!
//! - [`Aabb`] - single precision bounding box (glam based)
//! - [`PackedBounds`] - half precision bounds with conservative rounding
//! - [`Error`] / [`Result`] - Error handling

mod error;
mod math;
pub mod half_bounds;

pub use error::*;
pub use math::*;
pub use half_bounds::PackedBounds;
