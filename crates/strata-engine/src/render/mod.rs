//! Primitive batchers.
//!
//! Convention:
//! - Geometry is in logical pixels (top-left origin, +Y down).
//! - Every vertex shader maps positions through the `projection` uniform.
//! - Colours reaching the device are premultiplied.

mod batcher;
mod ellipse;
mod image;
mod polygon;
mod text;

pub use batcher::{Batcher, ScratchBuffer, TaskSpan, PROJECTION_UNIFORM};
pub use ellipse::EllipseBatcher;
pub use image::{ImageBatcher, TexVertex};
pub use polygon::{line_quad, stroke_sides, ColorVertex, PolygonBatcher};
pub use text::TextBatcher;
