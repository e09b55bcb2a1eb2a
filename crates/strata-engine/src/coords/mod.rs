//! Coordinate and geometry types shared by the command surface and batchers.
//!
//! Canonical CPU space:
//! - Logical pixels (DPI-aware)
//! - Origin top-left
//! - +X right, +Y down
//!
//! The projection uniform maps logical pixels to clip space; only scissor
//! rectangles are expressed in device (physical, bottom-left origin) pixels.

mod rect;
mod vec2;
mod viewport;

pub use rect::Rect;
pub use vec2::Vec2;
pub use viewport::Viewport;
