//! Paint model shared between the command surface and batchers.
//!
//! Scope:
//! - color representation (linear premultiplied alpha)
//! - pens for strokes
//! - CPU-side bitmaps and their cache identity
//!
//! Geometry types remain in `coords`.

pub mod bitmap;
pub mod color;
pub mod pen;

pub use bitmap::{Bitmap, ImageKey};
pub use color::Color;
pub use pen::Pen;
