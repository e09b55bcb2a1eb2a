//! Bitmap-font text: faces with pre-rasterized atlases, the glyph-metrics
//! file format, face matching and layout.

mod fnt;
mod font;
mod layout;
mod library;

pub use fnt::{FntFace, FntFile, FntGlyph};
pub use font::{FontDescriptor, FontFace, FontMetricsProvider, GlyphMetrics};
pub use layout::{layout_text, measure_text, GlyphQuad, GlyphRun};
pub use library::FontLibrary;
