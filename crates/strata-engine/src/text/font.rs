use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::coords::{Rect, Vec2};
use crate::error::Result;
use crate::paint::Bitmap;

/// Logical font request.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub family: String,
    /// Point size.
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
            bold: false,
            italic: false,
        }
    }

    #[must_use]
    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    #[must_use]
    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

/// One glyph of a face, at the face's native size.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphMetrics {
    /// Normalized atlas rectangle.
    pub uv: Rect,
    /// Quad size in pixels.
    pub size: Vec2,
    /// Quad offset from the pen position.
    pub offset: Vec2,
    pub advance: f32,
}

/// A pre-rasterized face: glyph metrics, kerning and the atlas they index.
#[derive(Debug, Clone)]
pub struct FontFace {
    descriptor: FontDescriptor,
    line_height: f32,
    glyphs: FxHashMap<char, GlyphMetrics>,
    kerning: FxHashMap<(char, char), f32>,
    atlas: Arc<Bitmap>,
}

impl FontFace {
    pub fn new(descriptor: FontDescriptor, line_height: f32, atlas: Arc<Bitmap>) -> Self {
        Self {
            descriptor,
            line_height,
            glyphs: FxHashMap::default(),
            kerning: FxHashMap::default(),
            atlas,
        }
    }

    /// Adds a glyph. The first definition of a character wins.
    pub fn insert_glyph(&mut self, c: char, metrics: GlyphMetrics) {
        self.glyphs.entry(c).or_insert(metrics);
    }

    /// Adds a kerning delta. The first definition of a pair wins.
    pub fn insert_kerning(&mut self, left: char, right: char, delta: f32) {
        self.kerning.entry((left, right)).or_insert(delta);
    }

    pub fn set_line_height(&mut self, line_height: f32) {
        self.line_height = line_height;
    }

    #[inline]
    pub fn descriptor(&self) -> &FontDescriptor {
        &self.descriptor
    }

    #[inline]
    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    #[inline]
    pub fn glyph(&self, c: char) -> Option<&GlyphMetrics> {
        self.glyphs.get(&c)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Kerning adjustment between `left` and `right`, zero when unknown.
    #[inline]
    pub fn kerning(&self, left: char, right: char) -> f32 {
        self.kerning.get(&(left, right)).copied().unwrap_or(0.0)
    }

    pub fn atlas(&self) -> &Bitmap {
        &self.atlas
    }

    pub(crate) fn shared_atlas(&self) -> &Arc<Bitmap> {
        &self.atlas
    }

    /// Match score against a request: one point each for family
    /// (case-insensitive), size within 0.1pt, boldness and slant.
    pub fn score(&self, request: &FontDescriptor) -> u8 {
        let d = &self.descriptor;
        u8::from(d.family.eq_ignore_ascii_case(&request.family))
            + u8::from((d.size - request.size).abs() <= 0.1)
            + u8::from(d.bold == request.bold)
            + u8::from(d.italic == request.italic)
    }
}

/// Source of glyph metrics for `draw_string`.
pub trait FontMetricsProvider {
    /// Best available face for `request`.
    ///
    /// Fails with `FontNotFound` only when no face is loaded at all.
    fn resolve(&self, request: &FontDescriptor) -> Result<&FontFace>;

    fn is_empty(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(family: &str, size: f32, bold: bool) -> FontFace {
        let mut d = FontDescriptor::new(family, size);
        d.bold = bold;
        FontFace::new(d, 12.0, Arc::new(Bitmap::solid(1, 1, [255; 4])))
    }

    #[test]
    fn score_counts_matching_traits() {
        let f = face("Arial", 12.0, false);
        assert_eq!(f.score(&FontDescriptor::new("arial", 12.05)), 4);
        assert_eq!(f.score(&FontDescriptor::new("Arial", 14.0)), 3);
        assert_eq!(f.score(&FontDescriptor::new("Mono", 14.0).bold().italic()), 0);
    }

    #[test]
    fn first_glyph_and_pair_win() {
        let mut f = face("Arial", 12.0, false);
        let m = GlyphMetrics {
            uv: Rect::new(0.0, 0.0, 0.1, 0.1),
            size: Vec2::new(5.0, 7.0),
            offset: Vec2::zero(),
            advance: 6.0,
        };
        f.insert_glyph('A', m);
        f.insert_glyph('A', GlyphMetrics { advance: 9.0, ..m });
        f.insert_kerning('A', 'V', -1.0);
        f.insert_kerning('A', 'V', -3.0);
        assert_eq!(f.glyph('A').map(|g| g.advance), Some(6.0));
        assert_eq!(f.kerning('A', 'V'), -1.0);
        assert_eq!(f.kerning('V', 'A'), 0.0);
        assert_eq!(f.glyph_count(), 1);
    }
}
