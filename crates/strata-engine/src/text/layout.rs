use crate::coords::{Rect, Vec2};
use crate::paint::Color;

use super::FontFace;

/// One positioned glyph: screen rectangle plus atlas rectangle.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphQuad {
    pub dst: Rect,
    pub uv: Rect,
}

/// A laid-out string, ready for the text batcher.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    pub quads: Vec<GlyphQuad>,
    pub color: Color,
}

#[inline]
fn scale_for(face: &FontFace, size: f32) -> f32 {
    let native = face.descriptor().size;
    if native > 0.0 { size / native } else { 1.0 }
}

/// Lays `text` out with its top-left pen position at `origin`.
///
/// Lines split on `\n`. Glyphs are scaled by `size / face size`, the pen
/// advances by `(advance + kerning(c, next)) * k`, and each line steps down
/// by `trunc(k * line_height)`. Characters the face lacks are skipped.
pub fn layout_text(face: &FontFace, size: f32, text: &str, origin: Vec2) -> Vec<GlyphQuad> {
    let k = scale_for(face, size);
    let line_step = (k * face.line_height()).trunc();
    let mut quads = Vec::with_capacity(text.len());
    let mut y = origin.y;

    for line in text.split('\n') {
        let mut x = origin.x;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            let Some(glyph) = face.glyph(c) else { continue };
            quads.push(GlyphQuad {
                dst: Rect::new(
                    x + glyph.offset.x * k,
                    y + glyph.offset.y * k,
                    glyph.size.x * k,
                    glyph.size.y * k,
                ),
                uv: glyph.uv,
            });
            let kern = chars.peek().map_or(0.0, |&next| face.kerning(c, next));
            x += (glyph.advance + kern) * k;
        }
        y += line_step;
    }
    quads
}

/// Pen extent of `text`: the widest line's advance by the line count times
/// the line step.
pub fn measure_text(face: &FontFace, size: f32, text: &str) -> Vec2 {
    let k = scale_for(face, size);
    let line_step = (k * face.line_height()).trunc();
    let mut width = 0.0f32;
    let mut lines = 0u32;

    for line in text.split('\n') {
        let mut x = 0.0;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            let Some(glyph) = face.glyph(c) else { continue };
            let kern = chars.peek().map_or(0.0, |&next| face.kerning(c, next));
            x += (glyph.advance + kern) * k;
        }
        width = width.max(x);
        lines += 1;
    }
    Vec2::new(width, lines as f32 * line_step)
}
