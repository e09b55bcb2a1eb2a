use super::Color;

/// Stroke description for lines, rectangle outlines and ellipse borders.
///
/// `width` is in logical pixels. Rectangle outlines are centred on the
/// rectangle edge (half the pen on each side).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pen {
    pub color: Color,
    pub width: f32,
}

impl Pen {
    #[inline]
    pub const fn new(color: Color, width: f32) -> Self {
        Self { color, width }
    }

    /// One logical pixel wide.
    #[inline]
    pub const fn hairline(color: Color) -> Self {
        Self { color, width: 1.0 }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.color.is_finite() && self.width.is_finite()
    }
}
