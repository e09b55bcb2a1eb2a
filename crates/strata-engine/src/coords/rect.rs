use super::Vec2;

/// Axis-aligned rectangle in logical pixels (top-left origin).
///
/// Width and height are not normalized: zero or negative sizes are carried
/// through to the batchers and produce degenerate geometry.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    #[inline]
    pub fn x(self) -> f32 {
        self.origin.x
    }

    #[inline]
    pub fn y(self) -> f32 {
        self.origin.y
    }

    #[inline]
    pub fn width(self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x / 2.0, self.origin.y + self.size.y / 2.0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// Corners in winding order: top-left, top-right, bottom-right, bottom-left.
    #[inline]
    pub fn corners(self) -> [Vec2; 4] {
        let min = self.min();
        let max = self.max();
        [
            min,
            Vec2::new(max.x, min.y),
            max,
            Vec2::new(min.x, max.y),
        ]
    }

    /// Grows the rectangle by `dx`/`dy` on every side, keeping the center.
    #[inline]
    pub fn inflate(self, dx: f32, dy: f32) -> Self {
        Rect::new(
            self.origin.x - dx,
            self.origin.y - dy,
            self.size.x + 2.0 * dx,
            self.size.y + 2.0 * dy,
        )
    }

    /// Expresses `self` (in pixels of an image of `extent`) as a UV rectangle.
    ///
    /// A zero extent yields the full `0..1` range.
    #[inline]
    pub fn normalized_in(self, extent: Vec2) -> Self {
        if extent.x == 0.0 || extent.y == 0.0 {
            return Rect::new(0.0, 0.0, 1.0, 1.0);
        }
        Rect::new(
            self.origin.x / extent.x,
            self.origin.y / extent.y,
            self.size.x / extent.x,
            self.size.y / extent.y,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> Rect { Rect::new(x, y, w, h) }

    // ── corners ───────────────────────────────────────────────────────────

    #[test]
    fn corners_wind_clockwise_on_screen() {
        let c = r(1.0, 2.0, 10.0, 20.0).corners();
        assert_eq!(c[0], Vec2::new(1.0, 2.0));
        assert_eq!(c[1], Vec2::new(11.0, 2.0));
        assert_eq!(c[2], Vec2::new(11.0, 22.0));
        assert_eq!(c[3], Vec2::new(1.0, 22.0));
    }

    #[test]
    fn negative_size_is_not_normalized() {
        // Degenerate input passes through untouched.
        let c = r(10.0, 0.0, -4.0, 5.0).corners();
        assert_eq!(c[1], Vec2::new(6.0, 0.0));
    }

    // ── inflate / center ──────────────────────────────────────────────────

    #[test]
    fn inflate_keeps_center() {
        let rect = r(0.0, 0.0, 10.0, 4.0);
        let grown = rect.inflate(2.5, 2.5);
        assert_eq!(grown, r(-2.5, -2.5, 15.0, 9.0));
        assert_eq!(grown.center(), rect.center());
    }

    // ── normalized_in ─────────────────────────────────────────────────────

    #[test]
    fn normalized_in_divides_by_extent() {
        let uv = r(16.0, 8.0, 32.0, 8.0).normalized_in(Vec2::new(64.0, 32.0));
        assert_eq!(uv, r(0.25, 0.25, 0.5, 0.25));
    }

    #[test]
    fn normalized_in_zero_extent_is_full_range() {
        assert_eq!(r(1.0, 1.0, 1.0, 1.0).normalized_in(Vec2::zero()), r(0.0, 0.0, 1.0, 1.0));
    }

    // ── is_empty / is_finite ──────────────────────────────────────────────

    #[test]
    fn is_empty_zero_size() {
        assert!(r(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(!r(0.0, 0.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn is_finite_rejects_nan() {
        assert!(!r(f32::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(!r(0.0, 0.0, f32::INFINITY, 1.0).is_finite());
    }
}
