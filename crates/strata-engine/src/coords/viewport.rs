/// Drawing surface size: logical pixels plus the DPI scale to physical pixels.
///
/// Geometry is recorded in logical pixels. The device surface is
/// `round(width * scale) × round(height * scale)` physical pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 0.0, height: 0.0, scale: 1.0 }
    }
}

impl Viewport {
    #[inline]
    pub const fn new(width: f32, height: f32, scale: f32) -> Self {
        Self { width, height, scale }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.scale > 0.0
            && self.width.is_finite()
            && self.height.is_finite()
            && self.scale.is_finite()
    }

    #[inline]
    pub fn physical_width(self) -> u32 {
        (self.width * self.scale).round().max(0.0) as u32
    }

    #[inline]
    pub fn physical_height(self) -> u32 {
        (self.height * self.scale).round().max(0.0) as u32
    }

    /// Column-major orthographic projection over the logical size.
    ///
    /// Maps `(0, 0)` to the top-left corner and `(width, height)` to the
    /// bottom-right corner of clip space (+Y down on screen).
    pub fn projection(self) -> [f32; 16] {
        let w = self.width.max(1.0);
        let h = self.height.max(1.0);
        [
            2.0 / w, 0.0, 0.0, 0.0, //
            0.0, -2.0 / h, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            -1.0, 1.0, 0.0, 1.0,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[f32; 16], x: f32, y: f32) -> (f32, f32) {
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }

    #[test]
    fn projection_maps_corners() {
        let m = Viewport::new(200.0, 100.0, 1.0).projection();
        assert_eq!(apply(&m, 0.0, 0.0), (-1.0, 1.0));
        assert_eq!(apply(&m, 200.0, 100.0), (1.0, -1.0));
        assert_eq!(apply(&m, 100.0, 50.0), (0.0, 0.0));
    }

    #[test]
    fn physical_size_rounds_scaled_logical_size() {
        let v = Viewport::new(100.0, 50.0, 1.5);
        assert_eq!(v.physical_width(), 150);
        assert_eq!(v.physical_height(), 75);
        assert!(v.is_valid());
        assert!(!Viewport::new(100.0, 0.0, 1.0).is_valid());
    }
}
