/// Linear premultiplied RGBA color.
///
/// Invariant:
/// - `rgb` components are expected to be multiplied by `a` (premultiplied alpha).
///
/// All batchers blend with `One, OneMinusSrcAlpha`, so colors reach the GPU
/// exactly as stored here.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Color {
    pub r: f32, // premultiplied
    pub g: f32, // premultiplied
    pub b: f32, // premultiplied
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::from_premul(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::from_premul(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::from_premul(1.0, 1.0, 1.0, 1.0);

    /// Creates a premultiplied color from straight sRGB bytes (`0`–`255`).
    #[inline]
    pub fn from_srgb_u8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from_straight(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, a as f32 / 255.0)
    }

    /// Opaque color from straight sRGB bytes.
    #[inline]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_srgb_u8(r, g, b, 255)
    }

    /// Creates a premultiplied color from premultiplied components.
    #[inline]
    pub const fn from_premul(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Creates a premultiplied color from straight alpha components.
    #[inline]
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        let a = a.clamp(0.0, 1.0);
        Self {
            r: (r.clamp(0.0, 1.0)) * a,
            g: (g.clamp(0.0, 1.0)) * a,
            b: (b.clamp(0.0, 1.0)) * a,
            a,
        }
    }

    /// Returns a straight-alpha representation.
    ///
    /// For `a == 0`, RGB is returned as 0.
    #[inline]
    pub fn to_straight(self) -> (f32, f32, f32, f32) {
        if self.a <= 0.0 {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let inv = 1.0 / self.a;
            (self.r * inv, self.g * inv, self.b * inv, self.a)
        }
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite() && self.a.is_finite()
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_bytes_are_premultiplied() {
        let c = Color::from_srgb_u8(255, 0, 0, 51);
        assert!((c.a - 0.2).abs() < 1e-6);
        assert!((c.r - 0.2).abs() < 1e-6);
        assert_eq!(c.g, 0.0);
    }

    #[test]
    fn straight_round_trip_for_translucent_color() {
        let (r, g, b, a) = Color::from_straight(0.5, 0.25, 1.0, 0.5).to_straight();
        assert!((r - 0.5).abs() < 1e-6);
        assert!((g - 0.25).abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);
        assert!((a - 0.5).abs() < 1e-6);
    }

    #[test]
    fn fully_transparent_has_no_straight_rgb() {
        assert_eq!(Color::TRANSPARENT.to_straight(), (0.0, 0.0, 0.0, 0.0));
    }
}
