use crate::coords::Viewport;

/// Construction parameters for [`crate::Graphic`].
#[derive(Debug, Clone)]
pub struct GraphicConfig {
    /// Initial drawing surface. Can be changed later with `Graphic::resize`.
    pub surface: Viewport,

    /// Capacity of each vertex buffer when it is first created.
    ///
    /// Buffers grow on demand; this only avoids early reallocations.
    pub initial_buffer_bytes: usize,

    /// Extra pixels added around each ellipse quad for edge anti-aliasing.
    pub ellipse_aa_margin: f32,
}

impl Default for GraphicConfig {
    fn default() -> Self {
        Self {
            surface: Viewport::new(800.0, 600.0, 1.0),
            initial_buffer_bytes: 4096,
            ellipse_aa_margin: 5.0,
        }
    }
}

impl GraphicConfig {
    pub fn with_surface(mut self, width: f32, height: f32, scale: f32) -> Self {
        self.surface = Viewport::new(width, height, scale);
        self
    }
}
