use bytemuck::{Pod, Zeroable};

use super::batcher::{Batcher, ScratchBuffer, TaskQueue, TaskSpan};
use crate::coords::{Rect, Vec2};
use crate::device::{AttributeLayout, BufferRole, BufferUsage, GraphicsDevice, PrimitiveKind};
use crate::error::Result;
use crate::gpu::{ShaderProgram, ShaderSource, VertexArrayBinding};
use crate::paint::Color;

const SOURCE: ShaderSource<'static> = ShaderSource {
    vertex: include_str!("shaders/polygon.wgsl"),
    fragment: include_str!("shaders/polygon.wgsl"),
};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct ColorVertex {
    pub pos: [f32; 2],
    pub color: [f32; 4],
}

impl ColorVertex {
    const STRIDE: u32 = std::mem::size_of::<ColorVertex>() as u32;
}

/// Solid-colour convex quads: filled rectangles, stroked-rectangle sides, lines.
///
/// Each task is one quad (6 vertices, two triangles).
#[derive(Debug)]
pub struct PolygonBatcher {
    program: ShaderProgram,
    vertices: ScratchBuffer<ColorVertex>,
    tasks: TaskQueue<TaskSpan>,
}

impl PolygonBatcher {
    pub const NAME: &'static str = "polygon";

    pub fn new(device: &mut dyn GraphicsDevice, initial_bytes: usize) -> Result<Self> {
        let vao = VertexArrayBinding::new(device, BufferUsage::Stream, initial_bytes)?;
        let program = ShaderProgram::new(device, Self::NAME, &SOURCE, vao)?;
        Ok(Self {
            program,
            vertices: ScratchBuffer::new(),
            tasks: TaskQueue::default(),
        })
    }

    /// Adds a quad given its corners in winding order.
    pub fn add_quad(&mut self, corners: [Vec2; 4], color: Color) {
        let c = color.to_array();
        let v = |p: Vec2| ColorVertex { pos: p.to_array(), color: c };
        let [a, b, cc, d] = corners;
        let span = self.vertices.extend(&[v(a), v(b), v(cc), v(a), v(cc), v(d)]);
        self.tasks.push(span);
    }

    pub fn add_rect(&mut self, rect: Rect, color: Color) {
        self.add_quad(rect.corners(), color);
    }

    pub fn vertices(&self) -> &[ColorVertex] {
        self.vertices.as_slice()
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.program.destroy(device);
    }
}

impl Batcher for PolygonBatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn upload_to_device(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.vertices.is_empty() {
            return Ok(());
        }
        self.program
            .vertex_array_mut()
            .upload(device, BufferRole::Position, self.vertices.as_slice())?;
        self.program.set_attribute(
            device,
            BufferRole::Position,
            "position",
            AttributeLayout {
                components: 2,
                normalized: false,
                stride: ColorVertex::STRIDE,
                offset: 0,
            },
        )?;
        self.program.set_attribute(
            device,
            BufferRole::Position,
            "vertex_color",
            AttributeLayout {
                components: 4,
                normalized: false,
                stride: ColorVertex::STRIDE,
                offset: 8,
            },
        )
    }

    fn draw_next(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let span = self.tasks.advance(Self::NAME)?;
        self.program
            .draw(device, PrimitiveKind::Triangles, span.first, span.count)
    }

    fn clear(&mut self) {
        self.vertices.clear();
        self.tasks.clear();
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn program_mut(&mut self) -> &mut ShaderProgram {
        &mut self.program
    }
}

/// The four filled sides of a rectangle stroked with a pen of `pen_width`.
///
/// Sides are centred on the rectangle edges (half the pen inside, half
/// outside) and returned as top, right, bottom, left.
pub fn stroke_sides(rect: Rect, pen_width: f32) -> [Rect; 4] {
    let hp = pen_width / 2.0;
    let (x, y, w, h) = (rect.x(), rect.y(), rect.width(), rect.height());
    [
        Rect::new(x - hp, y - hp, w + pen_width, pen_width),
        Rect::new(x + w - hp, y - hp, pen_width, h + pen_width),
        Rect::new(x - hp, y + h - hp, w + pen_width, pen_width),
        Rect::new(x - hp, y - hp, pen_width, h + pen_width),
    ]
}

/// Quad covering a line of `pen_width` from `p1` to `p2`.
///
/// Endpoints are ordered by y. The quad extends `(w - 1) / 2` to one side of
/// the line and the rest of `w - 1` to the other; hairlines (`w <= 1`) get one
/// pixel. A zero-length line yields a degenerate quad.
pub fn line_quad(p1: Vec2, p2: Vec2, pen_width: f32) -> [Vec2; 4] {
    let (a, b) = if p1.y > p2.y { (p2, p1) } else { (p1, p2) };
    let mut d1 = (pen_width - 1.0) / 2.0;
    let d2 = pen_width - 1.0 - d1;
    if d1 <= 0.0 && d2 <= 0.0 {
        d1 = 1.0;
    }
    let n = (b - a).normalized_or_zero().perp();
    [a - n * d1, a + n * d2, b + n * d2, b - n * d1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::error::GraphicError;

    fn frame_device() -> RecordingDevice {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(100, 100).unwrap();
        dev
    }

    // ── geometry helpers ─────────────────────────────────────────────────

    #[test]
    fn stroke_sides_use_half_pen() {
        let sides = stroke_sides(Rect::new(10.0, 10.0, 20.0, 10.0), 2.0);
        assert_eq!(
            sides,
            [
                Rect::new(9.0, 9.0, 22.0, 2.0),
                Rect::new(29.0, 9.0, 2.0, 12.0),
                Rect::new(9.0, 19.0, 22.0, 2.0),
                Rect::new(9.0, 9.0, 2.0, 12.0),
            ]
        );
    }

    #[test]
    fn horizontal_line_quad() {
        let q = line_quad(Vec2::new(0.0, 5.0), Vec2::new(10.0, 5.0), 3.0);
        // d1 = d2 = 1, normal = (0, 1)
        assert_eq!(
            q,
            [Vec2::new(0.0, 4.0), Vec2::new(0.0, 6.0), Vec2::new(10.0, 6.0), Vec2::new(10.0, 4.0)]
        );
    }

    #[test]
    fn line_endpoints_are_ordered_by_y() {
        let down = line_quad(Vec2::new(0.0, 0.0), Vec2::new(0.0, 10.0), 1.0);
        let up = line_quad(Vec2::new(0.0, 10.0), Vec2::new(0.0, 0.0), 1.0);
        assert_eq!(down, up);
        // Hairline: one pixel to one side.
        assert_eq!(down[0], Vec2::new(1.0, 0.0));
        assert_eq!(down[1], Vec2::new(0.0, 0.0));
    }

    #[test]
    fn zero_length_line_is_degenerate() {
        let p = Vec2::new(3.0, 3.0);
        let q = line_quad(p, p, 4.0);
        assert!(q.iter().all(|c| *c == p));
    }

    // ── batching ─────────────────────────────────────────────────────────

    #[test]
    fn one_upload_and_draws_in_task_order() {
        let mut dev = frame_device();
        let mut batcher = PolygonBatcher::new(&mut dev, 256).unwrap();
        batcher.add_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        batcher.add_rect(Rect::new(20.0, 0.0, 5.0, 5.0), Color::BLACK);
        assert_eq!(batcher.len(), 2);

        dev.clear_calls();
        batcher.upload_to_device(&mut dev).unwrap();
        let writes =
            dev.count_calls(|c| matches!(c, crate::device::DeviceCall::WriteBuffer { .. }));
        assert_eq!(writes, 1);

        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.draw_next(&mut dev).unwrap();
        let err = batcher.draw_next(&mut dev).unwrap_err();
        assert!(matches!(err, GraphicError::OutOfRange { batcher: "polygon", .. }));

        let draws: Vec<_> = dev.draws().collect();
        assert_eq!((draws[0].first, draws[0].count), (0, 6));
        assert_eq!((draws[1].first, draws[1].count), (6, 6));
        assert_eq!(draws[1].points("position")[0], [20.0, 0.0]);
        assert_eq!(&draws[1].attribute("vertex_color").unwrap()[..4], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_batcher_skips_upload() {
        let mut dev = frame_device();
        let mut batcher = PolygonBatcher::new(&mut dev, 256).unwrap();
        dev.clear_calls();
        batcher.upload_to_device(&mut dev).unwrap();
        assert!(dev.calls().is_empty());
    }

    #[test]
    fn growing_past_capacity_keeps_draws_valid() {
        let mut dev = frame_device();
        let mut batcher = PolygonBatcher::new(&mut dev, 64).unwrap();
        for i in 0..10 {
            batcher.add_rect(Rect::new(i as f32, 0.0, 1.0, 1.0), Color::WHITE);
        }
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        for _ in 0..10 {
            batcher.draw_next(&mut dev).unwrap();
        }
        let last = dev.draws().last().unwrap();
        assert_eq!(last.points("position")[0], [9.0, 0.0]);
    }

    #[test]
    fn clear_resets_cursor_and_vertices() {
        let mut dev = frame_device();
        let mut batcher = PolygonBatcher::new(&mut dev, 64).unwrap();
        batcher.add_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Color::WHITE);
        batcher.clear();
        assert!(batcher.is_empty());
        assert!(batcher.vertices().is_empty());
    }
}
