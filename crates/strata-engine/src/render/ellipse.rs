use super::batcher::{Batcher, ScratchBuffer, TaskQueue, TaskSpan};
use crate::coords::{Rect, Vec2};
use crate::device::{
    AttributeLayout, BufferRole, BufferUsage, GraphicsDevice, PrimitiveKind, UniformValue,
};
use crate::error::Result;
use crate::gpu::{ShaderProgram, ShaderSource, VertexArrayBinding};
use crate::paint::Color;

const SOURCE: ShaderSource<'static> = ShaderSource {
    vertex: include_str!("shaders/ellipse.wgsl"),
    fragment: include_str!("shaders/ellipse.wgsl"),
};

#[derive(Debug, Copy, Clone, PartialEq)]
struct EllipseTask {
    span: TaskSpan,
    color: Color,
    center: Vec2,
    radii: Vec2,
    border: f32,
}

/// Analytic ellipses.
///
/// Each ellipse is one bounding quad; coverage is evaluated per fragment from
/// the `center`, `radii` and `border` uniforms. The quad is inflated by half
/// of `border + aa_margin` on every side so the ring and its anti-aliased
/// edge stay inside it.
#[derive(Debug)]
pub struct EllipseBatcher {
    program: ShaderProgram,
    vertices: ScratchBuffer<[f32; 2]>,
    tasks: TaskQueue<EllipseTask>,
    aa_margin: f32,
}

impl EllipseBatcher {
    pub const NAME: &'static str = "ellipse";

    pub fn new(
        device: &mut dyn GraphicsDevice,
        initial_bytes: usize,
        aa_margin: f32,
    ) -> Result<Self> {
        let vao = VertexArrayBinding::new(device, BufferUsage::Stream, initial_bytes)?;
        let program = ShaderProgram::new(device, Self::NAME, &SOURCE, vao)?;
        let mut batcher = Self {
            program,
            vertices: ScratchBuffer::new(),
            tasks: TaskQueue::default(),
            aa_margin,
        };
        batcher.set_scale(device, 1.0)?;
        Ok(batcher)
    }

    /// Device pixels per logical pixel. Keeps the anti-aliased edge one
    /// device pixel wide.
    pub fn set_scale(&mut self, device: &mut dyn GraphicsDevice, scale: f32) -> Result<()> {
        self.program
            .set_uniform(device, "scale", UniformValue::Float(scale))
    }

    /// Adds an ellipse inscribed in `bounds`. `border == 0` fills it.
    pub fn add(&mut self, bounds: Rect, color: Color, border: f32) {
        let pad = (border + self.aa_margin) / 2.0;
        let quad = bounds.inflate(pad, pad).corners();
        let [a, b, c, d] = quad.map(Vec2::to_array);
        let span = self.vertices.extend(&[a, b, c, a, c, d]);
        self.tasks.push(EllipseTask {
            span,
            color,
            center: bounds.center(),
            radii: bounds.size / 2.0,
            border,
        });
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.program.destroy(device);
    }
}

impl Batcher for EllipseBatcher {
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
            AttributeLayout { components: 2, normalized: false, stride: 8, offset: 0 },
        )
    }

    fn draw_next(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let task = self.tasks.advance(Self::NAME)?;
        let p = &mut self.program;
        p.set_uniform(device, "color", UniformValue::Vec4(task.color.to_array()))?;
        p.set_uniform(device, "center", UniformValue::Vec2(task.center.to_array()))?;
        p.set_uniform(device, "radii", UniformValue::Vec2(task.radii.to_array()))?;
        p.set_uniform(device, "border", UniformValue::Float(task.border))?;
        p.draw(device, PrimitiveKind::Triangles, task.span.first, task.span.count)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;

    #[test]
    fn quad_is_inflated_by_border_and_margin() {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(100, 100).unwrap();
        let mut batcher = EllipseBatcher::new(&mut dev, 256, 5.0).unwrap();
        batcher.add(Rect::new(10.0, 20.0, 40.0, 20.0), Color::WHITE, 3.0);
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();

        let draw = dev.draws().next().unwrap();
        let pts = draw.points("position");
        assert_eq!(pts[0], [6.0, 16.0]);
        assert_eq!(pts[2], [54.0, 44.0]);
        assert_eq!(draw.uniform("center"), Some(&UniformValue::Vec2([30.0, 30.0])));
        assert_eq!(draw.uniform("radii"), Some(&UniformValue::Vec2([20.0, 10.0])));
        assert_eq!(draw.uniform("border"), Some(&UniformValue::Float(3.0)));
    }

    #[test]
    fn scale_defaults_to_one_and_follows_the_surface() {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(100, 100).unwrap();
        let mut batcher = EllipseBatcher::new(&mut dev, 256, 5.0).unwrap();
        batcher.add(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE, 0.0);
        batcher.add(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE, 0.0);
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.set_scale(&mut dev, 2.0).unwrap();
        batcher.draw_next(&mut dev).unwrap();

        let scales: Vec<_> = dev.draws().map(|d| d.uniform("scale").copied()).collect();
        assert_eq!(
            scales,
            vec![Some(UniformValue::Float(1.0)), Some(UniformValue::Float(2.0))]
        );
    }

    #[test]
    fn uniforms_follow_each_task() {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(100, 100).unwrap();
        let mut batcher = EllipseBatcher::new(&mut dev, 256, 5.0).unwrap();
        batcher.add(Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE, 0.0);
        batcher.add(Rect::new(0.0, 0.0, 10.0, 10.0), Color::BLACK, 2.0);
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.draw_next(&mut dev).unwrap();

        let colors: Vec<_> = dev.draws().map(|d| d.uniform("color").copied()).collect();
        assert_eq!(
            colors,
            vec![
                Some(UniformValue::Vec4([1.0, 1.0, 1.0, 1.0])),
                Some(UniformValue::Vec4([0.0, 0.0, 0.0, 1.0])),
            ]
        );
    }
}
