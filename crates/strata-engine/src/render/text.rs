use super::batcher::{Batcher, ScratchBuffer, TaskQueue, TaskSpan};
use super::image::{upload_textured, TexVertex};
use crate::device::{BufferUsage, GraphicsDevice, PrimitiveKind, UniformValue};
use crate::error::Result;
use crate::gpu::{ShaderProgram, ShaderSource, TextureResource, VertexArrayBinding};
use crate::paint::Color;
use crate::text::GlyphQuad;

const SOURCE: ShaderSource<'static> = ShaderSource {
    vertex: include_str!("shaders/text.wgsl"),
    fragment: include_str!("shaders/text.wgsl"),
};

#[derive(Debug, Copy, Clone)]
struct TextTask {
    span: TaskSpan,
    texture: TextureResource,
    color: Color,
}

/// Glyph runs. One task per string: all of its glyph quads share the atlas
/// texture and the tint colour.
#[derive(Debug)]
pub struct TextBatcher {
    program: ShaderProgram,
    vertices: ScratchBuffer<TexVertex>,
    tasks: TaskQueue<TextTask>,
}

impl TextBatcher {
    pub const NAME: &'static str = "text";

    pub fn new(device: &mut dyn GraphicsDevice, initial_bytes: usize) -> Result<Self> {
        let vao = VertexArrayBinding::new(device, BufferUsage::Stream, initial_bytes)?;
        let program = ShaderProgram::new(device, Self::NAME, &SOURCE, vao)?;
        Ok(Self {
            program,
            vertices: ScratchBuffer::new(),
            tasks: TaskQueue::default(),
        })
    }

    /// Records one run. An empty run still records a task so replay stays
    /// aligned with the action log; its draw is skipped.
    pub fn add_run(&mut self, quads: &[GlyphQuad], color: Color, atlas: TextureResource) {
        let first = self.vertices.len() as u32;
        for q in quads {
            self.vertices.extend(&TexVertex::quad(q.dst, q.uv));
        }
        let span = TaskSpan { first, count: self.vertices.len() as u32 - first };
        self.tasks.push(TextTask { span, texture: atlas, color });
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.program.destroy(device);
    }
}

impl Batcher for TextBatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn upload_to_device(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        if self.vertices.is_empty() {
            return Ok(());
        }
        upload_textured(&mut self.program, device, self.vertices.as_slice())
    }

    fn draw_next(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let task = self.tasks.advance(Self::NAME)?;
        if task.span.count == 0 {
            return Ok(());
        }
        self.program
            .set_uniform(device, "color", UniformValue::Vec4(task.color.to_array()))?;
        task.texture.bind(device, 0)?;
        self.program
            .draw(device, PrimitiveKind::Triangles, task.span.first, task.span.count)
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
    use crate::coords::Rect;
    use crate::device::RecordingDevice;
    use crate::paint::Bitmap;

    fn glyph(x: f32) -> GlyphQuad {
        GlyphQuad {
            dst: Rect::new(x, 0.0, 8.0, 10.0),
            uv: Rect::new(0.0, 0.0, 0.5, 0.5),
        }
    }

    #[test]
    fn one_draw_per_run() {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(64, 64).unwrap();
        let atlas =
            TextureResource::upload(&mut dev, &Bitmap::solid(4, 4, [255; 4]), false).unwrap();
        let mut batcher = TextBatcher::new(&mut dev, 256).unwrap();
        batcher.add_run(&[glyph(0.0), glyph(8.0), glyph(16.0)], Color::WHITE, atlas);
        batcher.add_run(&[glyph(0.0)], Color::BLACK, atlas);
        batcher.upload_to_device(&mut dev).unwrap();

        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.draw_next(&mut dev).unwrap();

        let draws: Vec<_> = dev.draws().collect();
        assert_eq!(draws.len(), 2);
        assert_eq!((draws[0].first, draws[0].count), (0, 18));
        assert_eq!((draws[1].first, draws[1].count), (18, 6));
        assert_eq!(draws[1].uniform("color"), Some(&UniformValue::Vec4([0.0, 0.0, 0.0, 1.0])));
        assert_eq!(draws[0].texture, Some(atlas.id()));
    }

    #[test]
    fn empty_run_keeps_replay_aligned() {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(64, 64).unwrap();
        let atlas =
            TextureResource::upload(&mut dev, &Bitmap::solid(4, 4, [255; 4]), false).unwrap();
        let mut batcher = TextBatcher::new(&mut dev, 256).unwrap();
        batcher.add_run(&[], Color::WHITE, atlas);
        batcher.add_run(&[glyph(0.0)], Color::WHITE, atlas);
        assert_eq!(batcher.len(), 2);
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.draw_next(&mut dev).unwrap();
        assert_eq!(dev.draws().count(), 1);
    }
}
