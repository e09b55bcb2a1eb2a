use bytemuck::{Pod, Zeroable};

use super::batcher::{Batcher, ScratchBuffer, TaskQueue, TaskSpan};
use crate::coords::Rect;
use crate::device::{AttributeLayout, BufferRole, BufferUsage, GraphicsDevice, PrimitiveKind};
use crate::error::Result;
use crate::gpu::{ShaderProgram, ShaderSource, TextureResource, VertexArrayBinding};

const SOURCE: ShaderSource<'static> = ShaderSource {
    vertex: include_str!("shaders/image.wgsl"),
    fragment: include_str!("shaders/image.wgsl"),
};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable, PartialEq)]
pub struct TexVertex {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
}

impl TexVertex {
    pub(crate) const STRIDE: u32 = std::mem::size_of::<TexVertex>() as u32;

    /// Two triangles mapping `uv` onto `dst`.
    pub(crate) fn quad(dst: Rect, uv: Rect) -> [TexVertex; 6] {
        let p = dst.corners();
        let t = uv.corners();
        let v = |i: usize| TexVertex { pos: p[i].to_array(), uv: t[i].to_array() };
        [v(0), v(1), v(2), v(0), v(2), v(3)]
    }
}

/// Uploads the textured-quad vertices and points both attributes at them.
pub(crate) fn upload_textured(
    program: &mut ShaderProgram,
    device: &mut dyn GraphicsDevice,
    vertices: &[TexVertex],
) -> Result<()> {
    program
        .vertex_array_mut()
        .upload(device, BufferRole::Position, vertices)?;
    program.set_attribute(
        device,
        BufferRole::Position,
        "position",
        AttributeLayout { components: 2, normalized: false, stride: TexVertex::STRIDE, offset: 0 },
    )?;
    program.set_attribute(
        device,
        BufferRole::Position,
        "texcoord",
        AttributeLayout { components: 2, normalized: false, stride: TexVertex::STRIDE, offset: 8 },
    )
}

#[derive(Debug, Copy, Clone)]
struct ImageTask {
    span: TaskSpan,
    texture: TextureResource,
}

/// Textured quads. One task per image draw; the task texture is bound to
/// unit 0 for its draw, and one-shot textures are destroyed right after.
#[derive(Debug)]
pub struct ImageBatcher {
    program: ShaderProgram,
    vertices: ScratchBuffer<TexVertex>,
    tasks: TaskQueue<ImageTask>,
}

impl ImageBatcher {
    pub const NAME: &'static str = "image";

    pub fn new(device: &mut dyn GraphicsDevice, initial_bytes: usize) -> Result<Self> {
        let vao = VertexArrayBinding::new(device, BufferUsage::Stream, initial_bytes)?;
        let program = ShaderProgram::new(device, Self::NAME, &SOURCE, vao)?;
        Ok(Self {
            program,
            vertices: ScratchBuffer::new(),
            tasks: TaskQueue::default(),
        })
    }

    /// Draws the `uv` region (normalized) of `texture` into `dst`.
    pub fn add(&mut self, texture: TextureResource, dst: Rect, uv: Rect) {
        let span = self.vertices.extend(&TexVertex::quad(dst, uv));
        self.tasks.push(ImageTask { span, texture });
    }

    pub fn destroy(mut self, device: &mut dyn GraphicsDevice) {
        self.release_undrawn(device);
        self.program.destroy(device);
    }
}

impl Batcher for ImageBatcher {
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
        let result = task.texture.bind(device, 0).and_then(|()| {
            self.program
                .draw(device, PrimitiveKind::Triangles, task.span.first, task.span.count)
        });
        if task.texture.is_one_shot() {
            task.texture.destroy(device);
        }
        result
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

    fn release_undrawn(&mut self, device: &mut dyn GraphicsDevice) {
        for task in self.tasks.remaining() {
            if task.texture.is_one_shot() {
                task.texture.destroy(device);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::paint::Bitmap;

    fn setup() -> (RecordingDevice, ImageBatcher) {
        let mut dev = RecordingDevice::new();
        dev.resize_surface(64, 64).unwrap();
        let batcher = ImageBatcher::new(&mut dev, 256).unwrap();
        (dev, batcher)
    }

    #[test]
    fn quad_maps_uv_corners() {
        let q = TexVertex::quad(Rect::new(10.0, 10.0, 4.0, 2.0), Rect::new(0.5, 0.0, 0.5, 1.0));
        assert_eq!(q[0], TexVertex { pos: [10.0, 10.0], uv: [0.5, 0.0] });
        assert_eq!(q[2], TexVertex { pos: [14.0, 12.0], uv: [1.0, 1.0] });
        assert_eq!(q[5], TexVertex { pos: [10.0, 12.0], uv: [0.5, 1.0] });
    }

    #[test]
    fn draw_binds_task_texture() {
        let (mut dev, mut batcher) = setup();
        let bmp = Bitmap::solid(2, 2, [255, 0, 0, 255]);
        let a = TextureResource::upload(&mut dev, &bmp, false).unwrap();
        let b = TextureResource::upload(&mut dev, &bmp, false).unwrap();
        batcher.add(a, Rect::new(0.0, 0.0, 2.0, 2.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        batcher.add(b, Rect::new(4.0, 0.0, 2.0, 2.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        batcher.upload_to_device(&mut dev).unwrap();

        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        batcher.draw_next(&mut dev).unwrap();
        let textures: Vec<_> = dev.draws().map(|d| d.texture).collect();
        assert_eq!(textures, vec![Some(a.id()), Some(b.id())]);
        assert_eq!(dev.live_textures(), 2);
    }

    #[test]
    fn one_shot_texture_dies_after_its_draw() {
        let (mut dev, mut batcher) = setup();
        let bmp = Bitmap::solid(1, 1, [0, 0, 0, 255]);
        let once = TextureResource::upload(&mut dev, &bmp, true).unwrap();
        batcher.add(once, Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        batcher.upload_to_device(&mut dev).unwrap();
        dev.begin_frame().unwrap();
        batcher.draw_next(&mut dev).unwrap();
        assert!(!dev.has_texture(once.id()));
    }

    #[test]
    fn undrawn_one_shot_textures_are_released() {
        let (mut dev, mut batcher) = setup();
        let bmp = Bitmap::solid(1, 1, [0, 0, 0, 255]);
        let once = TextureResource::upload(&mut dev, &bmp, true).unwrap();
        let kept = TextureResource::upload(&mut dev, &bmp, false).unwrap();
        batcher.add(kept, Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        batcher.add(once, Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        batcher.release_undrawn(&mut dev);
        assert!(!dev.has_texture(once.id()));
        assert!(dev.has_texture(kept.id()));
    }
}
