use std::fmt;

use super::DeviceError;

slotmap::new_key_type! {
    /// Device buffer handle.
    pub struct BufferId;
    /// Vertex array (attribute binding set) handle.
    pub struct VertexArrayId;
    /// Compiled shader stage handle.
    pub struct ShaderId;
    /// Linked program handle.
    pub struct ProgramId;
    /// Texture handle.
    pub struct TextureId;
}

/// What a buffer holds, and which bind target it uses.
///
/// `Index` buffers bind to the element target of the current vertex array.
/// The other roles bind to the array target.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BufferRole {
    Position,
    Color,
    TexCoord,
    Index,
}

impl BufferRole {
    #[inline]
    pub fn is_index(self) -> bool {
        matches!(self, BufferRole::Index)
    }
}

/// Update-frequency hint passed through to the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PrimitiveKind {
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

/// Resolved vertex attribute slot of a linked program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeLocation(pub u32);

/// Resolved uniform slot of a linked program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation {
    pub program: ProgramId,
    pub index: u32,
}

/// Layout of one float attribute inside the currently bound array buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct AttributeLayout {
    /// 1 to 4 `f32` components.
    pub components: u8,
    pub normalized: bool,
    /// Bytes between consecutive vertices. Zero means tightly packed.
    pub stride: u32,
    pub offset: u32,
}

impl AttributeLayout {
    #[inline]
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            self.components as u32 * 4
        } else {
            self.stride
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    Mat4([f32; 16]),
}

impl UniformValue {
    /// Raw bytes as laid out in a uniform block.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Int(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v),
            UniformValue::Vec4(v) => bytemuck::cast_slice(v),
            UniformValue::Mat4(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Scissor box in device pixels, bottom-left origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Host graphics context.
///
/// GL-shaped, state-machine model: programs, vertex arrays, buffers and
/// textures are bound, then a draw reads whatever is bound. Every call
/// happens on the thread that owns the device.
///
/// Frame protocol: `begin_frame`, any number of draws, `end_frame`. Scissor
/// state resets to "disabled" at `begin_frame`.
pub trait GraphicsDevice {
    // ── buffers ───────────────────────────────────────────────────────────

    fn create_buffer(
        &mut self,
        role: BufferRole,
        usage: BufferUsage,
        size: usize,
    ) -> Result<BufferId, DeviceError>;

    fn destroy_buffer(&mut self, id: BufferId);

    fn write_buffer(&mut self, id: BufferId, offset: usize, data: &[u8])
        -> Result<(), DeviceError>;

    /// Binds (or with `None`, unbinds) the target that `role` maps to.
    fn bind_buffer(&mut self, role: BufferRole, id: Option<BufferId>) -> Result<(), DeviceError>;

    // ── vertex arrays ─────────────────────────────────────────────────────

    fn create_vertex_array(&mut self) -> Result<VertexArrayId, DeviceError>;

    fn destroy_vertex_array(&mut self, id: VertexArrayId);

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<(), DeviceError>;

    /// Records `layout` for `location` in the bound vertex array, reading from
    /// the bound array buffer.
    fn vertex_attribute(
        &mut self,
        location: AttributeLocation,
        layout: AttributeLayout,
    ) -> Result<(), DeviceError>;

    // ── shaders and programs ──────────────────────────────────────────────

    /// Compiles one stage. The error is the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String>;

    fn destroy_shader(&mut self, id: ShaderId);

    /// Links two compiled stages. The error is the linker log.
    fn link_program(
        &mut self,
        label: &str,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, String>;

    fn destroy_program(&mut self, id: ProgramId);

    fn use_program(&mut self, id: Option<ProgramId>) -> Result<(), DeviceError>;

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation>;

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Sets a uniform of the program currently in use.
    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), DeviceError>;

    // ── textures ──────────────────────────────────────────────────────────

    /// Creates an RGBA8 texture from straight-alpha pixels.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureId, DeviceError>;

    fn destroy_texture(&mut self, id: TextureId);

    fn bind_texture(&mut self, unit: u32, id: Option<TextureId>) -> Result<(), DeviceError>;

    // ── frame ─────────────────────────────────────────────────────────────

    /// Resizes the drawable surface (physical pixels).
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError>;

    fn begin_frame(&mut self) -> Result<(), DeviceError>;

    fn end_frame(&mut self) -> Result<(), DeviceError>;

    /// `None` disables scissoring.
    fn set_scissor(&mut self, rect: Option<ScissorRect>);

    // ── draws ─────────────────────────────────────────────────────────────

    fn draw_arrays(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError>;

    /// Draws `count` `u32` indices starting at index `first` of the bound index buffer.
    fn draw_elements(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError>;
}
