//! In-memory device that validates and records every call.
//!
//! Used by the test-suite and as a debug backend: it enforces the binding
//! model of [`GraphicsDevice`] (frame protocol, bound program and vertex
//! array, uniform types, buffer bounds) and keeps enough state to inspect
//! exactly what each draw would have read.

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::reflect::{self, ProgramLayout, StageReflection};
use super::{
    AttributeLayout, AttributeLocation, BufferId, BufferRole, BufferUsage, DeviceError,
    GraphicsDevice, PrimitiveKind, ProgramId, ScissorRect, ShaderId, ShaderStage, TextureId,
    UniformLocation, UniformValue, VertexArrayId,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { id: BufferId, role: BufferRole, size: usize },
    DestroyBuffer(BufferId),
    WriteBuffer { id: BufferId, offset: usize, len: usize },
    CreateTexture { id: TextureId, width: u32, height: u32 },
    DestroyTexture(TextureId),
    LinkProgram { id: ProgramId, label: String },
    SetUniform { program: String, name: String, value: UniformValue },
    SetScissor(Option<ScissorRect>),
    Draw(DrawCall),
    ResizeSurface { width: u32, height: u32 },
    BeginFrame,
    EndFrame,
}

/// Snapshot of a draw: bound state plus the attribute data it fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub program_label: String,
    pub primitive: PrimitiveKind,
    pub first: u32,
    pub count: u32,
    pub indexed: bool,
    pub texture: Option<TextureId>,
    pub scissor: Option<ScissorRect>,
    pub uniforms: Vec<(String, UniformValue)>,
    /// Per attribute name, the fetched components of every drawn vertex.
    pub attributes: Vec<(String, Vec<f32>)>,
}

impl DrawCall {
    pub fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn attribute(&self, name: &str) -> Option<&[f32]> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Two-component attribute as points.
    pub fn points(&self, name: &str) -> Vec<[f32; 2]> {
        self.attribute(name)
            .map(|v| v.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct BufferState {
    role: BufferRole,
    data: Vec<u8>,
    /// High-water mark of bytes written since creation.
    written: usize,
}

#[derive(Debug, Default)]
struct VertexArrayState {
    attributes: FxHashMap<u32, (BufferId, AttributeLayout)>,
    index_buffer: Option<BufferId>,
}

#[derive(Debug)]
struct ProgramState {
    label: String,
    layout: ProgramLayout,
    values: Vec<Option<UniformValue>>,
}

#[derive(Debug)]
struct TextureState {
    width: u32,
    height: u32,
}

const MAX_TEXTURE_UNITS: u32 = 16;

#[derive(Debug)]
pub struct RecordingDevice {
    buffers: SlotMap<BufferId, BufferState>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArrayState>,
    shaders: SlotMap<ShaderId, StageReflection>,
    programs: SlotMap<ProgramId, ProgramState>,
    textures: SlotMap<TextureId, TextureState>,

    array_buffer: Option<BufferId>,
    vertex_array: Option<VertexArrayId>,
    program: Option<ProgramId>,
    texture_units: FxHashMap<u32, TextureId>,
    scissor: Option<ScissorRect>,

    surface: (u32, u32),
    surface_available: bool,
    in_frame: bool,
    frames: u64,

    fail_writes: bool,
    failing_draws: usize,

    calls: Vec<DeviceCall>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            array_buffer: None,
            vertex_array: None,
            program: None,
            texture_units: FxHashMap::default(),
            scissor: None,
            surface: (0, 0),
            surface_available: true,
            in_frame: false,
            frames: 0,
            fail_writes: false,
            failing_draws: 0,
            calls: Vec::new(),
        }
    }

    // ── failure injection ─────────────────────────────────────────────────

    /// Makes every subsequent buffer write fail.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Makes the next `n` draws fail with a backend error.
    pub fn fail_next_draws(&mut self, n: usize) {
        self.failing_draws = n;
    }

    /// When `false`, the surface cannot be resized or drawn to.
    pub fn set_surface_available(&mut self, available: bool) {
        self.surface_available = available;
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.calls.iter().filter_map(|c| match c {
            DeviceCall::Draw(d) => Some(d),
            _ => None,
        })
    }

    /// Draws recorded since the last `BeginFrame`.
    pub fn last_frame_draws(&self) -> Vec<&DrawCall> {
        let start = self
            .calls
            .iter()
            .rposition(|c| matches!(c, DeviceCall::BeginFrame))
            .map_or(0, |i| i + 1);
        self.calls[start..]
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Draw(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn buffer_size(&self, id: BufferId) -> Option<usize> {
        self.buffers.get(id).map(|b| b.data.len())
    }

    pub fn buffer_contents(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(id).map(|b| &b.data[..b.written])
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(id).map(|t| (t.width, t.height))
    }

    pub fn has_texture(&self, id: TextureId) -> bool {
        self.textures.contains_key(id)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    // ── draw validation ───────────────────────────────────────────────────

    fn snapshot_draw(
        &self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
        indexed: bool,
    ) -> Result<DrawCall, DeviceError> {
        if !self.in_frame {
            return Err(DeviceError::InvalidState("draw outside of a frame"));
        }
        let program_id = self
            .program
            .ok_or(DeviceError::InvalidState("no program in use"))?;
        let program = self
            .programs
            .get(program_id)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
        let vao_id = self
            .vertex_array
            .ok_or(DeviceError::InvalidState("no vertex array bound"))?;
        let vao = self
            .vertex_arrays
            .get(vao_id)
            .ok_or(DeviceError::InvalidHandle { kind: "vertex array" })?;

        let vertices: Vec<u32> = if indexed {
            let ib_id = vao
                .index_buffer
                .ok_or(DeviceError::InvalidState("no index buffer bound"))?;
            let ib = self
                .buffers
                .get(ib_id)
                .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
            let start = first as usize * 4;
            let end = start + count as usize * 4;
            if end > ib.written {
                return Err(DeviceError::OutOfBounds {
                    offset: start,
                    len: end - start,
                    capacity: ib.written,
                });
            }
            ib.data[start..end]
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<u32>)
                .collect()
        } else {
            (first..first + count).collect()
        };

        let mut attributes = Vec::with_capacity(program.layout.attributes.len());
        for input in &program.layout.attributes {
            let (buffer_id, layout) = vao
                .attributes
                .get(&input.location)
                .ok_or(DeviceError::InvalidState("program attribute has no vertex data"))?;
            let buffer = self
                .buffers
                .get(*buffer_id)
                .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;

            let stride = layout.effective_stride() as usize;
            let width = layout.components as usize * 4;
            let mut fetched = Vec::with_capacity(vertices.len() * layout.components as usize);
            for &v in &vertices {
                let at = layout.offset as usize + stride * v as usize;
                if at + width > buffer.written {
                    return Err(DeviceError::OutOfBounds {
                        offset: at,
                        len: width,
                        capacity: buffer.written,
                    });
                }
                for c in 0..layout.components as usize {
                    let b = at + c * 4;
                    fetched.push(bytemuck::pod_read_unaligned::<f32>(&buffer.data[b..b + 4]));
                }
            }
            attributes.push((input.name.clone(), fetched));
        }

        let texture = if program.layout.samples_texture {
            let id = *self
                .texture_units
                .get(&0)
                .ok_or(DeviceError::InvalidState("no texture bound to unit 0"))?;
            if !self.textures.contains_key(id) {
                return Err(DeviceError::InvalidHandle { kind: "texture" });
            }
            Some(id)
        } else {
            None
        };

        let uniforms = program
            .layout
            .uniforms
            .iter()
            .zip(&program.values)
            .filter_map(|(field, value)| (*value).map(|v| (field.name.clone(), v)))
            .collect();

        Ok(DrawCall {
            program: program_id,
            program_label: program.label.clone(),
            primitive,
            first,
            count,
            indexed,
            texture,
            scissor: self.scissor,
            uniforms,
            attributes,
        })
    }

    fn draw(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
        indexed: bool,
    ) -> Result<(), DeviceError> {
        if self.failing_draws > 0 {
            self.failing_draws -= 1;
            return Err(DeviceError::Backend("injected draw failure".to_string()));
        }
        let call = self.snapshot_draw(primitive, first, count, indexed)?;
        self.calls.push(DeviceCall::Draw(call));
        Ok(())
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(
        &mut self,
        role: BufferRole,
        _usage: BufferUsage,
        size: usize,
    ) -> Result<BufferId, DeviceError> {
        let id = self.buffers.insert(BufferState {
            role,
            data: vec![0; size],
            written: 0,
        });
        self.calls.push(DeviceCall::CreateBuffer { id, role, size });
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        if self.buffers.remove(id).is_some() {
            if self.array_buffer == Some(id) {
                self.array_buffer = None;
            }
            self.calls.push(DeviceCall::DestroyBuffer(id));
        }
    }

    fn write_buffer(
        &mut self,
        id: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        if self.fail_writes {
            return Err(DeviceError::Backend("injected write failure".to_string()));
        }
        let buffer = self
            .buffers
            .get_mut(id)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        let end = offset + data.len();
        if end > buffer.data.len() {
            return Err(DeviceError::OutOfBounds {
                offset,
                len: data.len(),
                capacity: buffer.data.len(),
            });
        }
        buffer.data[offset..end].copy_from_slice(data);
        buffer.written = buffer.written.max(end);
        self.calls.push(DeviceCall::WriteBuffer { id, offset, len: data.len() });
        Ok(())
    }

    fn bind_buffer(&mut self, role: BufferRole, id: Option<BufferId>) -> Result<(), DeviceError> {
        if let Some(id) = id {
            let buffer = self
                .buffers
                .get(id)
                .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
            if buffer.role.is_index() != role.is_index() {
                return Err(DeviceError::InvalidState("buffer bound to the wrong target"));
            }
        }

        if role.is_index() {
            let vao_id = self
                .vertex_array
                .ok_or(DeviceError::InvalidState("index buffer needs a bound vertex array"))?;
            let vao = self
                .vertex_arrays
                .get_mut(vao_id)
                .ok_or(DeviceError::InvalidHandle { kind: "vertex array" })?;
            vao.index_buffer = id;
        } else {
            self.array_buffer = id;
        }
        Ok(())
    }

    fn create_vertex_array(&mut self) -> Result<VertexArrayId, DeviceError> {
        Ok(self.vertex_arrays.insert(VertexArrayState::default()))
    }

    fn destroy_vertex_array(&mut self, id: VertexArrayId) {
        self.vertex_arrays.remove(id);
        if self.vertex_array == Some(id) {
            self.vertex_array = None;
        }
    }

    fn bind_vertex_array(&mut self, id: Option<VertexArrayId>) -> Result<(), DeviceError> {
        if let Some(id) = id {
            if !self.vertex_arrays.contains_key(id) {
                return Err(DeviceError::InvalidHandle { kind: "vertex array" });
            }
        }
        self.vertex_array = id;
        Ok(())
    }

    fn vertex_attribute(
        &mut self,
        location: AttributeLocation,
        layout: AttributeLayout,
    ) -> Result<(), DeviceError> {
        if !(1..=4).contains(&layout.components) {
            return Err(DeviceError::Unsupported(format!(
                "{} attribute components",
                layout.components
            )));
        }
        let buffer = self
            .array_buffer
            .ok_or(DeviceError::InvalidState("no array buffer bound"))?;
        let vao_id = self
            .vertex_array
            .ok_or(DeviceError::InvalidState("no vertex array bound"))?;
        let vao = self
            .vertex_arrays
            .get_mut(vao_id)
            .ok_or(DeviceError::InvalidHandle { kind: "vertex array" })?;
        vao.attributes.insert(location.0, (buffer, layout));
        Ok(())
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let reflection = reflect::reflect_stage(stage, source)?;
        Ok(self.shaders.insert(reflection))
    }

    fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(id);
    }

    fn link_program(
        &mut self,
        label: &str,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, String> {
        let vs = self.shaders.get(vertex).ok_or("invalid vertex shader handle")?;
        let fs = self.shaders.get(fragment).ok_or("invalid fragment shader handle")?;
        let layout = reflect::link(vs, fs)?;
        let values = vec![None; layout.uniforms.len()];
        let id = self.programs.insert(ProgramState {
            label: label.to_string(),
            layout,
            values,
        });
        self.calls.push(DeviceCall::LinkProgram { id, label: label.to_string() });
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(id);
        if self.program == Some(id) {
            self.program = None;
        }
    }

    fn use_program(&mut self, id: Option<ProgramId>) -> Result<(), DeviceError> {
        if let Some(id) = id {
            if !self.programs.contains_key(id) {
                return Err(DeviceError::InvalidHandle { kind: "program" });
            }
        }
        self.program = id;
        Ok(())
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<AttributeLocation> {
        let program = self.programs.get(program)?;
        program.layout.attribute(name).map(|a| AttributeLocation(a.location))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let state = self.programs.get(program)?;
        state.layout.uniform_index(name).map(|index| UniformLocation {
            program,
            index: index as u32,
        })
    }

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: &UniformValue,
    ) -> Result<(), DeviceError> {
        if self.program != Some(location.program) {
            return Err(DeviceError::InvalidState("uniform location of a program not in use"));
        }
        let program = self
            .programs
            .get_mut(location.program)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
        let index = location.index as usize;
        let field = program
            .layout
            .uniforms
            .get(index)
            .ok_or(DeviceError::InvalidHandle { kind: "uniform" })?;
        if !field.kind.accepts(value) {
            return Err(DeviceError::InvalidState("uniform type mismatch"));
        }
        let name = field.name.clone();
        program.values[index] = Some(*value);
        self.calls.push(DeviceCall::SetUniform {
            program: program.label.clone(),
            name,
            value: *value,
        });
        Ok(())
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureId, DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::Unsupported("zero-sized texture".to_string()));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(DeviceError::OutOfBounds {
                offset: 0,
                len: rgba.len(),
                capacity: expected,
            });
        }
        let id = self.textures.insert(TextureState { width, height });
        self.calls.push(DeviceCall::CreateTexture { id, width, height });
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(id).is_some() {
            self.texture_units.retain(|_, bound| *bound != id);
            self.calls.push(DeviceCall::DestroyTexture(id));
        }
    }

    fn bind_texture(&mut self, unit: u32, id: Option<TextureId>) -> Result<(), DeviceError> {
        if unit >= MAX_TEXTURE_UNITS {
            return Err(DeviceError::Unsupported(format!("texture unit {unit}")));
        }
        match id {
            Some(id) => {
                if !self.textures.contains_key(id) {
                    return Err(DeviceError::InvalidHandle { kind: "texture" });
                }
                self.texture_units.insert(unit, id);
            }
            None => {
                self.texture_units.remove(&unit);
            }
        }
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        if !self.surface_available || width == 0 || height == 0 {
            return Err(DeviceError::NoSurface);
        }
        self.surface = (width, height);
        self.calls.push(DeviceCall::ResizeSurface { width, height });
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<(), DeviceError> {
        if self.in_frame {
            return Err(DeviceError::InvalidState("frame already begun"));
        }
        if !self.surface_available || self.surface.0 == 0 || self.surface.1 == 0 {
            return Err(DeviceError::NoSurface);
        }
        self.in_frame = true;
        self.scissor = None;
        self.calls.push(DeviceCall::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        if !self.in_frame {
            return Err(DeviceError::InvalidState("no frame to end"));
        }
        self.in_frame = false;
        self.frames += 1;
        self.calls.push(DeviceCall::EndFrame);
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.scissor = rect;
        self.calls.push(DeviceCall::SetScissor(rect));
    }

    fn draw_arrays(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError> {
        self.draw(primitive, first, count, false)
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError> {
        self.draw(primitive, first, count, true)
    }
}
