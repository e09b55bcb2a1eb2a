use rustc_hash::FxHashMap;

use super::VertexArrayBinding;
use crate::device::{
    AttributeLayout, AttributeLocation, BufferRole, GraphicsDevice, PrimitiveKind, ProgramId,
    ShaderStage, UniformLocation, UniformValue,
};
use crate::error::{GraphicError, Result};

/// WGSL sources of a program. Entry points are `vs_main` and `fs_main`.
#[derive(Debug, Copy, Clone)]
pub struct ShaderSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

/// Linked program with cached attribute/uniform locations and the vertex
/// array it draws from.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    label: &'static str,
    attributes: FxHashMap<String, AttributeLocation>,
    uniforms: FxHashMap<String, UniformLocation>,
    vertex_array: VertexArrayBinding,
}

impl ShaderProgram {
    /// Compiles both stages and links them.
    ///
    /// Fails with [`GraphicError::Compile`] or [`GraphicError::Link`]; nothing
    /// is retried and no device object is leaked on failure.
    pub fn new(
        device: &mut dyn GraphicsDevice,
        label: &'static str,
        source: &ShaderSource<'_>,
        vertex_array: VertexArrayBinding,
    ) -> Result<Self> {
        let vs = match device.compile_shader(ShaderStage::Vertex, source.vertex) {
            Ok(id) => id,
            Err(log) => {
                vertex_array.destroy(device);
                return Err(GraphicError::Compile {
                    program: label,
                    stage: ShaderStage::Vertex,
                    log,
                });
            }
        };
        let fs = match device.compile_shader(ShaderStage::Fragment, source.fragment) {
            Ok(id) => id,
            Err(log) => {
                device.destroy_shader(vs);
                vertex_array.destroy(device);
                return Err(GraphicError::Compile {
                    program: label,
                    stage: ShaderStage::Fragment,
                    log,
                });
            }
        };

        let linked = device.link_program(label, vs, fs);
        device.destroy_shader(vs);
        device.destroy_shader(fs);

        match linked {
            Ok(id) => {
                log::debug!("program `{label}` linked");
                Ok(Self {
                    id,
                    label,
                    attributes: FxHashMap::default(),
                    uniforms: FxHashMap::default(),
                    vertex_array,
                })
            }
            Err(log) => {
                vertex_array.destroy(device);
                Err(GraphicError::Link { program: label, log })
            }
        }
    }

    #[inline]
    pub fn id(&self) -> ProgramId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn vertex_array(&self) -> &VertexArrayBinding {
        &self.vertex_array
    }

    pub fn vertex_array_mut(&mut self) -> &mut VertexArrayBinding {
        &mut self.vertex_array
    }

    /// Swaps the attached vertex array and returns the previous one.
    pub fn attach_vertex_array(&mut self, vertex_array: VertexArrayBinding) -> VertexArrayBinding {
        std::mem::replace(&mut self.vertex_array, vertex_array)
    }

    fn uniform_location(
        &mut self,
        device: &dyn GraphicsDevice,
        name: &str,
    ) -> Result<UniformLocation> {
        if let Some(loc) = self.uniforms.get(name) {
            return Ok(*loc);
        }
        let loc = device
            .uniform_location(self.id, name)
            .ok_or_else(|| GraphicError::UniformNotFound {
                program: self.label,
                name: name.to_string(),
            })?;
        self.uniforms.insert(name.to_string(), loc);
        Ok(loc)
    }

    fn attribute_location(
        &mut self,
        device: &dyn GraphicsDevice,
        name: &str,
    ) -> Result<AttributeLocation> {
        if let Some(loc) = self.attributes.get(name) {
            return Ok(*loc);
        }
        let loc = device
            .attribute_location(self.id, name)
            .ok_or_else(|| GraphicError::AttributeNotFound {
                program: self.label,
                name: name.to_string(),
            })?;
        self.attributes.insert(name.to_string(), loc);
        Ok(loc)
    }

    /// Sets a uniform by name.
    pub fn set_uniform(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        value: UniformValue,
    ) -> Result<()> {
        let loc = self.uniform_location(device, name)?;
        device.use_program(Some(self.id))?;
        let result = device.set_uniform(loc, &value);
        device.use_program(None)?;
        result?;
        Ok(())
    }

    /// Points attribute `name` at the `role` buffer of the attached vertex array.
    pub fn set_attribute(
        &mut self,
        device: &mut dyn GraphicsDevice,
        role: BufferRole,
        name: &str,
        layout: AttributeLayout,
    ) -> Result<()> {
        let loc = self.attribute_location(device, name)?;
        self.vertex_array.bind(device)?;
        let result = self
            .vertex_array
            .bind_buffer(device, role)
            .and_then(|()| device.vertex_attribute(loc, layout).map_err(GraphicError::from));
        if result.is_ok() {
            self.vertex_array.unbind_buffer(device, role)?;
        }
        self.vertex_array.unbind(device)?;
        result
    }

    fn activate<'a>(&'a mut self, device: &'a mut dyn GraphicsDevice) -> Result<ActiveProgram<'a>> {
        device.use_program(Some(self.id))?;
        let mut active = ActiveProgram {
            device,
            vertex_array: &mut self.vertex_array,
        };
        active.vertex_array.bind(&mut *active.device)?;
        Ok(active)
    }

    /// Draws `count` vertices starting at `first`.
    pub fn draw(
        &mut self,
        device: &mut dyn GraphicsDevice,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<()> {
        let mut active = self.activate(device)?;
        active.device.draw_arrays(primitive, first, count)?;
        Ok(())
    }

    /// Draws `count` indices from the attached `Index` buffer starting at `first`.
    pub fn draw_indexed(
        &mut self,
        device: &mut dyn GraphicsDevice,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<()> {
        if self.vertex_array.buffer(BufferRole::Index).is_none() {
            return Err(GraphicError::Config(format!(
                "{}: indexed draw without an index buffer",
                self.label
            )));
        }
        let mut active = self.activate(device)?;
        active
            .vertex_array
            .bind_buffer(&mut *active.device, BufferRole::Index)?;
        active.device.draw_elements(primitive, first, count)?;
        Ok(())
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_program(self.id);
        self.vertex_array.destroy(device);
    }
}

/// Program and vertex array bound for the lifetime of the guard.
struct ActiveProgram<'a> {
    device: &'a mut dyn GraphicsDevice,
    vertex_array: &'a mut VertexArrayBinding,
}

impl Drop for ActiveProgram<'_> {
    fn drop(&mut self) {
        if self.vertex_array.is_bound() {
            let _ = self.vertex_array.unbind(&mut *self.device);
        }
        let _ = self.device.use_program(None);
    }
}
