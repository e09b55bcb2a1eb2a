//! wgpu host adapter.
//!
//! Maps the bind-then-draw device model onto wgpu:
//! - draws are recorded as self-contained ops (pipeline, buffers, uniform
//!   snapshot offset, texture bind group, scissor) and encoded in a single
//!   render pass at `end_frame`
//! - each program keeps a CPU copy of its uniform block; every draw copies
//!   the block into a per-frame arena bound with a dynamic offset
//! - pipelines are built lazily per (program, vertex layout, topology)
//!
//! Rendering goes to an offscreen target texture sized by `resize_surface`.
//! Hosts that present to a window copy or sample from [`WgpuDevice::target_texture`].

use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::reflect::{self, ProgramLayout, StageReflection};
use super::{
    AttributeLayout, AttributeLocation, BufferId, BufferRole, BufferUsage, DeviceError,
    GraphicsDevice, PrimitiveKind, ProgramId, ScissorRect, ShaderId, ShaderStage, TextureId,
    UniformLocation, UniformValue, VertexArrayId,
};

/// Initialization parameters for [`WgpuDevice`].
#[derive(Debug, Clone)]
pub struct WgpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Format of the offscreen render target.
    pub target_format: wgpu::TextureFormat,

    /// Color the target is cleared to at the start of each frame.
    ///
    /// `None` keeps the previous frame's contents.
    pub clear_color: Option<wgpu::Color>,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            target_format: wgpu::TextureFormat::Rgba8Unorm,
            clear_color: Some(wgpu::Color::BLACK),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        }
    }
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    role: BufferRole,
}

#[derive(Default)]
struct VertexArrayEntry {
    attributes: BTreeMap<u32, (BufferId, AttributeLayout)>,
    index_buffer: Option<BufferId>,
}

struct ShaderEntry {
    reflection: StageReflection,
    module: Rc<wgpu::ShaderModule>,
}

struct ProgramEntry {
    label: String,
    layout: ProgramLayout,
    vertex: Rc<wgpu::ShaderModule>,
    fragment: Rc<wgpu::ShaderModule>,
    block: Vec<u8>,
}

struct TextureEntry {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct VertexGroupKey {
    stride: u32,
    /// (shader location, components, offset)
    attributes: Vec<(u32, u8, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    topology: PrimitiveKind,
    groups: Vec<VertexGroupKey>,
}

struct DrawOp {
    pipeline: wgpu::RenderPipeline,
    vertex_buffers: Vec<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    uniform_offset: u32,
    texture: wgpu::BindGroup,
    scissor: Option<ScissorRect>,
    first: u32,
    count: u32,
}

/// [`GraphicsDevice`] backed by wgpu, rendering to an offscreen texture.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    init: WgpuInit,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    fallback_texture: TextureEntry,

    buffers: SlotMap<BufferId, BufferEntry>,
    vertex_arrays: SlotMap<VertexArrayId, VertexArrayEntry>,
    shaders: SlotMap<ShaderId, ShaderEntry>,
    programs: SlotMap<ProgramId, ProgramEntry>,
    textures: SlotMap<TextureId, TextureEntry>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,

    array_buffer: Option<BufferId>,
    vertex_array: Option<VertexArrayId>,
    program: Option<ProgramId>,
    texture_unit0: Option<TextureId>,
    scissor: Option<ScissorRect>,

    target: Option<Target>,
    in_frame: bool,
    ops: Vec<DrawOp>,
    uniform_arena: Vec<u8>,
    uniform_buffer: Option<(wgpu::Buffer, wgpu::BindGroup, u64, u64)>,
}

impl WgpuDevice {
    /// Creates a headless device on the best available adapter.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new_headless(init: WgpuInit) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("strata device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        log::info!("wgpu adapter: {:?}", adapter.get_info().name);
        Ok(Self::from_parts(device, queue, init))
    }

    /// Blocking wrapper around [`WgpuDevice::new_headless`].
    pub fn new_headless_blocking(init: WgpuInit) -> Result<Self> {
        pollster::block_on(Self::new_headless(init))
    }

    /// Wraps an existing device/queue pair (e.g. one shared with a windowing host).
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue, init: WgpuInit) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strata uniform bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("strata texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("strata pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("strata sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let fallback_texture = upload_texture(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            1,
            1,
            &[255, 255, 255, 255],
        );

        Self {
            device,
            queue,
            init,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            fallback_texture,
            buffers: SlotMap::with_key(),
            vertex_arrays: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            pipelines: FxHashMap::default(),
            array_buffer: None,
            vertex_array: None,
            program: None,
            texture_unit0: None,
            scissor: None,
            target: None,
            in_frame: false,
            ops: Vec::new(),
            uniform_arena: Vec::new(),
            uniform_buffer: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_texture(&self) -> Option<&wgpu::Texture> {
        self.target.as_ref().map(|t| &t.texture)
    }

    pub fn target_view(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref().map(|t| &t.view)
    }

    /// Copies the render target back to the CPU as tightly packed RGBA rows.
    pub fn read_target_rgba(&self) -> Result<(u32, u32, Vec<u8>)> {
        let target = self.target.as_ref().context("no render target")?;
        let (width, height) = (target.width, target.height);
        let padded_row = padded_row_bytes(width);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            })
            .context("failed to wait for readback")?;
        rx.recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for row in 0..height as usize {
            let start = row * padded_row as usize;
            pixels.extend_from_slice(&data[start..start + width as usize * 4]);
        }
        drop(data);
        staging.unmap();

        Ok((width, height, pixels))
    }

    fn pipeline_for(&mut self, key: &PipelineKey) -> Result<wgpu::RenderPipeline, DeviceError> {
        if let Some(p) = self.pipelines.get(key) {
            return Ok(p.clone());
        }
        let program = self
            .programs
            .get(key.program)
            .ok_or(DeviceError::InvalidHandle { kind: "program" })?;

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = key
            .groups
            .iter()
            .map(|g| {
                g.attributes
                    .iter()
                    .map(|&(location, components, offset)| wgpu::VertexAttribute {
                        format: float_format(components),
                        offset: offset as u64,
                        shader_location: location,
                    })
                    .collect()
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .groups
            .iter()
            .zip(&attributes)
            .map(|(g, attrs)| wgpu::VertexBufferLayout {
                array_stride: g.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let (topology, strip_index_format) = topology_of(key.topology);

        let label = format!("strata {} pipeline", program.label);
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.pipeline_layout),

            vertex: wgpu::VertexState {
                module: &program.vertex,
                entry_point: Some(reflect::VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &buffers,
            },

            fragment: Some(wgpu::FragmentState {
                module: &program.fragment,
                entry_point: Some(reflect::FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.init.target_format,
                    blend: Some(premul_alpha_blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology,
                strip_index_format,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!("built pipeline for {} ({:?})", program.label, key.topology);
        self.pipelines.insert(key.clone(), pipeline.clone());
        Ok(pipeline)
    }

    fn record_draw(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
        indexed: bool,
    ) -> Result<(), DeviceError> {
        if !self.in_frame {
            return Err(DeviceError::InvalidState("draw outside of a frame"));
        }
        let program_id = self
            .program
            .ok_or(DeviceError::InvalidState("no program in use"))?;
        let vao_id = self
            .vertex_array
            .ok_or(DeviceError::InvalidState("no vertex array bound"))?;

        let (key, vertex_buffers, index_buffer, samples_texture) = {
            let program = self
                .programs
                .get(program_id)
                .ok_or(DeviceError::InvalidHandle { kind: "program" })?;
            let vao = self
                .vertex_arrays
                .get(vao_id)
                .ok_or(DeviceError::InvalidHandle { kind: "vertex array" })?;

            // One vertex buffer slot per distinct source buffer, in location order.
            let mut slots: Vec<(BufferId, VertexGroupKey)> = Vec::new();
            for input in &program.layout.attributes {
                let (buffer, layout) = vao
                    .attributes
                    .get(&input.location)
                    .ok_or(DeviceError::InvalidState("program attribute has no vertex data"))?;
                let stride = layout.effective_stride();
                let attr = (input.location, layout.components, layout.offset);
                match slots.iter().position(|(b, g)| b == buffer && g.stride == stride) {
                    Some(i) => slots[i].1.attributes.push(attr),
                    None => {
                        slots.push((*buffer, VertexGroupKey { stride, attributes: vec![attr] }))
                    }
                }
            }

            let mut vertex_buffers = Vec::with_capacity(slots.len());
            for (id, _) in &slots {
                let entry = self
                    .buffers
                    .get(*id)
                    .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
                vertex_buffers.push(entry.buffer.clone());
            }

            let index_buffer = if indexed {
                let id = vao
                    .index_buffer
                    .ok_or(DeviceError::InvalidState("no index buffer bound"))?;
                let entry = self
                    .buffers
                    .get(id)
                    .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
                Some(entry.buffer.clone())
            } else {
                None
            };

            let key = PipelineKey {
                program: program_id,
                topology: primitive,
                groups: slots.into_iter().map(|(_, g)| g).collect(),
            };
            (key, vertex_buffers, index_buffer, program.layout.samples_texture)
        };

        let texture = if samples_texture {
            let id = self
                .texture_unit0
                .ok_or(DeviceError::InvalidState("no texture bound to unit 0"))?;
            self.textures
                .get(id)
                .ok_or(DeviceError::InvalidHandle { kind: "texture" })?
                .bind_group
                .clone()
        } else {
            self.fallback_texture.bind_group.clone()
        };

        let pipeline = self.pipeline_for(&key)?;

        let align = self.device.limits().min_uniform_buffer_offset_alignment as usize;
        let uniform_offset = self.uniform_arena.len().div_ceil(align) * align;
        self.uniform_arena.resize(uniform_offset, 0);
        if let Some(program) = self.programs.get(program_id) {
            self.uniform_arena.extend_from_slice(&program.block);
        }

        self.ops.push(DrawOp {
            pipeline,
            vertex_buffers,
            index_buffer,
            uniform_offset: uniform_offset as u32,
            texture,
            scissor: self.scissor,
            first,
            count,
        });
        Ok(())
    }

    /// Uploads the frame's uniform snapshots and returns the bind group to use.
    fn prepare_uniforms(&mut self) -> Option<wgpu::BindGroup> {
        let block = self
            .programs
            .values()
            .map(|p| p.block.len() as u64)
            .max()
            .unwrap_or(0)
            .max(16);
        if self.ops.is_empty() {
            return None;
        }
        let binding_size = block.div_ceil(16) * 16;
        let last_offset = self.ops.iter().map(|op| op.uniform_offset as u64).max().unwrap_or(0);
        let needed = (last_offset + binding_size).max(self.uniform_arena.len() as u64);
        self.uniform_arena.resize(needed as usize, 0);

        let reuse = matches!(
            &self.uniform_buffer,
            Some((_, _, cap, size)) if *cap >= needed && *size == binding_size
        );
        if !reuse {
            let capacity = needed.next_power_of_two().max(1024);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("strata uniform arena"),
                size: capacity,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("strata uniform bind group"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(binding_size),
                    }),
                }],
            });
            log::debug!("uniform arena grown to {capacity} bytes");
            self.uniform_buffer = Some((buffer, bind_group, capacity, binding_size));
        }

        let (buffer, bind_group, _, _) = self.uniform_buffer.as_ref()?;
        self.queue.write_buffer(buffer, 0, &self.uniform_arena);
        Some(bind_group.clone())
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(
        &mut self,
        role: BufferRole,
        _usage: BufferUsage,
        size: usize,
    ) -> Result<BufferId, DeviceError> {
        let usage = if role.is_index() {
            wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST
        } else {
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST
        };
        let size = aligned_buffer_size(size);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata vertex buffer"),
            size,
            usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(BufferEntry { buffer, role }))
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        // Pending draw ops hold their own handle; the allocation is released
        // once the frame that used it has been submitted.
        self.buffers.remove(id);
        if self.array_buffer == Some(id) {
            self.array_buffer = None;
        }
    }

    fn write_buffer(
        &mut self,
        id: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let entry = self
            .buffers
            .get(id)
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        let capacity = entry.buffer.size() as usize;
        if offset + data.len() > capacity {
            return Err(DeviceError::OutOfBounds { offset, len: data.len(), capacity });
        }
        if offset % 4 != 0 || data.len() % 4 != 0 {
            return Err(DeviceError::Unsupported("unaligned buffer write".to_string()));
        }
        if !data.is_empty() {
            self.queue.write_buffer(&entry.buffer, offset as u64, data);
        }
        Ok(())
    }

    fn bind_buffer(&mut self, role: BufferRole, id: Option<BufferId>) -> Result<(), DeviceError> {
        if let Some(id) = id {
            let entry = self
                .buffers
                .get(id)
                .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
            if entry.role.is_index() != role.is_index() {
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
        Ok(self.vertex_arrays.insert(VertexArrayEntry::default()))
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
        if layout.offset % 4 != 0 || layout.effective_stride() % 4 != 0 {
            return Err(DeviceError::Unsupported("unaligned vertex attribute".to_string()));
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
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match stage {
                ShaderStage::Vertex => "strata vertex shader",
                ShaderStage::Fragment => "strata fragment shader",
            }),
            source: wgpu::ShaderSource::Wgsl(source.to_owned().into()),
        });
        Ok(self.shaders.insert(ShaderEntry {
            reflection,
            module: Rc::new(module),
        }))
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
        let layout = reflect::link(&vs.reflection, &fs.reflection)?;
        let block = vec![0; layout.block_size as usize];
        let entry = ProgramEntry {
            label: label.to_string(),
            vertex: Rc::clone(&vs.module),
            fragment: Rc::clone(&fs.module),
            layout,
            block,
        };
        Ok(self.programs.insert(entry))
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(id);
        self.pipelines.retain(|key, _| key.program != id);
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
        let entry = self.programs.get(program)?;
        entry.layout.uniform_index(name).map(|index| UniformLocation {
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
        let field = program
            .layout
            .uniforms
            .get(location.index as usize)
            .ok_or(DeviceError::InvalidHandle { kind: "uniform" })?;
        if !field.kind.accepts(value) {
            return Err(DeviceError::InvalidState("uniform type mismatch"));
        }
        let bytes = value.as_bytes();
        let start = field.offset as usize;
        let end = start + bytes.len();
        if bytes.len() > field.size as usize || end > program.block.len() {
            return Err(DeviceError::OutOfBounds {
                offset: start,
                len: bytes.len(),
                capacity: program.block.len(),
            });
        }
        program.block[start..end].copy_from_slice(bytes);
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
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(DeviceError::Unsupported(format!(
                "{width}x{height} texture exceeds the {max} px limit"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(DeviceError::OutOfBounds { offset: 0, len: rgba.len(), capacity: expected });
        }
        let entry = upload_texture(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            width,
            height,
            rgba,
        );
        Ok(self.textures.insert(entry))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(id);
        if self.texture_unit0 == Some(id) {
            self.texture_unit0 = None;
        }
    }

    fn bind_texture(&mut self, unit: u32, id: Option<TextureId>) -> Result<(), DeviceError> {
        if unit != 0 {
            return Err(DeviceError::Unsupported(format!("texture unit {unit}")));
        }
        if let Some(id) = id {
            if !self.textures.contains_key(id) {
                return Err(DeviceError::InvalidHandle { kind: "texture" });
            }
        }
        self.texture_unit0 = id;
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), DeviceError> {
        if width == 0 || height == 0 {
            return Err(DeviceError::NoSurface);
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(DeviceError::Unsupported(format!(
                "{width}x{height} surface exceeds the {max} px limit"
            )));
        }
        if self.target.as_ref().is_some_and(|t| t.width == width && t.height == height) {
            return Ok(());
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("strata render target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.init.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.target = Some(Target { texture, view, width, height });
        log::debug!("render target resized to {width}x{height}");
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<(), DeviceError> {
        if self.in_frame {
            return Err(DeviceError::InvalidState("frame already begun"));
        }
        if self.target.is_none() {
            return Err(DeviceError::NoSurface);
        }
        self.in_frame = true;
        self.scissor = None;
        self.ops.clear();
        self.uniform_arena.clear();
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        if !self.in_frame {
            return Err(DeviceError::InvalidState("no frame to end"));
        }
        self.in_frame = false;

        let uniforms = self.prepare_uniforms();
        let ops = std::mem::take(&mut self.ops);
        let target = self.target.as_ref().ok_or(DeviceError::NoSurface)?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata frame encoder"),
            });
        {
            let load = match self.init.clear_color {
                Some(color) => wgpu::LoadOp::Clear(color),
                None => wgpu::LoadOp::Load,
            };
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("strata frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for op in &ops {
                let scissor = scissor_to_top_left(op.scissor, target.width, target.height);
                let Some((sx, sy, sw, sh)) = scissor else { continue };
                let Some(uniforms) = uniforms.as_ref() else { continue };

                rpass.set_scissor_rect(sx, sy, sw, sh);
                rpass.set_pipeline(&op.pipeline);
                rpass.set_bind_group(0, uniforms, &[op.uniform_offset]);
                rpass.set_bind_group(1, &op.texture, &[]);
                for (slot, buffer) in op.vertex_buffers.iter().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                let range = op.first..op.first + op.count;
                match &op.index_buffer {
                    Some(ib) => {
                        rpass.set_index_buffer(ib.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(range, 0, 0..1);
                    }
                    None => rpass.draw(range, 0..1),
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        log::trace!("submitted frame with {} draws", ops.len());
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) {
        self.scissor = rect;
    }

    fn draw_arrays(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError> {
        self.record_draw(primitive, first, count, false)
    }

    fn draw_elements(
        &mut self,
        primitive: PrimitiveKind,
        first: u32,
        count: u32,
    ) -> Result<(), DeviceError> {
        self.record_draw(primitive, first, count, true)
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> TextureEntry {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("strata texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("strata texture bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    TextureEntry {
        _texture: texture,
        bind_group,
    }
}

/// Bytes per readback row, padded to wgpu's copy alignment.
fn padded_row_bytes(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Copy sizes must be 4-byte aligned and non-zero.
fn aligned_buffer_size(size: usize) -> u64 {
    (size as u64).max(4).div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

fn topology_of(kind: PrimitiveKind) -> (wgpu::PrimitiveTopology, Option<wgpu::IndexFormat>) {
    match kind {
        PrimitiveKind::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
        PrimitiveKind::TriangleStrip => {
            (wgpu::PrimitiveTopology::TriangleStrip, Some(wgpu::IndexFormat::Uint32))
        }
        PrimitiveKind::Lines => (wgpu::PrimitiveTopology::LineList, None),
        PrimitiveKind::LineStrip => {
            (wgpu::PrimitiveTopology::LineStrip, Some(wgpu::IndexFormat::Uint32))
        }
        PrimitiveKind::Points => (wgpu::PrimitiveTopology::PointList, None),
    }
}

fn float_format(components: u8) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// Converts a bottom-left scissor box to wgpu's top-left convention, clamped
/// to the target. `None` means the full target. Returns `None` when the
/// clamped box is empty and the draw should be skipped.
fn scissor_to_top_left(
    scissor: Option<ScissorRect>,
    target_w: u32,
    target_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    let Some(s) = scissor else {
        return Some((0, 0, target_w, target_h));
    };
    let (tw, th) = (target_w as i64, target_h as i64);
    let x0 = (s.x as i64).clamp(0, tw);
    let x1 = (s.x as i64 + s.width.max(0) as i64).clamp(0, tw);
    let top = th - (s.y as i64 + s.height.max(0) as i64);
    let bottom = th - s.y as i64;
    let y0 = top.clamp(0, th);
    let y1 = bottom.clamp(0, th);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_flips_to_top_left() {
        // 100x50 box, 5 px from the left, 145 px from the bottom of a 200 px target.
        let s = ScissorRect { x: 5, y: 145, width: 100, height: 50 };
        assert_eq!(scissor_to_top_left(Some(s), 300, 200), Some((5, 5, 100, 50)));
    }

    #[test]
    fn scissor_is_clamped_and_empty_boxes_skip() {
        let s = ScissorRect { x: -10, y: -10, width: 20, height: 20 };
        assert_eq!(scissor_to_top_left(Some(s), 100, 100), Some((0, 90, 10, 10)));
        let outside = ScissorRect { x: 200, y: 0, width: 10, height: 10 };
        assert_eq!(scissor_to_top_left(Some(outside), 100, 100), None);
        assert_eq!(scissor_to_top_left(None, 64, 32), Some((0, 0, 64, 32)));
    }

    #[test]
    fn attribute_formats() {
        assert_eq!(float_format(1), wgpu::VertexFormat::Float32);
        assert_eq!(float_format(2), wgpu::VertexFormat::Float32x2);
        assert_eq!(float_format(3), wgpu::VertexFormat::Float32x3);
        assert_eq!(float_format(4), wgpu::VertexFormat::Float32x4);
    }

    #[test]
    fn readback_rows_are_padded() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
    }

    #[test]
    fn buffer_sizes_are_copy_aligned() {
        assert_eq!(aligned_buffer_size(0), 4);
        assert_eq!(aligned_buffer_size(5), 8);
        assert_eq!(aligned_buffer_size(24), 24);
    }

    #[test]
    fn strips_restart_on_u32_indices() {
        assert_eq!(
            topology_of(PrimitiveKind::Triangles),
            (wgpu::PrimitiveTopology::TriangleList, None)
        );
        assert_eq!(topology_of(PrimitiveKind::LineStrip).1, Some(wgpu::IndexFormat::Uint32));
        assert_eq!(topology_of(PrimitiveKind::Points).0, wgpu::PrimitiveTopology::PointList);
    }

    #[test]
    fn blend_is_premultiplied_over() {
        let blend = premul_alpha_blend();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.alpha, blend.color);
    }

    #[test]
    fn default_init_clears_to_black() {
        let init = WgpuInit::default();
        assert_eq!(init.clear_color, Some(wgpu::Color::BLACK));
        assert_eq!(init.target_format, wgpu::TextureFormat::Rgba8Unorm);
        assert!(init.required_features.is_empty());
    }

    // ── on a real adapter ────────────────────────────────────────────────
    //
    // These skip when the machine has no usable adapter.

    fn gpu() -> Option<WgpuDevice> {
        match WgpuDevice::new_headless_blocking(WgpuInit::default()) {
            Ok(device) => Some(device),
            Err(e) => {
                eprintln!("skipping: {e:#}");
                None
            }
        }
    }

    #[test]
    fn frame_needs_a_surface() {
        let Some(mut dev) = gpu() else { return };
        assert_eq!(dev.begin_frame(), Err(DeviceError::NoSurface));
        assert_eq!(dev.resize_surface(0, 10), Err(DeviceError::NoSurface));
        dev.resize_surface(8, 8).unwrap();
        dev.begin_frame().unwrap();
        assert!(matches!(dev.begin_frame(), Err(DeviceError::InvalidState(_))));
        dev.end_frame().unwrap();
    }

    #[test]
    fn only_texture_unit_zero_exists() {
        let Some(mut dev) = gpu() else { return };
        let tex = dev.create_texture(1, 1, &[0; 4]).unwrap();
        assert!(matches!(dev.bind_texture(1, Some(tex)), Err(DeviceError::Unsupported(_))));
        dev.bind_texture(0, Some(tex)).unwrap();
        dev.destroy_texture(tex);
        assert!(matches!(
            dev.bind_texture(0, Some(tex)),
            Err(DeviceError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn writes_are_bounds_checked() {
        let Some(mut dev) = gpu() else { return };
        let id = dev.create_buffer(BufferRole::Position, BufferUsage::Dynamic, 8).unwrap();
        dev.write_buffer(id, 0, &[0; 8]).unwrap();
        assert!(matches!(dev.write_buffer(id, 4, &[0; 8]), Err(DeviceError::OutOfBounds { .. })));
        assert!(matches!(dev.write_buffer(id, 2, &[0; 4]), Err(DeviceError::Unsupported(_))));
    }

    #[test]
    fn filled_rectangle_reaches_the_target() {
        use std::sync::Arc;

        use crate::config::GraphicConfig;
        use crate::coords::Rect;
        use crate::paint::{Bitmap, Color};
        use crate::text::{FontDescriptor, FontFace, FontLibrary};
        use crate::Graphic;

        let Some(dev) = gpu() else { return };
        let face = FontFace::new(
            FontDescriptor::new("Blank", 10.0),
            12.0,
            Arc::new(Bitmap::solid(1, 1, [0; 4])),
        );
        let fonts = Box::new(FontLibrary::from_faces(vec![face]));
        let config = GraphicConfig::default().with_surface(4.0, 4.0, 1.0);
        let mut g = Graphic::new(dev, fonts, config).unwrap();

        g.fill_rectangle(Color::from_premul(1.0, 0.0, 0.0, 1.0), Rect::new(0.0, 0.0, 2.0, 4.0))
            .unwrap();
        g.render().unwrap();

        let (w, h, pixels) = g.device().read_target_rgba().unwrap();
        assert_eq!((w, h), (4, 4));
        let px = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..][..4];
        assert_eq!(px(0, 1), &[255, 0, 0, 255]);
        assert_eq!(px(3, 1), &[0, 0, 0, 255]);
    }
}
