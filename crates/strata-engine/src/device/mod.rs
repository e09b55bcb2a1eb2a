//! Device abstraction.
//!
//! [`GraphicsDevice`] is the host graphics context everything above draws
//! through. Two implementations ship:
//! - [`RecordingDevice`]: validating in-memory device (tests, debugging)
//! - [`WgpuDevice`]: wgpu-backed offscreen renderer

mod context;
mod error;
pub mod reflect;
mod recording;
mod wgpu_backend;

pub use context::{
    AttributeLayout, AttributeLocation, BufferId, BufferRole, BufferUsage, GraphicsDevice,
    PrimitiveKind, ProgramId, ScissorRect, ShaderId, ShaderStage, TextureId, UniformLocation,
    UniformValue, VertexArrayId,
};
pub use error::DeviceError;
pub use recording::{DeviceCall, DrawCall, RecordingDevice};
pub use wgpu_backend::{WgpuDevice, WgpuInit};
