//! Device resource wrappers: buffers, vertex arrays, textures, programs.

mod buffer;
mod program;
mod texture;
mod vertex_array;

pub use buffer::GpuBuffer;
pub use program::{ShaderProgram, ShaderSource};
pub use texture::{TextureCache, TextureResource};
pub use vertex_array::VertexArrayBinding;
