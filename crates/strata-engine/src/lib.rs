//! Strata engine crate.
//!
//! A batched 2D drawing surface: rectangles, ellipses, lines, images and
//! bitmap-font text are recorded during a frame and replayed through a small
//! set of GPU programs in exactly the order they were requested.
//!
//! Layers, bottom up:
//! - `device`: the GL-style [`device::GraphicsDevice`] host context
//! - `gpu`: buffers, vertex arrays, textures and programs over a device
//! - `render`: one batcher per primitive family
//! - `scene`: the recorded action log
//! - [`Graphic`]: the command surface tying them together

pub mod config;
pub mod coords;
pub mod device;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod paint;
pub mod render;
pub mod scene;
pub mod text;

mod graphic;

pub use config::GraphicConfig;
pub use error::{GraphicError, Result};
pub use graphic::{FrameStats, Graphic};
