use thiserror::Error;

/// Failures reported by a [`crate::device::GraphicsDevice`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("invalid {kind} handle")]
    InvalidHandle { kind: &'static str },

    #[error("invalid device state: {0}")]
    InvalidState(&'static str),

    #[error("write of {len} bytes at offset {offset} exceeds buffer capacity {capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("no drawable surface")]
    NoSurface,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("backend error: {0}")]
    Backend(String),
}
