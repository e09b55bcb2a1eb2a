//! Library error type.
//!
//! Device-level failures live in [`crate::device::DeviceError`] and are
//! wrapped here so every public operation returns one error type.

use thiserror::Error;

use crate::device::{DeviceError, ShaderStage};

pub type Result<T, E = GraphicError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum GraphicError {
    #[error("{program}: {stage} shader failed to compile: {log}")]
    Compile {
        program: &'static str,
        stage: ShaderStage,
        log: String,
    },

    #[error("{program}: program failed to link: {log}")]
    Link { program: &'static str, log: String },

    #[error("{program}: uniform `{name}` not found")]
    UniformNotFound { program: &'static str, name: String },

    #[error("{program}: attribute `{name}` not found")]
    AttributeNotFound { program: &'static str, name: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("{batcher}: draw_next past the end (cursor {cursor}, {tasks} tasks)")]
    OutOfRange {
        batcher: &'static str,
        cursor: usize,
        tasks: usize,
    },

    #[error("font not found: {0}")]
    FontNotFound(String),

    #[error("glyph metrics line {line}: {message}")]
    FontParse { line: usize, message: String },

    #[error("non-finite geometry passed to {0}")]
    NonFiniteGeometry(&'static str),

    #[error("image error: {0}")]
    Image(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphicError {
    /// Setup failures the facade cannot be built past.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GraphicError::Compile { .. } | GraphicError::Link { .. } | GraphicError::FontNotFound(_)
        )
    }

    /// Errors caused by wiring mistakes rather than the device or input data.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            GraphicError::UniformNotFound { .. }
                | GraphicError::AttributeNotFound { .. }
                | GraphicError::Config(_)
                | GraphicError::OutOfRange { .. }
        )
    }
}

impl From<image::ImageError> for GraphicError {
    fn from(err: image::ImageError) -> Self {
        GraphicError::Image(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let compile = GraphicError::Compile {
            program: "polygon",
            stage: ShaderStage::Fragment,
            log: "bad".into(),
        };
        assert!(compile.is_fatal());
        assert!(!compile.is_programming_error());

        let oor = GraphicError::OutOfRange { batcher: "image", cursor: 3, tasks: 3 };
        assert!(oor.is_programming_error());
        assert!(!oor.is_fatal());

        let dev = GraphicError::from(DeviceError::NoSurface);
        assert!(!dev.is_fatal());
        assert!(!dev.is_programming_error());
    }

    #[test]
    fn messages_name_the_program() {
        let err = GraphicError::UniformNotFound { program: "ellipse", name: "radii".into() };
        assert_eq!(err.to_string(), "ellipse: uniform `radii` not found");
    }
}
