//! Logging utilities.
//!
//! The library itself only emits through the `log` facade. `init_logging` is
//! a convenience for binaries and tests that want `env_logger` output.

mod init;

pub use init::{init_logging, LoggingConfig};