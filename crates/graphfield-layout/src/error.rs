//! Error types for simulation operations.

use thiserror::Error;

/// Errors that can occur while setting up or reading back a simulation.
///
/// Steady-state ticking never produces these: per-frame paths recover locally
/// and no-op when their resources are missing.
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Failed to acquire a GPU device or compile a kernel on it.
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    /// Failed to read back data from GPU.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Invalid graph data.
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Unknown option name or unparsable option value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while loading or saving a config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
