//! Error types for the fluid background.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FluidError>;

/// Everything that can stop a session from starting or from presenting a frame.
///
/// Initialization errors are terminal: a session that fails to mount never
/// partially starts, and the caller is expected to disable the effect.
#[derive(Error, Debug)]
pub enum FluidError {
    /// The adapter lacks a capability the solver depends on
    /// (compute shaders or filterable, storable half-float textures).
    #[error("unsupported GPU: {0}")]
    Unsupported(String),

    #[error("no suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface creation failed: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// A pass program failed to compile or link.
    #[error("pass program `{pass}` failed to build: {message}")]
    Shader { pass: &'static str, message: String },

    /// Acquiring the next surface texture failed.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// The session was already torn down.
    #[error("session has been torn down")]
    TornDown,
}
