//! Error Types
//!
//! This module defines the error types used throughout the renderer.
//!
//! # Overview
//!
//! The main error type [`RenderError`] covers all failure modes including:
//! - GPU object creation failures (textures, buffers, pipelines, layouts)
//! - Fence wait timeouts and device loss
//! - Scene description lookups that reference unknown names
//! - Configuration loading
//!
//! GPU failures are terminal. The frame that hit them is aborted and the
//! error is handed back to the application shell, which is expected to shut
//! the renderer down.
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, RenderError>`.

use std::time::Duration;

use thiserror::Error;

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // GPU Object Creation
    // ========================================================================
    /// A texture, buffer or command allocator could not be created.
    #[error("Failed to create {kind} '{label}': {reason}")]
    ResourceCreation {
        /// What was being created ("texture", "buffer", ...)
        kind: &'static str,
        /// Debug label of the failing resource
        label: String,
        /// Backend supplied reason
        reason: String,
    },

    /// A pipeline state object could not be built.
    #[error("Failed to create pipeline '{name}': {reason}")]
    PipelineCreation {
        /// Pipeline name
        name: String,
        /// Backend supplied reason
        reason: String,
    },

    /// The binding layout (root signature) could not be built.
    #[error("Failed to build binding layout '{name}': {reason}")]
    LayoutCreation {
        /// Layout name
        name: String,
        /// Backend supplied reason
        reason: String,
    },

    /// Shader source could not be read or compiled.
    #[error("Shader error in '{path}': {reason}")]
    Shader {
        /// Shader file path
        path: String,
        /// Reason
        reason: String,
    },

    // ========================================================================
    // Synchronization
    // ========================================================================
    /// The GPU did not reach a fence value within the allotted time.
    #[error("Timed out after {timeout:?} waiting for fence {value} (completed: {completed})")]
    FenceTimeout {
        /// Fence value being waited for
        value: u64,
        /// Last value the GPU reported as completed
        completed: u64,
        /// Wait bound
        timeout: Duration,
    },

    /// The device was removed or lost.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// Presenting or acquiring the swap chain image failed.
    #[error("Surface error: {0}")]
    Surface(String),

    // ========================================================================
    // Scene & Lifecycle
    // ========================================================================
    /// A scene description referenced a geometry or submesh that does not exist.
    #[error("Geometry not found: {0}")]
    GeometryNotFound(String),

    /// A scene description referenced a material that does not exist.
    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    /// A scene description referenced a texture that does not exist.
    #[error("Texture not found: {0}")]
    TextureNotFound(String),

    /// Operation requires `initialize` / `on_resize` to have run first.
    #[error("Renderer not ready: {0}")]
    NotReady(&'static str),

    /// A zero-sized or otherwise unusable output size.
    #[error("Invalid surface size {width}x{height}")]
    InvalidSurfaceSize {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    // ========================================================================
    // Configuration
    // ========================================================================
    /// Settings failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // Backend Bring-up
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[cfg(feature = "wgpu-backend")]
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[cfg(feature = "wgpu-backend")]
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),
}

impl RenderError {
    /// Whether this error came from the GPU timeline itself (timeout or
    /// device removal) rather than from a creation call or bad input.
    #[must_use]
    pub fn is_device_failure(&self) -> bool {
        matches!(self, Self::FenceTimeout { .. } | Self::DeviceLost(_))
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
