//! GPU Device Abstraction
//!
//! [`GpuDevice`] is the seam between the frame graph and a concrete graphics
//! API. It is shaped after explicit APIs: resources carry states that the
//! caller transitions with [`Barrier`]s, commands are recorded into memory
//! owned by a command allocator, and CPU/GPU synchronization goes through a
//! single monotonically increasing fence value.
//!
//! # Recording model
//!
//! ```text
//! begin_commands(allocator)
//!   resource_barrier / clear_* / begin_pass .. draw* .. end_pass
//! execute()          // close + submit
//! present()
//! signal(value)      // GPU writes `value` when the submission finishes
//! ```
//!
//! Two implementations ship with the crate:
//!
//! - [`recording::RecordingDevice`]: records and validates the command
//!   stream against a simulated GPU timeline. Used by the tests.
//! - `wgpu_backend::WgpuDevice` (feature `wgpu-backend`): drives real
//!   hardware through `wgpu`.

pub mod recording;
pub mod types;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use std::time::Duration;

pub use types::*;

use crate::errors::Result;

/// Required alignment of constant buffer elements.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Rounds `size` up to the next multiple of [`CONSTANT_BUFFER_ALIGNMENT`].
#[inline]
#[must_use]
pub const fn align_constant_size(size: u64) -> u64 {
    (size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

pub trait GpuDevice {
    // ========================================================================
    // Object creation
    // ========================================================================

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    /// Uploads RGBA8 texels into one array layer of a `COPY_DST` texture.
    fn write_texture(&mut self, texture: TextureId, layer: u32, texels: &[u8]) -> Result<()>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId>;

    /// Writes through the buffer's persistent CPU mapping.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId>;

    fn create_command_allocator(&mut self, label: &str) -> Result<AllocatorId>;

    // ========================================================================
    // Command recording
    // ========================================================================

    /// Resets `allocator` and opens the command list on it.
    ///
    /// The caller guarantees the GPU finished the allocator's previous work.
    fn begin_commands(&mut self, allocator: AllocatorId) -> Result<()>;

    fn resource_barrier(&mut self, barriers: &[Barrier]);

    fn clear_color(&mut self, texture: TextureId, color: [f32; 4]);

    /// Clears every array layer of a depth texture.
    fn clear_depth(&mut self, texture: TextureId, depth: f32);

    fn begin_pass(&mut self, pass: &PassDesc);

    fn end_pass(&mut self);

    fn set_pipeline(&mut self, pipeline: PipelineId);

    fn bind_texture(&mut self, slot: u32, texture: TextureId);

    fn bind_constants(&mut self, slot: u32, binding: ConstantBinding);

    fn set_geometry(&mut self, geometry: GeometryBinding);

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32);

    fn draw(&mut self, vertex_count: u32);

    fn push_debug_group(&mut self, label: &str);

    fn pop_debug_group(&mut self);

    /// Closes the command list and submits it to the queue.
    fn execute(&mut self) -> Result<()>;

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Asks the queue to set the fence to `value` once prior work completes.
    fn signal(&mut self, value: u64) -> Result<()>;

    /// Last fence value the GPU reported as reached.
    fn completed_value(&self) -> u64;

    /// Blocks until the fence reaches `value`, or fails after `timeout`.
    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<()>;

    // ========================================================================
    // Presentation
    // ========================================================================

    /// The swap chain image to render into this frame (state `Common`).
    fn back_buffer(&mut self) -> Result<TextureId>;

    fn present(&mut self) -> Result<()>;

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;

    fn surface_format(&self) -> TextureFormat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sizes_round_to_256() {
        assert_eq!(align_constant_size(1), 256);
        assert_eq!(align_constant_size(256), 256);
        assert_eq!(align_constant_size(257), 512);
        assert_eq!(align_constant_size(912), 1024);
    }
}
