//! Command recorder with state tracking.
//!
//! Wraps the device for the duration of one frame and drops binds that
//! would not change anything. Tracked state is forgotten at every
//! `begin_pass`, since a new pass starts with nothing bound on most APIs.

use crate::gpu::{
    Barrier, ConstantBinding, GeometryBinding, GpuDevice, PassDesc, PipelineId, TextureId,
};

const TEXTURE_SLOTS: usize = 10;
const CONSTANT_SLOTS: usize = 6;

pub struct TrackedCommands<'a, D: GpuDevice> {
    device: &'a mut D,
    current_pipeline: Option<PipelineId>,
    current_textures: [Option<TextureId>; TEXTURE_SLOTS],
    current_constants: [Option<ConstantBinding>; CONSTANT_SLOTS],
    current_geometry: Option<GeometryBinding>,
    skipped: u32,
}

impl<'a, D: GpuDevice> TrackedCommands<'a, D> {
    #[must_use]
    pub fn new(device: &'a mut D) -> Self {
        Self {
            device,
            current_pipeline: None,
            current_textures: [None; TEXTURE_SLOTS],
            current_constants: [None; CONSTANT_SLOTS],
            current_geometry: None,
            skipped: 0,
        }
    }

    /// Untracked access for barriers and clears issued by resource owners.
    pub fn device(&mut self) -> &mut D {
        self.device
    }

    /// Binds elided so far this frame.
    #[must_use]
    pub fn skipped_binds(&self) -> u32 {
        self.skipped
    }

    fn reset(&mut self) {
        self.current_pipeline = None;
        self.current_textures = [None; TEXTURE_SLOTS];
        self.current_constants = [None; CONSTANT_SLOTS];
        self.current_geometry = None;
    }

    pub fn resource_barrier(&mut self, barriers: &[Barrier]) {
        if !barriers.is_empty() {
            self.device.resource_barrier(barriers);
        }
    }

    pub fn begin_pass(&mut self, pass: &PassDesc) {
        self.reset();
        self.device.begin_pass(pass);
    }

    pub fn end_pass(&mut self) {
        self.device.end_pass();
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineId) {
        if self.current_pipeline == Some(pipeline) {
            self.skipped += 1;
            return;
        }
        self.device.set_pipeline(pipeline);
        self.current_pipeline = Some(pipeline);
    }

    pub fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        let index = slot as usize;
        if self.current_textures.get(index) == Some(&Some(texture)) {
            self.skipped += 1;
            return;
        }
        self.device.bind_texture(slot, texture);
        if let Some(current) = self.current_textures.get_mut(index) {
            *current = Some(texture);
        }
    }

    pub fn bind_constants(&mut self, slot: u32, binding: ConstantBinding) {
        let index = slot as usize;
        if self.current_constants.get(index) == Some(&Some(binding)) {
            self.skipped += 1;
            return;
        }
        self.device.bind_constants(slot, binding);
        if let Some(current) = self.current_constants.get_mut(index) {
            *current = Some(binding);
        }
    }

    pub fn set_geometry(&mut self, geometry: GeometryBinding) {
        if self.current_geometry == Some(geometry) {
            self.skipped += 1;
            return;
        }
        self.device.set_geometry(geometry);
        self.current_geometry = Some(geometry);
    }

    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.device.draw_indexed(index_count, start_index, base_vertex);
    }

    /// Non-indexed draw of shader-generated vertices.
    pub fn draw(&mut self, vertex_count: u32) {
        self.device.draw(vertex_count);
    }

    pub fn push_debug_group(&mut self, label: &str) {
        self.device.push_debug_group(label);
    }

    pub fn pop_debug_group(&mut self) {
        self.device.pop_debug_group();
    }
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};
    use crate::gpu::{BufferDesc, BufferUsage, Viewport};

    fn pass() -> PassDesc {
        PassDesc { label: "test", color_targets: smallvec![], depth_target: None, viewport: Viewport::full(4, 4) }
    }

    #[test]
    fn repeated_binds_are_dropped() {
        let mut device = RecordingDevice::default();
        let buffer = device
            .create_buffer(&BufferDesc { label: "cb".into(), size: 512, usage: BufferUsage::Constant })
            .unwrap();
        let binding = ConstantBinding { buffer, offset: 0, size: 256 };

        let mut cmd = TrackedCommands::new(&mut device);
        cmd.begin_pass(&pass());
        cmd.bind_constants(1, binding);
        cmd.bind_constants(1, binding);
        cmd.bind_constants(1, ConstantBinding { offset: 256, ..binding });
        cmd.end_pass();
        assert_eq!(cmd.skipped_binds(), 1);

        let binds = device.commands().iter().filter(|c| matches!(c, Command::BindConstants { .. })).count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn new_pass_forgets_bindings() {
        let mut device = RecordingDevice::default();
        let buffer = device
            .create_buffer(&BufferDesc { label: "cb".into(), size: 256, usage: BufferUsage::Constant })
            .unwrap();
        let binding = ConstantBinding { buffer, offset: 0, size: 256 };

        let mut cmd = TrackedCommands::new(&mut device);
        for _ in 0..2 {
            cmd.begin_pass(&pass());
            cmd.bind_constants(0, binding);
            cmd.end_pass();
        }
        assert_eq!(cmd.skipped_binds(), 0);
    }
}
