//! Recording Device
//!
//! A [`GpuDevice`] that executes nothing. It keeps a log of every command,
//! mirrors buffer contents for read-back, simulates a GPU timeline that
//! trails the CPU by a configurable number of submissions, and checks the
//! command stream for the mistakes that are undefined behavior on real
//! hardware. Each mistake becomes a [`Violation`] instead of a crash, so
//! tests can assert on them.

use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    AllocatorId, Barrier, BufferDesc, BufferId, ConstantBinding, GeometryBinding, GpuDevice,
    PassDesc, PipelineDesc, PipelineId, ResourceState, TextureDesc, TextureDimension, TextureFormat,
    TextureId, TextureUsages,
};
use crate::errors::{RenderError, Result};

const SWAP_CHAIN_LENGTH: usize = 2;

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginCommands { allocator: AllocatorId },
    Barrier(Barrier),
    ClearColor { texture: TextureId, color: [f32; 4] },
    ClearDepth { texture: TextureId, depth: f32 },
    BeginPass { label: &'static str, color_targets: SmallVec<[TextureId; 8]>, depth_target: Option<TextureId> },
    EndPass,
    SetPipeline(PipelineId),
    BindTexture { slot: u32, texture: TextureId },
    BindConstants { slot: u32, binding: ConstantBinding },
    SetGeometry(GeometryBinding),
    DrawIndexed { index_count: u32, start_index: u32, base_vertex: i32 },
    Draw { vertex_count: u32 },
    PushDebugGroup(String),
    PopDebugGroup,
    Execute,
    Present,
    Signal(u64),
    /// `blocked` is false when the fence had already been reached.
    Wait { value: u64, blocked: bool },
}

/// A command-stream error caught by the recording device.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// A barrier's `before` state disagrees with the tracked state.
    BarrierMismatch { texture: String, declared: ResourceState, actual: ResourceState },
    /// A draw samples a texture that is not in a shader-readable state.
    SampledWhileNotReadable { texture: String, slot: u32, state: ResourceState },
    /// A pass renders into a texture not in `RenderTarget` / `DepthWrite`.
    TargetNotWritable { texture: String, state: ResourceState },
    /// The CPU wrote a buffer the GPU may still be reading.
    BufferWriteInFlight { buffer: String, last_use: u64, completed: u64 },
    /// A command allocator was reset before its work finished.
    AllocatorReuseInFlight { allocator: String, last_use: u64, completed: u64 },
    /// A destroyed or foreign handle was used.
    StaleHandle(&'static str),
    /// Draw outside a pass or without a pipeline.
    InvalidDraw(&'static str),
}

#[derive(Debug)]
struct TextureRecord {
    desc: TextureDesc,
    state: ResourceState,
}

#[derive(Debug)]
struct BufferRecord {
    desc: BufferDesc,
    contents: Vec<u8>,
    /// Fence value signaled after the last submission that bound this buffer.
    last_use: u64,
}

#[derive(Debug)]
struct PipelineRecord {
    desc: PipelineDesc,
}

#[derive(Debug)]
struct AllocatorRecord {
    label: String,
    last_use: u64,
}

/// Simulated GPU backed by plain memory.
pub struct RecordingDevice {
    textures: SlotMap<TextureId, TextureRecord>,
    buffers: SlotMap<BufferId, BufferRecord>,
    pipelines: SlotMap<PipelineId, PipelineRecord>,
    allocators: SlotMap<AllocatorId, AllocatorRecord>,

    commands: Vec<Command>,
    violations: Vec<Violation>,

    // Recording state
    open_allocator: Option<AllocatorId>,
    in_pass: bool,
    current_pipeline: Option<PipelineId>,
    bound_textures: FxHashMap<u32, TextureId>,
    bound_constants: FxHashSet<u32>,
    recorded_buffers: FxHashSet<BufferId>,
    submitted_buffers: FxHashSet<BufferId>,
    submitted_allocator: Option<AllocatorId>,

    // Timeline
    completed: u64,
    last_signaled: u64,
    gpu_lag: u64,
    stalled: bool,
    lost: bool,

    // Swap chain
    swap_chain: [TextureId; SWAP_CHAIN_LENGTH],
    back_buffer_index: usize,
    surface_size: (u32, u32),
    failing_pipelines: FxHashSet<&'static str>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

impl RecordingDevice {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let mut textures = SlotMap::with_key();
        let swap_chain = std::array::from_fn(|i| {
            textures.insert(TextureRecord {
                desc: Self::swap_chain_desc(i, width, height),
                state: ResourceState::Common,
            })
        });
        Self {
            textures,
            buffers: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            allocators: SlotMap::with_key(),
            commands: Vec::new(),
            violations: Vec::new(),
            open_allocator: None,
            in_pass: false,
            current_pipeline: None,
            bound_textures: FxHashMap::default(),
            bound_constants: FxHashSet::default(),
            recorded_buffers: FxHashSet::default(),
            submitted_buffers: FxHashSet::default(),
            submitted_allocator: None,
            completed: 0,
            last_signaled: 0,
            gpu_lag: 0,
            stalled: false,
            lost: false,
            swap_chain,
            back_buffer_index: 0,
            surface_size: (width, height),
            failing_pipelines: FxHashSet::default(),
        }
    }

    fn swap_chain_desc(index: usize, width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            label: format!("Swap Chain {index}"),
            width,
            height,
            layers: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8Unorm,
            usage: TextureUsages::RENDER_TARGET,
            initial_state: ResourceState::Common,
        }
    }

    // ========================================================================
    // Timeline control
    // ========================================================================

    /// The simulated GPU finishes a submission `lag` signals after it was
    /// made. `0` completes every submission immediately.
    pub fn set_gpu_lag(&mut self, lag: u64) {
        self.gpu_lag = lag;
    }

    /// Stops the simulated GPU; later waits time out.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    /// Simulates device removal.
    pub fn lose_device(&mut self) {
        self.lost = true;
    }

    /// Completes all outstanding work.
    pub fn complete_all(&mut self) {
        self.completed = self.last_signaled;
    }

    /// Makes the next `create_pipeline` with this name fail.
    pub fn fail_pipeline(&mut self, name: &'static str) {
        self.failing_pipelines.insert(name);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    #[must_use]
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    #[must_use]
    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    #[must_use]
    pub fn texture_state(&self, texture: TextureId) -> Option<ResourceState> {
        self.textures.get(texture).map(|t| t.state)
    }

    #[must_use]
    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(texture).map(|t| &t.desc)
    }

    #[must_use]
    pub fn is_texture_alive(&self, texture: TextureId) -> bool {
        self.textures.contains_key(texture)
    }

    /// Live textures, swap chain images excluded.
    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.textures.len() - SWAP_CHAIN_LENGTH
    }

    #[must_use]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[must_use]
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.contents.as_slice())
    }

    /// Reads a `Pod` value back from a buffer.
    #[must_use]
    pub fn read_buffer<T: bytemuck::Pod>(&self, buffer: BufferId, offset: u64) -> Option<T> {
        let contents = self.buffer_contents(buffer)?;
        let start = usize::try_from(offset).ok()?;
        let end = start + std::mem::size_of::<T>();
        contents.get(start..end).map(bytemuck::pod_read_unaligned)
    }

    #[must_use]
    pub fn pipeline_name(&self, pipeline: PipelineId) -> Option<&'static str> {
        self.pipelines.get(pipeline).map(|p| p.desc.name)
    }

    /// Labels of `PushDebugGroup` commands, in order.
    #[must_use]
    pub fn debug_groups(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::PushDebugGroup(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    // ========================================================================
    // Validation helpers
    // ========================================================================

    fn texture_label(&self, texture: TextureId) -> String {
        self.textures
            .get(texture)
            .map_or_else(|| "<destroyed>".to_string(), |t| t.desc.label.clone())
    }

    fn check_target(&mut self, texture: TextureId, expected: ResourceState) {
        match self.textures.get(texture) {
            Some(t) if t.state == expected => {}
            Some(t) => {
                let violation = Violation::TargetNotWritable { texture: t.desc.label.clone(), state: t.state };
                self.violations.push(violation);
            }
            None => self.violations.push(Violation::StaleHandle("render target")),
        }
    }

    fn check_draw(&mut self) {
        if !self.in_pass {
            self.violations.push(Violation::InvalidDraw("draw outside a pass"));
            return;
        }
        let Some(pipeline) = self.current_pipeline.and_then(|p| self.pipelines.get(p)) else {
            self.violations.push(Violation::InvalidDraw("draw without a pipeline"));
            return;
        };
        if pipeline.desc.constant_slots.iter().any(|slot| !self.bound_constants.contains(slot)) {
            self.violations.push(Violation::InvalidDraw("declared constant slot left unbound"));
        }
        let declared = pipeline.desc.textures.len() as u32;
        for slot in 0..declared {
            let Some(&texture) = self.bound_textures.get(&slot) else {
                self.violations.push(Violation::InvalidDraw("declared texture slot left unbound"));
                continue;
            };
            match self.textures.get(texture) {
                Some(t) if t.state.is_shader_readable() => {}
                Some(t) => {
                    let violation = Violation::SampledWhileNotReadable {
                        texture: t.desc.label.clone(),
                        slot,
                        state: t.state,
                    };
                    self.violations.push(violation);
                }
                None => self.violations.push(Violation::StaleHandle("sampled texture")),
            }
        }
    }

    fn advance_timeline(&mut self) {
        if !self.stalled {
            let reached = self.last_signaled.saturating_sub(self.gpu_lag);
            self.completed = self.completed.max(reached);
        }
    }
}

impl GpuDevice for RecordingDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(RenderError::ResourceCreation {
                kind: "texture",
                label: desc.label.clone(),
                reason: format!("empty extent {}x{}x{}", desc.width, desc.height, desc.layers),
            });
        }
        Ok(self.textures.insert(TextureRecord { desc: desc.clone(), state: desc.initial_state }))
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, texels: &[u8]) -> Result<()> {
        let Some(record) = self.textures.get(texture) else {
            self.violations.push(Violation::StaleHandle("texture upload"));
            return Ok(());
        };
        let expected = u64::from(record.desc.width) * u64::from(record.desc.height) * 4;
        if layer >= record.desc.layers || texels.len() as u64 != expected {
            return Err(RenderError::ResourceCreation {
                kind: "texture",
                label: record.desc.label.clone(),
                reason: format!("upload of {} bytes into layer {layer} does not fit", texels.len()),
            });
        }
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_none() {
            self.violations.push(Violation::StaleHandle("texture destroy"));
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        if desc.size == 0 {
            return Err(RenderError::ResourceCreation {
                kind: "buffer",
                label: desc.label.clone(),
                reason: "zero-sized buffer".into(),
            });
        }
        let size = usize::try_from(desc.size).map_err(|_| RenderError::ResourceCreation {
            kind: "buffer",
            label: desc.label.clone(),
            reason: "size exceeds address space".into(),
        })?;
        Ok(self.buffers.insert(BufferRecord { desc: desc.clone(), contents: vec![0; size], last_use: 0 }))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let completed = self.completed;
        let Some(record) = self.buffers.get_mut(buffer) else {
            self.violations.push(Violation::StaleHandle("buffer write"));
            return;
        };
        if record.last_use > completed {
            let violation = Violation::BufferWriteInFlight {
                buffer: record.desc.label.clone(),
                last_use: record.last_use,
                completed,
            };
            self.violations.push(violation);
        }
        let start = offset as usize;
        let end = start + data.len();
        if end <= record.contents.len() {
            record.contents[start..end].copy_from_slice(data);
        } else {
            self.violations.push(Violation::StaleHandle("buffer write out of bounds"));
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffers.remove(buffer).is_none() {
            self.violations.push(Violation::StaleHandle("buffer destroy"));
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId> {
        if self.failing_pipelines.remove(desc.name) {
            return Err(RenderError::PipelineCreation {
                name: desc.name.to_string(),
                reason: "injected failure".into(),
            });
        }
        Ok(self.pipelines.insert(PipelineRecord { desc: desc.clone() }))
    }

    fn create_command_allocator(&mut self, label: &str) -> Result<AllocatorId> {
        Ok(self.allocators.insert(AllocatorRecord { label: label.to_string(), last_use: 0 }))
    }

    fn begin_commands(&mut self, allocator: AllocatorId) -> Result<()> {
        if self.lost {
            return Err(RenderError::DeviceLost("simulated device removal".into()));
        }
        let completed = self.completed;
        let Some(record) = self.allocators.get(allocator) else {
            self.violations.push(Violation::StaleHandle("command allocator"));
            return Ok(());
        };
        if record.last_use > completed {
            let violation = Violation::AllocatorReuseInFlight {
                allocator: record.label.clone(),
                last_use: record.last_use,
                completed,
            };
            self.violations.push(violation);
        }
        self.open_allocator = Some(allocator);
        self.current_pipeline = None;
        self.bound_textures.clear();
        self.bound_constants.clear();
        self.recorded_buffers.clear();
        self.commands.push(Command::BeginCommands { allocator });
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[Barrier]) {
        for barrier in barriers {
            match self.textures.get_mut(barrier.texture) {
                Some(t) => {
                    if t.state != barrier.before {
                        let violation = Violation::BarrierMismatch {
                            texture: t.desc.label.clone(),
                            declared: barrier.before,
                            actual: t.state,
                        };
                        self.violations.push(violation);
                    }
                    t.state = barrier.after;
                }
                None => self.violations.push(Violation::StaleHandle("barrier")),
            }
            self.commands.push(Command::Barrier(*barrier));
        }
    }

    fn clear_color(&mut self, texture: TextureId, color: [f32; 4]) {
        self.check_target(texture, ResourceState::RenderTarget);
        self.commands.push(Command::ClearColor { texture, color });
    }

    fn clear_depth(&mut self, texture: TextureId, depth: f32) {
        self.check_target(texture, ResourceState::DepthWrite);
        self.commands.push(Command::ClearDepth { texture, depth });
    }

    fn begin_pass(&mut self, pass: &PassDesc) {
        if self.in_pass {
            self.violations.push(Violation::InvalidDraw("nested pass"));
        }
        for &texture in &pass.color_targets {
            self.check_target(texture, ResourceState::RenderTarget);
        }
        if let Some(depth) = pass.depth_target {
            self.check_target(depth.texture, ResourceState::DepthWrite);
        }
        self.in_pass = true;
        self.commands.push(Command::BeginPass {
            label: pass.label,
            color_targets: pass.color_targets.clone(),
            depth_target: pass.depth_target.map(|d| d.texture),
        });
    }

    fn end_pass(&mut self) {
        if !self.in_pass {
            self.violations.push(Violation::InvalidDraw("end_pass without begin_pass"));
        }
        self.in_pass = false;
        self.commands.push(Command::EndPass);
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.current_pipeline = Some(pipeline);
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.bound_textures.insert(slot, texture);
        self.commands.push(Command::BindTexture { slot, texture });
    }

    fn bind_constants(&mut self, slot: u32, binding: ConstantBinding) {
        self.bound_constants.insert(slot);
        self.recorded_buffers.insert(binding.buffer);
        self.commands.push(Command::BindConstants { slot, binding });
    }

    fn set_geometry(&mut self, geometry: GeometryBinding) {
        self.commands.push(Command::SetGeometry(geometry));
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.check_draw();
        self.commands.push(Command::DrawIndexed { index_count, start_index, base_vertex });
    }

    fn draw(&mut self, vertex_count: u32) {
        self.check_draw();
        self.commands.push(Command::Draw { vertex_count });
    }

    fn push_debug_group(&mut self, label: &str) {
        self.commands.push(Command::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.commands.push(Command::PopDebugGroup);
    }

    fn execute(&mut self) -> Result<()> {
        if self.lost {
            return Err(RenderError::DeviceLost("simulated device removal".into()));
        }
        if self.in_pass {
            self.violations.push(Violation::InvalidDraw("execute inside an open pass"));
        }
        self.submitted_buffers.extend(self.recorded_buffers.drain());
        self.submitted_allocator = self.open_allocator.take();
        self.commands.push(Command::Execute);
        Ok(())
    }

    fn signal(&mut self, value: u64) -> Result<()> {
        if self.lost {
            return Err(RenderError::DeviceLost("simulated device removal".into()));
        }
        for buffer in self.submitted_buffers.drain() {
            if let Some(record) = self.buffers.get_mut(buffer) {
                record.last_use = value;
            }
        }
        if let Some(record) = self.submitted_allocator.take().and_then(|a| self.allocators.get_mut(a)) {
            record.last_use = value;
        }
        self.last_signaled = self.last_signaled.max(value);
        self.commands.push(Command::Signal(value));
        self.advance_timeline();
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        self.completed
    }

    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<()> {
        if self.lost {
            return Err(RenderError::DeviceLost("simulated device removal".into()));
        }
        if self.completed >= value {
            self.commands.push(Command::Wait { value, blocked: false });
            return Ok(());
        }
        if self.stalled || value > self.last_signaled {
            return Err(RenderError::FenceTimeout { value, completed: self.completed, timeout });
        }
        // The CPU blocks until the GPU gets there.
        self.completed = value;
        self.commands.push(Command::Wait { value, blocked: true });
        Ok(())
    }

    fn back_buffer(&mut self) -> Result<TextureId> {
        Ok(self.swap_chain[self.back_buffer_index])
    }

    fn present(&mut self) -> Result<()> {
        if self.lost {
            return Err(RenderError::DeviceLost("simulated device removal".into()));
        }
        let current = self.swap_chain[self.back_buffer_index];
        let state = self.texture_state(current).unwrap_or(ResourceState::Common);
        if state != ResourceState::Common {
            let texture = self.texture_label(current);
            self.violations.push(Violation::TargetNotWritable { texture, state });
        }
        self.back_buffer_index = (self.back_buffer_index + 1) % SWAP_CHAIN_LENGTH;
        self.commands.push(Command::Present);
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSurfaceSize { width, height });
        }
        for (i, &id) in self.swap_chain.iter().enumerate() {
            if let Some(t) = self.textures.get_mut(id) {
                t.desc = Self::swap_chain_desc(i, width, height);
            }
        }
        self.back_buffer_index = 0;
        self.surface_size = (width, height);
        Ok(())
    }

    fn surface_format(&self) -> TextureFormat {
        TextureFormat::Bgra8Unorm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::BufferUsage;

    fn constant_buffer(device: &mut RecordingDevice) -> BufferId {
        device
            .create_buffer(&BufferDesc { label: "cb".into(), size: 256, usage: BufferUsage::Constant })
            .unwrap()
    }

    #[test]
    fn mismatched_barrier_is_reported() {
        let mut device = RecordingDevice::default();
        let tex = device
            .create_texture(&TextureDesc::render_target("rt", 4, 4, TextureFormat::Rgba8Unorm))
            .unwrap();
        device.resource_barrier(&[Barrier::transition(tex, ResourceState::RenderTarget, ResourceState::ShaderResource)]);
        assert!(matches!(device.violations()[0], Violation::BarrierMismatch { actual: ResourceState::Common, .. }));
        // Tracked state follows the barrier anyway.
        assert_eq!(device.texture_state(tex), Some(ResourceState::ShaderResource));
    }

    #[test]
    fn write_to_buffer_in_flight_is_reported() {
        let mut device = RecordingDevice::default();
        device.set_gpu_lag(1);
        let alloc = device.create_command_allocator("a").unwrap();
        let cb = constant_buffer(&mut device);

        device.begin_commands(alloc).unwrap();
        device.bind_constants(0, ConstantBinding { buffer: cb, offset: 0, size: 256 });
        device.execute().unwrap();
        device.signal(1).unwrap();
        assert_eq!(device.completed_value(), 0);

        device.write_buffer(cb, 0, &[1, 2, 3, 4]);
        assert!(matches!(device.violations()[0], Violation::BufferWriteInFlight { last_use: 1, completed: 0, .. }));
    }

    #[test]
    fn waiting_catches_the_gpu_up() {
        let mut device = RecordingDevice::default();
        device.set_gpu_lag(5);
        device.signal(3).unwrap();
        assert_eq!(device.completed_value(), 0);
        device.wait_for_value(2, Duration::from_millis(1)).unwrap();
        assert_eq!(device.completed_value(), 2);
        assert_eq!(device.commands().last(), Some(&Command::Wait { value: 2, blocked: true }));
    }

    #[test]
    fn stalled_gpu_times_out() {
        let mut device = RecordingDevice::default();
        device.stall();
        device.signal(1).unwrap();
        let err = device.wait_for_value(1, Duration::from_millis(10)).unwrap_err();
        assert!(err.is_device_failure());
    }

    #[test]
    fn read_back_round_trips_pod() {
        let mut device = RecordingDevice::default();
        let cb = constant_buffer(&mut device);
        device.write_buffer(cb, 16, bytemuck::bytes_of(&[1.5f32, 2.5]));
        let v: [f32; 2] = device.read_buffer(cb, 16).unwrap();
        assert_eq!(v, [1.5, 2.5]);
    }
}
