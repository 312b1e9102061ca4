//! Frame Resources
//!
//! The CPU records frame `n + 1` while the GPU still executes frame `n`.
//! Everything the CPU writes per frame therefore exists once per ring slot:
//! the constant buffers and the command allocator. A slot is only handed out
//! again after the fence value signaled behind its last submission has been
//! reached, so at most `N` frames are ever in flight.
//!
//! ```text
//! frame:     0   1   2   3   4 ...
//! slot:      0   1   2   0   1
//! waits for:             f0  f1      (fence signaled after frame 0 / 1)
//! ```

use std::marker::PhantomData;
use std::time::Duration;

use bytemuck::Pod;

use super::settings::RendererSettings;
use super::shadow::MAX_SHADOW_VIEWS;
use super::uniforms::{
    LightConstants, MaterialConstants, ObjectConstants, PassConstants, PostProcessConstants, ShadowViewConstants,
};
use crate::errors::Result;
use crate::gpu::{AllocatorId, BufferDesc, BufferId, BufferUsage, ConstantBinding, GpuDevice, align_constant_size};

// ============================================================================
// UploadBuffer
// ============================================================================

/// A CPU-writable array of `T`, one element per 256-byte aligned stride.
#[derive(Debug)]
pub struct UploadBuffer<T: Pod> {
    buffer: BufferId,
    stride: u64,
    capacity: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    pub fn new(device: &mut impl GpuDevice, label: &str, capacity: u32) -> Result<Self> {
        let stride = align_constant_size(std::mem::size_of::<T>() as u64);
        let buffer = device.create_buffer(&BufferDesc {
            label: label.to_string(),
            size: stride * u64::from(capacity.max(1)),
            usage: BufferUsage::Constant,
        })?;
        Ok(Self { buffer, stride, capacity: capacity.max(1), _marker: PhantomData })
    }

    /// Writes element `index`. Out-of-range writes are dropped.
    pub fn copy_data(&self, device: &mut impl GpuDevice, index: u32, data: &T) {
        debug_assert!(index < self.capacity, "constant index {index} out of range (capacity {})", self.capacity);
        if index >= self.capacity {
            log::error!("Constant index {index} out of range (capacity {}); write dropped", self.capacity);
            return;
        }
        device.write_buffer(self.buffer, self.offset(index), bytemuck::bytes_of(data));
    }

    #[inline]
    #[must_use]
    pub fn offset(&self, index: u32) -> u64 {
        u64::from(index) * self.stride
    }

    /// Constant view of element `index`.
    #[must_use]
    pub fn binding(&self, index: u32) -> ConstantBinding {
        ConstantBinding { buffer: self.buffer, offset: self.offset(index), size: self.stride }
    }

    #[must_use]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[must_use]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn release(self, device: &mut impl GpuDevice) {
        device.destroy_buffer(self.buffer);
    }
}

// ============================================================================
// FrameResource
// ============================================================================

/// Element counts of the per-frame constant buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCapacities {
    pub objects: u32,
    pub materials: u32,
    pub lights: u32,
}

impl From<&RendererSettings> for FrameCapacities {
    fn from(s: &RendererSettings) -> Self {
        Self { objects: s.max_render_items, materials: s.max_materials, lights: s.max_lights }
    }
}

/// One slot of the ring.
#[derive(Debug)]
pub struct FrameResource {
    pub allocator: AllocatorId,
    pub object_cb: UploadBuffer<ObjectConstants>,
    pub material_cb: UploadBuffer<MaterialConstants>,
    pub light_cb: UploadBuffer<LightConstants>,
    pub pass_cb: UploadBuffer<PassConstants>,
    /// `MAX_SHADOW_VIEWS` entries per light.
    pub shadow_view_cb: UploadBuffer<ShadowViewConstants>,
    pub post_process_cb: UploadBuffer<PostProcessConstants>,
    /// Fence value signaled after this slot's last submission; 0 if never
    /// submitted.
    pub fence: u64,
}

impl FrameResource {
    fn new(device: &mut impl GpuDevice, slot: usize, caps: FrameCapacities) -> Result<Self> {
        let label = |what: &str| format!("Frame {slot} {what}");
        Ok(Self {
            allocator: device.create_command_allocator(&label("Allocator"))?,
            object_cb: UploadBuffer::new(device, &label("Object CB"), caps.objects)?,
            material_cb: UploadBuffer::new(device, &label("Material CB"), caps.materials)?,
            light_cb: UploadBuffer::new(device, &label("Light CB"), caps.lights)?,
            pass_cb: UploadBuffer::new(device, &label("Pass CB"), 1)?,
            shadow_view_cb: UploadBuffer::new(
                device,
                &label("Shadow View CB"),
                caps.lights * MAX_SHADOW_VIEWS as u32,
            )?,
            post_process_cb: UploadBuffer::new(device, &label("Post Process CB"), 1)?,
            fence: 0,
        })
    }

    /// Index of a light's shadow view in [`FrameResource::shadow_view_cb`].
    #[inline]
    #[must_use]
    pub fn shadow_view_index(light_index: u32, view: u32) -> u32 {
        light_index * MAX_SHADOW_VIEWS as u32 + view
    }

    fn release(self, device: &mut impl GpuDevice) {
        self.object_cb.release(device);
        self.material_cb.release(device);
        self.light_cb.release(device);
        self.pass_cb.release(device);
        self.shadow_view_cb.release(device);
        self.post_process_cb.release(device);
    }
}

// ============================================================================
// FrameResourceRing
// ============================================================================

#[derive(Debug)]
pub struct FrameResourceRing {
    frames: Vec<FrameResource>,
    timeout: Duration,
}

impl FrameResourceRing {
    pub fn new(device: &mut impl GpuDevice, count: usize, caps: FrameCapacities, timeout: Duration) -> Result<Self> {
        let mut frames = Vec::with_capacity(count);
        for slot in 0..count.max(1) {
            match FrameResource::new(device, slot, caps) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    // Nothing was submitted yet, so the partial ring can go at once.
                    for frame in frames {
                        frame.release(device);
                    }
                    return Err(e);
                }
            }
        }
        log::debug!("Created {} frame resources", frames.len());
        Ok(Self { frames, timeout })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn slot_of(&self, frame_index: u64) -> usize {
        (frame_index % self.frames.len() as u64) as usize
    }

    /// Returns the slot for `frame_index`, first blocking until the GPU has
    /// finished the slot's previous submission.
    pub fn acquire(&mut self, device: &mut impl GpuDevice, frame_index: u64) -> Result<&mut FrameResource> {
        let slot = self.slot_of(frame_index);
        let fence = self.frames[slot].fence;
        if fence != 0 && device.completed_value() < fence {
            log::trace!("Frame slot {slot} waiting for fence {fence}");
            device.wait_for_value(fence, self.timeout)?;
        }
        Ok(&mut self.frames[slot])
    }

    #[must_use]
    pub fn get(&self, frame_index: u64) -> &FrameResource {
        &self.frames[self.slot_of(frame_index)]
    }

    /// Records the fence value signaled after `frame_index` was submitted.
    pub fn mark_submitted(&mut self, frame_index: u64, fence: u64) {
        let slot = self.slot_of(frame_index);
        self.frames[slot].fence = fence;
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResource> {
        self.frames.iter()
    }

    /// Destroys every buffer. The GPU must be idle.
    pub fn release(self, device: &mut impl GpuDevice) {
        for frame in self.frames {
            frame.release(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    const CAPS: FrameCapacities = FrameCapacities { objects: 4, materials: 2, lights: 1 };

    #[test]
    fn stride_is_constant_aligned() {
        let mut device = RecordingDevice::default();
        let cb: UploadBuffer<ObjectConstants> = UploadBuffer::new(&mut device, "objects", 4).unwrap();
        assert_eq!(cb.stride(), 256);
        assert_eq!(cb.binding(3).offset, 768);
    }

    #[test]
    fn fresh_slots_do_not_wait() {
        let mut device = RecordingDevice::default();
        let mut ring = FrameResourceRing::new(&mut device, 3, CAPS, Duration::from_secs(1)).unwrap();
        for frame in 0..3 {
            ring.acquire(&mut device, frame).unwrap();
        }
        assert!(device.commands().is_empty());
    }

    #[test]
    fn release_frees_every_buffer() {
        let mut device = RecordingDevice::default();
        let ring = FrameResourceRing::new(&mut device, 2, CAPS, Duration::from_secs(1)).unwrap();
        assert_eq!(device.live_buffer_count(), 12);
        ring.release(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
    }
}
