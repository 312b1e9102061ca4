//! wgpu Device
//!
//! [`WgpuDevice`] drives real hardware through `wgpu`. The explicit command
//! model of [`GpuDevice`] maps onto wgpu as follows:
//!
//! - Commands between `begin_commands` and `execute` are recorded into an op
//!   list and replayed into a single `CommandEncoder` on `execute`.
//! - Barriers only update tracked state; wgpu inserts transitions itself.
//! - A clear becomes `LoadOp::Clear` on the pass that immediately follows it
//!   when that pass targets the cleared texture, and a standalone clear pass
//!   otherwise.
//! - Constant slots live in bind group 0 (`@binding(n)` is `b{n}`), texture
//!   slots in group 1 and the static samplers in group 2.
//! - The fence is a counter bumped by `Queue::on_submitted_work_done`
//!   callbacks, which fire while the device is polled.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use smallvec::SmallVec;

use super::{
    AddressMode, AllocatorId, Barrier, BlendMode, BufferDesc, BufferId, BufferUsage, CompareFunction,
    ConstantBinding, CullMode, DepthState, GeometryBinding, GpuDevice, IndexFormat, InputLayout, PassDesc, PipelineDesc,
    PipelineId, ResourceState, SamplerFilter, StaticSampler, TextureBindingKind, TextureDesc, TextureDimension,
    TextureFormat, TextureId, TextureUsages, STATIC_SAMPLERS,
};
use crate::errors::{RenderError, Result};

const POLL_INTERVAL: Duration = Duration::from_micros(250);

/// Diffuse, ZW, normal, albedo and fresnel-roughness written in one pass.
const GBUFFER_BYTES_PER_SAMPLE: u32 = 4 + 16 + 8 + 4 + 4;

// ============================================================================
// Device-side objects
// ============================================================================

struct TextureEntry {
    texture: wgpu::Texture,
    /// View used when the texture is bound to a shader slot.
    sampled_view: wgpu::TextureView,
    /// One 2D view per array layer, used as render attachments.
    layer_views: SmallVec<[wgpu::TextureView; 6]>,
    desc: TextureDesc,
    state: ResourceState,
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    size: u64,
}

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    constants_layout: wgpu::BindGroupLayout,
    textures_layout: wgpu::BindGroupLayout,
    constant_slots: SmallVec<[u32; 6]>,
    texture_count: u32,
    name: &'static str,
}

#[derive(Debug, Clone, Copy)]
enum ClearValue {
    Color([f32; 4]),
    Depth(f32),
}

/// One recorded command, replayed on `execute`.
enum Op {
    Clear { texture: TextureId, layer: u32, value: ClearValue },
    BeginPass(PassDesc),
    EndPass,
    SetPipeline(PipelineId),
    BindTexture(u32, TextureId),
    BindConstants(u32, ConstantBinding),
    SetGeometry(GeometryBinding),
    DrawIndexed { index_count: u32, start_index: u32, base_vertex: i32 },
    Draw(u32),
    PushDebugGroup(String),
    PopDebugGroup,
}

/// Slot tables as seen by the draw being replayed.
#[derive(Default)]
struct BoundState {
    pipeline: Option<PipelineId>,
    constants: FxHashMap<u32, ConstantBinding>,
    textures: FxHashMap<u32, TextureId>,
    constants_dirty: bool,
    textures_dirty: bool,
}

impl BoundState {
    fn invalidate(&mut self) {
        self.constants_dirty = true;
        self.textures_dirty = true;
    }
}

// ============================================================================
// WgpuDevice
// ============================================================================

/// A [`GpuDevice`] backed by a wgpu device, queue and window surface.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    surface_format: TextureFormat,

    samplers_layout: wgpu::BindGroupLayout,
    samplers_group: wgpu::BindGroup,

    textures: SlotMap<TextureId, TextureEntry>,
    buffers: SlotMap<BufferId, BufferEntry>,
    pipelines: SlotMap<PipelineId, PipelineEntry>,
    allocators: SlotMap<AllocatorId, String>,
    shader_modules: FxHashMap<std::path::PathBuf, wgpu::ShaderModule>,

    ops: Vec<Op>,
    recording: Option<AllocatorId>,

    current_frame: Option<wgpu::SurfaceTexture>,
    back_buffer: Option<TextureId>,

    fence: Arc<AtomicU64>,
    lost: Arc<Mutex<Option<String>>>,
}

impl WgpuDevice {
    /// Creates a device presenting to `window`.
    ///
    /// The surface is configured with a non-sRGB format: the post process
    /// pass writes display-ready values.
    pub fn new<W>(window: W, width: u32, height: u32, vsync: bool) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        pollster::block_on(Self::new_async(window, width, height, vsync))
    }

    async fn new_async<W>(window: W, width: u32, height: u32, vsync: bool) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSurfaceSize { width, height });
        }

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        // The G-buffer normal target is Rgba16Snorm.
        if !adapter.features().contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM) {
            return Err(RenderError::AdapterRequestFailed(
                "adapter lacks 16-bit normalized texture formats".to_string(),
            ));
        }
        let adapter_limits = adapter.limits();
        if adapter_limits.max_color_attachment_bytes_per_sample < GBUFFER_BYTES_PER_SAMPLE {
            return Err(RenderError::AdapterRequestFailed(format!(
                "adapter allows {} color attachment bytes per sample, the G-buffer needs {GBUFFER_BYTES_PER_SAMPLE}",
                adapter_limits.max_color_attachment_bytes_per_sample
            )));
        }
        // Shadow lookups outside the map should read as lit.
        let required_features = wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
            | (adapter.features() & wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Penumbra Device"),
                required_features,
                required_limits: wgpu::Limits {
                    max_color_attachment_bytes_per_sample: adapter_limits.max_color_attachment_bytes_per_sample,
                    ..wgpu::Limits::default()
                },
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let lost = Arc::new(Mutex::new(None));
        let lost_slot = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            log::error!("Device lost ({reason:?}): {message}");
            if let Ok(mut slot) = lost_slot.lock() {
                *slot = Some(message);
            }
        });

        let mut config = surface
            .get_default_config(&adapter, width, height)
            .ok_or_else(|| RenderError::AdapterRequestFailed("Surface not supported by adapter".to_string()))?;
        config.format = config.format.remove_srgb_suffix();
        config.present_mode = if vsync { wgpu::PresentMode::AutoVsync } else { wgpu::PresentMode::AutoNoVsync };
        let surface_format = match config.format {
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            other => return Err(RenderError::Surface(format!("unsupported surface format {other:?}"))),
        };
        surface.configure(&device, &config);

        let border = required_features.contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let (samplers_layout, samplers_group) = create_static_samplers(&device, border);

        Ok(Self {
            device,
            queue,
            surface,
            config,
            surface_format,
            samplers_layout,
            samplers_group,
            textures: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            allocators: SlotMap::with_key(),
            shader_modules: FxHashMap::default(),
            ops: Vec::new(),
            recording: None,
            current_frame: None,
            back_buffer: None,
            fence: Arc::new(AtomicU64::new(0)),
            lost,
        })
    }

    /// The current surface size.
    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn check_lost(&self) -> Result<()> {
        match self.lost.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(message) => Err(RenderError::DeviceLost(message.clone())),
                None => Ok(()),
            },
            Err(_) => Err(RenderError::DeviceLost("device lost callback panicked".to_string())),
        }
    }

    fn poll(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Poll)
            .map(|_| ())
            .map_err(|e| RenderError::DeviceLost(e.to_string()))
    }

    fn shader_module(&mut self, path: &std::path::Path) -> Result<wgpu::ShaderModule> {
        if let Some(module) = self.shader_modules.get(path) {
            return Ok(module.clone());
        }
        let source = std::fs::read_to_string(path).map_err(|e| RenderError::Shader {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let label = path.display().to_string();
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        self.shader_modules.insert(path.to_path_buf(), module.clone());
        Ok(module)
    }

    fn attachment_view(&self, texture: TextureId, layer: u32) -> Option<&wgpu::TextureView> {
        self.textures.get(texture).and_then(|entry| entry.layer_views.get(layer as usize))
    }

    fn record(&mut self, op: Op) {
        if self.recording.is_none() {
            log::warn!("Command recorded outside begin_commands/execute; dropped");
            return;
        }
        self.ops.push(op);
    }
}

// ============================================================================
// Format & state mapping
// ============================================================================

fn map_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        TextureFormat::Rgba16Snorm => wgpu::TextureFormat::Rgba16Snorm,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn map_usage(usage: TextureUsages) -> wgpu::TextureUsages {
    let mut out = wgpu::TextureUsages::empty();
    if usage.intersects(TextureUsages::RENDER_TARGET | TextureUsages::DEPTH_STENCIL) {
        out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
    }
    if usage.contains(TextureUsages::SHADER_RESOURCE) {
        out |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if usage.contains(TextureUsages::COPY_DST) {
        out |= wgpu::TextureUsages::COPY_DST;
    }
    out
}

fn map_compare(compare: CompareFunction) -> wgpu::CompareFunction {
    match compare {
        CompareFunction::Less => wgpu::CompareFunction::Less,
        CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunction::Greater => wgpu::CompareFunction::Greater,
        CompareFunction::Always => wgpu::CompareFunction::Always,
    }
}

fn map_cull(cull: CullMode) -> Option<wgpu::Face> {
    match cull {
        CullMode::None => None,
        CullMode::Front => Some(wgpu::Face::Front),
        CullMode::Back => Some(wgpu::Face::Back),
    }
}

/// `Replace` disables blending outright so 32-bit float targets stay legal.
fn map_blend(blend: BlendMode) -> Option<wgpu::BlendState> {
    match blend {
        BlendMode::Replace => None,
        BlendMode::Additive => {
            let add = wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            };
            Some(wgpu::BlendState { color: add, alpha: add })
        }
    }
}

fn map_index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

fn texture_binding_type(kind: TextureBindingKind) -> wgpu::BindingType {
    let (sample_type, view_dimension) = match kind {
        TextureBindingKind::Float2d => {
            (wgpu::TextureSampleType::Float { filterable: true }, wgpu::TextureViewDimension::D2)
        }
        TextureBindingKind::UnfilterableFloat2d => {
            (wgpu::TextureSampleType::Float { filterable: false }, wgpu::TextureViewDimension::D2)
        }
        TextureBindingKind::Cube => {
            (wgpu::TextureSampleType::Float { filterable: true }, wgpu::TextureViewDimension::Cube)
        }
        TextureBindingKind::DepthArray => (wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::D2Array),
    };
    wgpu::BindingType::Texture { sample_type, view_dimension, multisampled: false }
}

/// Vertex layout matching [`crate::scene::Vertex`]: tangent, position, normal, uv.
const STANDARD_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
    3 => Float32x2
];
const STANDARD_STRIDE: u64 = 44;

fn create_static_samplers(device: &wgpu::Device, border: bool) -> (wgpu::BindGroupLayout, wgpu::BindGroup) {
    let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = STATIC_SAMPLERS
        .iter()
        .zip(0u32..)
        .map(|(sampler, binding)| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(match sampler.filter {
                SamplerFilter::Comparison => wgpu::SamplerBindingType::Comparison,
                SamplerFilter::Point => wgpu::SamplerBindingType::NonFiltering,
                SamplerFilter::Linear | SamplerFilter::Anisotropic => wgpu::SamplerBindingType::Filtering,
            }),
            count: None,
        })
        .collect();
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Static Samplers Layout"),
        entries: &layout_entries,
    });

    let samplers: Vec<wgpu::Sampler> = STATIC_SAMPLERS.iter().map(|s| create_sampler(device, s, border)).collect();
    let entries: Vec<wgpu::BindGroupEntry> = samplers
        .iter()
        .zip(0u32..)
        .map(|(sampler, binding)| wgpu::BindGroupEntry { binding, resource: wgpu::BindingResource::Sampler(sampler) })
        .collect();
    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Static Samplers"),
        layout: &layout,
        entries: &entries,
    });
    (layout, group)
}

fn create_sampler(device: &wgpu::Device, sampler: &StaticSampler, border: bool) -> wgpu::Sampler {
    let address = match sampler.address {
        AddressMode::Wrap => wgpu::AddressMode::Repeat,
        AddressMode::Clamp => wgpu::AddressMode::ClampToEdge,
        AddressMode::Border if border => wgpu::AddressMode::ClampToBorder,
        AddressMode::Border => wgpu::AddressMode::ClampToEdge,
    };
    let (filter, mipmap_filter) = match sampler.filter {
        SamplerFilter::Point => (wgpu::FilterMode::Nearest, wgpu::MipmapFilterMode::Nearest),
        _ => (wgpu::FilterMode::Linear, wgpu::MipmapFilterMode::Linear),
    };
    let comparison = sampler.filter == SamplerFilter::Comparison;
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Static Sampler"),
        address_mode_u: address,
        address_mode_v: address,
        address_mode_w: address,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        compare: comparison.then_some(wgpu::CompareFunction::LessEqual),
        anisotropy_clamp: if sampler.filter == SamplerFilter::Anisotropic { sampler.max_anisotropy } else { 1 },
        border_color: (border && sampler.address == AddressMode::Border)
            .then_some(wgpu::SamplerBorderColor::OpaqueWhite),
        ..Default::default()
    })
}

// ============================================================================
// GpuDevice
// ============================================================================

impl GpuDevice for WgpuDevice {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        let fail = |reason: &str| RenderError::ResourceCreation {
            kind: "texture",
            label: desc.label.clone(),
            reason: reason.to_string(),
        };
        if desc.width == 0 || desc.height == 0 || desc.layers == 0 {
            return Err(fail("zero-sized texture"));
        }
        let limits = self.device.limits();
        if desc.width > limits.max_texture_dimension_2d || desc.height > limits.max_texture_dimension_2d {
            return Err(fail("exceeds max_texture_dimension_2d"));
        }
        if desc.dimension == TextureDimension::Cube && desc.layers != 6 {
            return Err(fail("cube textures need six layers"));
        }

        let format = map_format(desc.format);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: desc.layers },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: map_usage(desc.usage),
            view_formats: &[],
        });

        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&desc.label),
            dimension: Some(match desc.dimension {
                TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                TextureDimension::D2Array => wgpu::TextureViewDimension::D2Array,
                TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
            }),
            ..Default::default()
        });
        let layer_views = if desc.usage.intersects(TextureUsages::RENDER_TARGET | TextureUsages::DEPTH_STENCIL) {
            (0..desc.layers)
                .map(|layer| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(&desc.label),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
                .collect()
        } else {
            SmallVec::new()
        };

        Ok(self.textures.insert(TextureEntry {
            texture,
            sampled_view,
            layer_views,
            desc: desc.clone(),
            state: desc.initial_state,
        }))
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, texels: &[u8]) -> Result<()> {
        let entry = self.textures.get(texture).ok_or_else(|| RenderError::ResourceCreation {
            kind: "texture",
            label: format!("{texture:?}"),
            reason: "write to a destroyed texture".to_string(),
        })?;
        let desc = &entry.desc;
        let expected = u64::from(desc.width) * u64::from(desc.height) * u64::from(desc.format.bytes_per_pixel());
        if texels.len() as u64 != expected || layer >= desc.layers {
            return Err(RenderError::ResourceCreation {
                kind: "texture",
                label: desc.label.clone(),
                reason: format!("layer {layer}: expected {expected} bytes, got {}", texels.len()),
            });
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel()),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d { width: desc.width, height: desc.height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(texture) {
            entry.texture.destroy();
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        if desc.size == 0 || desc.size > self.device.limits().max_buffer_size {
            return Err(RenderError::ResourceCreation {
                kind: "buffer",
                label: desc.label.clone(),
                reason: format!("invalid size {}", desc.size),
            });
        }
        let usage = match desc.usage {
            BufferUsage::Constant => wgpu::BufferUsages::UNIFORM,
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        } | wgpu::BufferUsages::COPY_DST;
        let size = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });
        Ok(self.buffers.insert(BufferEntry { buffer, size }))
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        let Some(entry) = self.buffers.get(buffer) else {
            log::warn!("write_buffer on destroyed buffer {buffer:?}");
            return;
        };
        if offset + data.len() as u64 > entry.size {
            log::error!("write_buffer out of range: {} bytes at {offset} (size {})", data.len(), entry.size);
            return;
        }
        // Queue writes must cover whole words.
        if data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            self.queue.write_buffer(&entry.buffer, offset, &padded);
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(buffer) {
            entry.buffer.destroy();
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineId> {
        let vertex_module = self.shader_module(&desc.vertex.path)?;
        let fragment_module = desc.fragment.as_ref().map(|f| self.shader_module(&f.path)).transpose()?;

        let constant_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .constant_slots
            .iter()
            .map(|&slot| wgpu::BindGroupLayoutEntry {
                binding: slot,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let constants_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name),
            entries: &constant_entries,
        });

        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = desc
            .textures
            .iter()
            .zip(0u32..)
            .map(|(&kind, binding)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: texture_binding_type(kind),
                count: None,
            })
            .collect();
        let textures_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name),
            entries: &texture_entries,
        });

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.name),
            bind_group_layouts: &[&constants_layout, &textures_layout, &self.samplers_layout],
            immediate_size: 0,
        });

        let vertex_buffers: &[wgpu::VertexBufferLayout] = match desc.input_layout {
            InputLayout::None => &[],
            InputLayout::Standard => &[wgpu::VertexBufferLayout {
                array_stride: STANDARD_STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &STANDARD_ATTRIBUTES,
            }],
        };

        let blend = map_blend(desc.blend);
        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format: map_format(format),
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let depth_stencil = desc.depth_format.map(|format| {
            let state = desc.depth.unwrap_or(DepthState { compare: CompareFunction::Always, write: false });
            let bias = desc.depth_bias.map_or_else(wgpu::DepthBiasState::default, |b| wgpu::DepthBiasState {
                constant: b.constant,
                slope_scale: b.slope_scale,
                clamp: b.clamp,
            });
            wgpu::DepthStencilState {
                format: map_format(format),
                depth_write_enabled: state.write,
                depth_compare: map_compare(state.compare),
                stencil: wgpu::StencilState::default(),
                bias,
            }
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.name),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(desc.vertex.entry_point),
                buffers: vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: match (&fragment_module, &desc.fragment) {
                (Some(module), Some(stage)) => Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(stage.entry_point),
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                _ => None,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                // Left-handed, clockwise front faces.
                front_face: wgpu::FrontFace::Cw,
                cull_mode: map_cull(desc.cull),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
            multiview_mask: None,
            cache: None,
        });

        log::debug!("Created pipeline '{}'", desc.name);
        Ok(self.pipelines.insert(PipelineEntry {
            pipeline,
            constants_layout,
            textures_layout,
            constant_slots: desc.constant_slots.clone(),
            texture_count: desc.textures.len() as u32,
            name: desc.name,
        }))
    }

    fn create_command_allocator(&mut self, label: &str) -> Result<AllocatorId> {
        Ok(self.allocators.insert(label.to_string()))
    }

    // ========================================================================
    // Recording
    // ========================================================================

    fn begin_commands(&mut self, allocator: AllocatorId) -> Result<()> {
        self.check_lost()?;
        if !self.allocators.contains_key(allocator) {
            return Err(RenderError::ResourceCreation {
                kind: "command list",
                label: format!("{allocator:?}"),
                reason: "unknown command allocator".to_string(),
            });
        }
        self.ops.clear();
        self.recording = Some(allocator);
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[Barrier]) {
        for barrier in barriers {
            if let Some(entry) = self.textures.get_mut(barrier.texture) {
                if entry.state != barrier.before {
                    log::warn!(
                        "Barrier on '{}' expects {:?} but texture is {:?}",
                        entry.desc.label,
                        barrier.before,
                        entry.state
                    );
                }
                entry.state = barrier.after;
            }
        }
    }

    fn clear_color(&mut self, texture: TextureId, color: [f32; 4]) {
        self.record(Op::Clear { texture, layer: 0, value: ClearValue::Color(color) });
    }

    fn clear_depth(&mut self, texture: TextureId, depth: f32) {
        let layers = self.textures.get(texture).map_or(1, |entry| entry.desc.layers);
        for layer in 0..layers {
            self.record(Op::Clear { texture, layer, value: ClearValue::Depth(depth) });
        }
    }

    fn begin_pass(&mut self, pass: &PassDesc) {
        self.record(Op::BeginPass(pass.clone()));
    }

    fn end_pass(&mut self) {
        self.record(Op::EndPass);
    }

    fn set_pipeline(&mut self, pipeline: PipelineId) {
        self.record(Op::SetPipeline(pipeline));
    }

    fn bind_texture(&mut self, slot: u32, texture: TextureId) {
        self.record(Op::BindTexture(slot, texture));
    }

    fn bind_constants(&mut self, slot: u32, binding: ConstantBinding) {
        self.record(Op::BindConstants(slot, binding));
    }

    fn set_geometry(&mut self, geometry: GeometryBinding) {
        self.record(Op::SetGeometry(geometry));
    }

    fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) {
        self.record(Op::DrawIndexed { index_count, start_index, base_vertex });
    }

    fn draw(&mut self, vertex_count: u32) {
        self.record(Op::Draw(vertex_count));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.record(Op::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.record(Op::PopDebugGroup);
    }

    fn execute(&mut self) -> Result<()> {
        self.check_lost()?;
        let Some(allocator) = self.recording.take() else {
            return Err(RenderError::NotReady("execute without begin_commands"));
        };
        let label = self.allocators.get(allocator).cloned().unwrap_or_default();
        let ops = std::mem::take(&mut self.ops);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&label) });
        self.replay(&mut encoder, &ops);
        self.queue.submit(std::iter::once(encoder.finish()));

        // Keep the allocation for the next frame.
        self.ops = ops;
        self.ops.clear();
        Ok(())
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    fn signal(&mut self, value: u64) -> Result<()> {
        self.check_lost()?;
        let fence = Arc::clone(&self.fence);
        self.queue.on_submitted_work_done(move || {
            fence.fetch_max(value, Ordering::AcqRel);
        });
        Ok(())
    }

    fn completed_value(&self) -> u64 {
        if let Err(e) = self.poll() {
            log::warn!("Device poll failed: {e}");
        }
        self.fence.load(Ordering::Acquire)
    }

    fn wait_for_value(&mut self, value: u64, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        loop {
            self.check_lost()?;
            self.poll()?;
            let completed = self.fence.load(Ordering::Acquire);
            if completed >= value {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(RenderError::FenceTimeout { value, completed, timeout });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    // ========================================================================
    // Presentation
    // ========================================================================

    fn back_buffer(&mut self) -> Result<TextureId> {
        if let Some(id) = self.back_buffer {
            return Ok(id);
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                self.surface.get_current_texture().map_err(|e| RenderError::Surface(e.to_string()))?
            }
            Err(e) => return Err(RenderError::Surface(e.to_string())),
        };

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.textures.insert(TextureEntry {
            texture: frame.texture.clone(),
            sampled_view: view.clone(),
            layer_views: smallvec::smallvec![view],
            desc: TextureDesc {
                label: "Back Buffer".to_string(),
                width: self.config.width,
                height: self.config.height,
                layers: 1,
                dimension: TextureDimension::D2,
                format: self.surface_format,
                usage: TextureUsages::RENDER_TARGET,
                initial_state: ResourceState::Common,
            },
            state: ResourceState::Common,
        });
        self.current_frame = Some(frame);
        self.back_buffer = Some(id);
        Ok(id)
    }

    fn present(&mut self) -> Result<()> {
        if let Some(id) = self.back_buffer.take() {
            self.textures.remove(id);
        }
        let frame = self.current_frame.take().ok_or(RenderError::NotReady("present without a back buffer"))?;
        frame.present();
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSurfaceSize { width, height });
        }
        // Drop an acquired but unpresented image before reconfiguring.
        if let Some(id) = self.back_buffer.take() {
            self.textures.remove(id);
        }
        self.current_frame = None;

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        Ok(())
    }

    fn surface_format(&self) -> TextureFormat {
        self.surface_format
    }
}

// ============================================================================
// Replay
// ============================================================================

impl WgpuDevice {
    fn replay(&self, encoder: &mut wgpu::CommandEncoder, ops: &[Op]) {
        let mut bound = BoundState::default();
        let mut pending_clears: SmallVec<[(TextureId, u32, ClearValue); 16]> = SmallVec::new();
        let mut pass: Option<wgpu::RenderPass<'static>> = None;

        for op in ops {
            match op {
                Op::Clear { texture, layer, value } => {
                    pending_clears.push((*texture, *layer, *value));
                    continue;
                }
                Op::BeginPass(desc) => {
                    drop(pass.take());
                    pass = self.open_pass(encoder, desc, &mut pending_clears);
                    if let Some(rpass) = pass.as_mut() {
                        let v = desc.viewport;
                        rpass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
                        rpass.set_scissor_rect(v.x as u32, v.y as u32, v.width as u32, v.height as u32);
                        rpass.set_bind_group(2, &self.samplers_group, &[]);
                    }
                    // Pipelines and bind groups do not survive a pass boundary.
                    bound.pipeline = None;
                    bound.invalidate();
                    continue;
                }
                _ => {}
            }
            self.flush_clears(encoder, &mut pending_clears);

            match op {
                Op::Clear { .. } | Op::BeginPass(_) => {}
                Op::EndPass => pass = None,
                Op::SetPipeline(id) => {
                    bound.pipeline = Some(*id);
                    bound.invalidate();
                    if let (Some(rpass), Some(pipeline)) = (pass.as_mut(), self.pipelines.get(*id)) {
                        rpass.set_pipeline(&pipeline.pipeline);
                    }
                }
                Op::BindTexture(slot, texture) => {
                    bound.textures.insert(*slot, *texture);
                    bound.textures_dirty = true;
                }
                Op::BindConstants(slot, binding) => {
                    bound.constants.insert(*slot, *binding);
                    bound.constants_dirty = true;
                }
                Op::SetGeometry(geometry) => {
                    if let (Some(rpass), Some(vb), Some(ib)) = (
                        pass.as_mut(),
                        self.buffers.get(geometry.vertex_buffer),
                        self.buffers.get(geometry.index_buffer),
                    ) {
                        rpass.set_vertex_buffer(0, vb.buffer.slice(..));
                        rpass.set_index_buffer(ib.buffer.slice(..), map_index_format(geometry.index_format));
                    }
                }
                Op::DrawIndexed { index_count, start_index, base_vertex } => {
                    if let Some(rpass) = pass.as_mut() {
                        if self.apply_bindings(rpass, &mut bound) {
                            rpass.draw_indexed(*start_index..start_index + index_count, *base_vertex, 0..1);
                        }
                    }
                }
                Op::Draw(vertex_count) => {
                    if let Some(rpass) = pass.as_mut() {
                        if self.apply_bindings(rpass, &mut bound) {
                            rpass.draw(0..*vertex_count, 0..1);
                        }
                    }
                }
                Op::PushDebugGroup(label) => match pass.as_mut() {
                    Some(rpass) => rpass.push_debug_group(label),
                    None => encoder.push_debug_group(label),
                },
                Op::PopDebugGroup => match pass.as_mut() {
                    Some(rpass) => rpass.pop_debug_group(),
                    None => encoder.pop_debug_group(),
                },
            }
        }
        drop(pass);
        self.flush_clears(encoder, &mut pending_clears);
    }

    /// Begins a render pass, folding pending clears of its attachments into
    /// the load ops.
    fn open_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        desc: &PassDesc,
        pending: &mut SmallVec<[(TextureId, u32, ClearValue); 16]>,
    ) -> Option<wgpu::RenderPass<'static>> {
        let mut take_clear = |texture: TextureId, layer: u32| {
            let index = pending.iter().position(|&(t, l, _)| t == texture && l == layer)?;
            Some(pending.remove(index).2)
        };

        let mut color_attachments: SmallVec<[Option<wgpu::RenderPassColorAttachment>; 8]> = SmallVec::new();
        for &texture in &desc.color_targets {
            let Some(view) = self.attachment_view(texture, 0) else {
                log::error!("Pass '{}' targets a missing texture", desc.label);
                return None;
            };
            let load = match take_clear(texture, 0) {
                Some(ClearValue::Color([r, g, b, a])) => wgpu::LoadOp::Clear(wgpu::Color {
                    r: f64::from(r),
                    g: f64::from(g),
                    b: f64::from(b),
                    a: f64::from(a),
                }),
                _ => wgpu::LoadOp::Load,
            };
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
                depth_slice: None,
            }));
        }

        let depth_stencil_attachment = match desc.depth_target {
            Some(target) => {
                let Some(view) = self.attachment_view(target.texture, target.layer) else {
                    log::error!("Pass '{}' targets a missing depth layer", desc.label);
                    return None;
                };
                let load = match take_clear(target.texture, target.layer) {
                    Some(ClearValue::Depth(depth)) => wgpu::LoadOp::Clear(depth),
                    _ => wgpu::LoadOp::Load,
                };
                Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations { load, store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                })
            }
            None => None,
        };

        // Clears the pass did not absorb must land before it runs.
        self.flush_clears(encoder, pending);

        let rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(desc.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            ..Default::default()
        });
        Some(rpass.forget_lifetime())
    }

    /// Issues every pending clear as its own empty pass.
    fn flush_clears(&self, encoder: &mut wgpu::CommandEncoder, pending: &mut SmallVec<[(TextureId, u32, ClearValue); 16]>) {
        for (texture, layer, value) in pending.drain(..) {
            let Some(view) = self.attachment_view(texture, layer) else {
                continue;
            };
            match value {
                ClearValue::Color([r, g, b, a]) => {
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: f64::from(r),
                                    g: f64::from(g),
                                    b: f64::from(b),
                                    a: f64::from(a),
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        })],
                        ..Default::default()
                    });
                }
                ClearValue::Depth(depth) => {
                    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear Depth"),
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        }),
                        ..Default::default()
                    });
                }
            }
        }
    }

    /// Rebuilds the bind groups that changed since the last draw. Returns
    /// `false` when a slot the pipeline reads is unbound.
    fn apply_bindings(&self, rpass: &mut wgpu::RenderPass<'static>, bound: &mut BoundState) -> bool {
        let Some(pipeline) = bound.pipeline.and_then(|p| self.pipelines.get(p)) else {
            log::warn!("Draw without a pipeline; skipped");
            return false;
        };

        if bound.constants_dirty {
            let mut entries: SmallVec<[wgpu::BindGroupEntry; 6]> = SmallVec::new();
            for &slot in &pipeline.constant_slots {
                let Some(binding) = bound.constants.get(&slot) else {
                    log::warn!("'{}' draw with constant slot b{slot} unbound; skipped", pipeline.name);
                    return false;
                };
                let Some(buffer) = self.buffers.get(binding.buffer) else {
                    return false;
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: slot,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer.buffer,
                        offset: binding.offset,
                        size: NonZeroU64::new(binding.size),
                    }),
                });
            }
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pipeline.name),
                layout: &pipeline.constants_layout,
                entries: &entries,
            });
            rpass.set_bind_group(0, &group, &[]);
            bound.constants_dirty = false;
        }

        if bound.textures_dirty {
            let mut entries: SmallVec<[wgpu::BindGroupEntry; 10]> = SmallVec::new();
            for slot in 0..pipeline.texture_count {
                let Some(entry) = bound.textures.get(&slot).and_then(|&t| self.textures.get(t)) else {
                    log::warn!("'{}' draw with texture slot t{slot} unbound; skipped", pipeline.name);
                    return false;
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: slot,
                    resource: wgpu::BindingResource::TextureView(&entry.sampled_view),
                });
            }
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(pipeline.name),
                layout: &pipeline.textures_layout,
                entries: &entries,
            });
            rpass.set_bind_group(1, &group, &[]);
            bound.textures_dirty = false;
        }
        true
    }
}
