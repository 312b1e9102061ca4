//! Backend-neutral descriptions of GPU objects and commands.

use std::path::PathBuf;

use bitflags::bitflags;
use smallvec::SmallVec;

slotmap::new_key_type! {
    /// Handle to a texture (and its views) owned by the device.
    pub struct TextureId;
    /// Handle to a buffer owned by the device.
    pub struct BufferId;
    /// Handle to a compiled pipeline state object.
    pub struct PipelineId;
    /// Handle to a command allocator (the memory backing one recorded frame).
    pub struct AllocatorId;
}

// ============================================================================
// Formats & States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rgba16Snorm,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    #[inline]
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float => 4,
            Self::Rgba16Float | Self::Rgba16Snorm => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Resource state as seen by the GPU.
///
/// `Common` doubles as the present state of swap chain images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    RenderTarget,
    ShaderResource,
    DepthWrite,
    GenericRead,
    CopyDest,
}

impl ResourceState {
    /// States in which a shader may sample the resource.
    #[inline]
    #[must_use]
    pub const fn is_shader_readable(self) -> bool {
        matches!(self, Self::ShaderResource | Self::GenericRead)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsages: u8 {
        const RENDER_TARGET   = 1 << 0;
        const DEPTH_STENCIL   = 1 << 1;
        const SHADER_RESOURCE = 1 << 2;
        const COPY_DST        = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    D2Array,
    Cube,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsages,
    pub initial_state: ResourceState,
}

impl TextureDesc {
    /// A single-layer color attachment that can also be sampled.
    #[must_use]
    pub fn render_target(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            layers: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::RENDER_TARGET | TextureUsages::SHADER_RESOURCE,
            initial_state: ResourceState::Common,
        }
    }

    /// A sampled texture filled from the CPU.
    #[must_use]
    pub fn sampled(label: impl Into<String>, width: u32, height: u32, layers: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            layers,
            dimension: if layers == 6 { TextureDimension::Cube } else { TextureDimension::D2 },
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::SHADER_RESOURCE | TextureUsages::COPY_DST,
            initial_state: ResourceState::GenericRead,
        }
    }
}

// ============================================================================
// Buffers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// CPU-written constants, read by shaders.
    Constant,
    Vertex,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// A constant buffer view: one element of an upload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantBinding {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryBinding {
    pub vertex_buffer: BufferId,
    pub vertex_stride: u32,
    pub index_buffer: BufferId,
    pub index_format: IndexFormat,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Barrier {
    pub texture: TextureId,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl Barrier {
    #[inline]
    #[must_use]
    pub const fn transition(texture: TextureId, before: ResourceState, after: ResourceState) -> Self {
        Self { texture, before, after }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-target viewport; the scissor rectangle always matches it.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthTarget {
    pub texture: TextureId,
    /// Array layer rendered into.
    pub layer: u32,
}

/// Render targets for one pass. Contents are loaded, never implicitly cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub label: &'static str,
    pub color_targets: SmallVec<[TextureId; 8]>,
    pub depth_target: Option<DepthTarget>,
    pub viewport: Viewport,
}

// ============================================================================
// Pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Greater,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub compare: CompareFunction,
    pub write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Replace,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthBias {
    pub constant: i32,
    pub slope_scale: f32,
    pub clamp: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputLayout {
    /// Vertices are generated in the shader (full-screen passes).
    None,
    /// tangent, position, normal, uv
    Standard,
}

/// How a shader declares the texture in one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureBindingKind {
    Float2d,
    /// 32-bit float targets cannot be filtered.
    UnfilterableFloat2d,
    Cube,
    DepthArray,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStageRef {
    pub path: PathBuf,
    pub entry_point: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub name: &'static str,
    pub vertex: ShaderStageRef,
    pub fragment: Option<ShaderStageRef>,
    pub input_layout: InputLayout,
    pub color_formats: SmallVec<[TextureFormat; 8]>,
    pub depth_format: Option<TextureFormat>,
    /// `None` disables the depth test.
    pub depth: Option<DepthState>,
    pub cull: CullMode,
    pub blend: BlendMode,
    pub depth_bias: Option<DepthBias>,
    /// Texture slot `i` is `t{i}` in the shader.
    pub textures: SmallVec<[TextureBindingKind; 10]>,
    /// Constant slots (`b{n}`) the shaders read.
    pub constant_slots: SmallVec<[u32; 6]>,
}

// ============================================================================
// Static samplers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Point,
    Linear,
    Anisotropic,
    /// Linear filtering with a `LessEqual` depth comparison.
    Comparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Border,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticSampler {
    pub filter: SamplerFilter,
    pub address: AddressMode,
    pub max_anisotropy: u16,
}

/// Samplers available to every pipeline, in register order `s0..s6`.
pub const STATIC_SAMPLERS: [StaticSampler; 7] = [
    StaticSampler { filter: SamplerFilter::Point, address: AddressMode::Wrap, max_anisotropy: 1 },
    StaticSampler { filter: SamplerFilter::Point, address: AddressMode::Clamp, max_anisotropy: 1 },
    StaticSampler { filter: SamplerFilter::Linear, address: AddressMode::Wrap, max_anisotropy: 1 },
    StaticSampler { filter: SamplerFilter::Linear, address: AddressMode::Clamp, max_anisotropy: 1 },
    StaticSampler { filter: SamplerFilter::Anisotropic, address: AddressMode::Wrap, max_anisotropy: 8 },
    StaticSampler { filter: SamplerFilter::Anisotropic, address: AddressMode::Clamp, max_anisotropy: 8 },
    StaticSampler { filter: SamplerFilter::Comparison, address: AddressMode::Border, max_anisotropy: 16 },
];
