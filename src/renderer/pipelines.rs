//! Pipeline Library
//!
//! Every pipeline state object the frame needs is built once at
//! initialization and addressed by [`PipelineKind`]. All pipelines share one
//! binding model:
//!
//! | Register | Contents |
//! |----------|----------|
//! | `b0` | object constants |
//! | `b1` | pass (camera) constants |
//! | `b2` | material constants |
//! | `b3` | light constants |
//! | `b4` | shadow view constants |
//! | `b5` | post-process constants |
//! | `t0..` | per-pipeline textures, see [`slots`] |
//! | `s0..s6` | [`crate::gpu::STATIC_SAMPLERS`] |

use smallvec::smallvec;

use super::gbuffer::Attachment;
use super::settings::ShaderSettings;
use super::shadow::SHADOW_MAP_FORMAT;
use crate::errors::Result;
use crate::gpu::{
    BlendMode, CompareFunction, CullMode, DepthBias, DepthState, GpuDevice, InputLayout, PipelineDesc, PipelineId,
    ShaderStageRef, TextureBindingKind, TextureFormat,
};

/// Scene depth buffer format.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Register assignments shared by the pipelines and the passes that feed them.
pub mod slots {
    pub const OBJECT: u32 = 0;
    pub const PASS: u32 = 1;
    pub const MATERIAL: u32 = 2;
    pub const LIGHT: u32 = 3;
    pub const SHADOW_VIEW: u32 = 4;
    pub const POST_PROCESS: u32 = 5;

    /// Geometry pass textures.
    pub const DIFFUSE_MAP: u32 = 0;
    pub const NORMAL_MAP: u32 = 1;
    pub const DISPLACEMENT_MAP: u32 = 2;

    /// Sky pass texture.
    pub const SKY_CUBE: u32 = 0;

    /// Lighting pass textures. `t0..t4` hold the G-buffer surface in
    /// attachment order.
    pub const GBUFFER_FIRST: u32 = 0;
    pub const SKY_DIFFUSE: u32 = 5;
    pub const SKY_IRRADIANCE: u32 = 6;
    pub const BRDF_LUT: u32 = 7;
    pub const SHADOW_MAP: u32 = 8;

    /// Post-process textures.
    pub const BLOOM: u32 = 0;
    pub const ZW: u32 = 1;
    pub const NORMAL: u32 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineKind {
    /// Fills the five G-buffer surface attachments.
    Geometry = 0,
    /// Depth-only rendering into a shadow map layer.
    ShadowOpaque = 1,
    Sky = 2,
    /// Full-screen directional light.
    DeferredLights = 3,
    /// Point and spot lights, rasterizing their bounding volume.
    LightVolumes = 4,
    /// Full-screen image-based ambient term.
    DeferredAmbient = 5,
    PostProcess = 6,
}

impl PipelineKind {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Geometry,
        Self::ShadowOpaque,
        Self::Sky,
        Self::DeferredLights,
        Self::LightVolumes,
        Self::DeferredAmbient,
        Self::PostProcess,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Geometry => "Deferred Geometry",
            Self::ShadowOpaque => "Shadow Opaque",
            Self::Sky => "Sky",
            Self::DeferredLights => "Deferred Lights",
            Self::LightVolumes => "Light Volumes",
            Self::DeferredAmbient => "Deferred Ambient",
            Self::PostProcess => "Post Process",
        }
    }

    /// Full pipeline description. `surface_format` is the back buffer
    /// format written by post-processing.
    #[must_use]
    pub fn desc(self, shaders: &ShaderSettings, surface_format: TextureFormat) -> PipelineDesc {
        let stage = |file: &str, entry_point: &'static str| ShaderStageRef { path: shaders.resolve(file), entry_point };

        let lighting_textures = || {
            let mut textures: smallvec::SmallVec<[TextureBindingKind; 10]> = Attachment::SURFACE
                .iter()
                .map(|a| match a {
                    Attachment::ZW => TextureBindingKind::UnfilterableFloat2d,
                    _ => TextureBindingKind::Float2d,
                })
                .collect();
            textures.extend([TextureBindingKind::Cube, TextureBindingKind::Cube, TextureBindingKind::Float2d]);
            textures
        };

        match self {
            Self::Geometry => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.deferred_geometry, "vs_main"),
                fragment: Some(stage(&shaders.deferred_geometry, "fs_main")),
                input_layout: InputLayout::Standard,
                color_formats: Attachment::SURFACE.iter().map(|a| a.format()).collect(),
                depth_format: Some(DEPTH_FORMAT),
                depth: Some(DepthState { compare: CompareFunction::Less, write: true }),
                cull: CullMode::Back,
                blend: BlendMode::Replace,
                depth_bias: None,
                textures: smallvec![TextureBindingKind::Float2d; 3],
                constant_slots: smallvec![slots::OBJECT, slots::PASS, slots::MATERIAL],
            },
            Self::ShadowOpaque => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.shadows, "vs_main"),
                fragment: None,
                input_layout: InputLayout::Standard,
                color_formats: smallvec![],
                depth_format: Some(SHADOW_MAP_FORMAT),
                depth: Some(DepthState { compare: CompareFunction::Less, write: true }),
                cull: CullMode::Back,
                blend: BlendMode::Replace,
                depth_bias: Some(DepthBias { constant: 1000, slope_scale: 1.0, clamp: 0.0 }),
                textures: smallvec![],
                constant_slots: smallvec![slots::OBJECT, slots::SHADOW_VIEW],
            },
            Self::Sky => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.sky, "vs_main"),
                fragment: Some(stage(&shaders.sky, "fs_main")),
                input_layout: InputLayout::Standard,
                color_formats: smallvec![Attachment::Bloom.format()],
                depth_format: Some(DEPTH_FORMAT),
                // The camera sits inside the sky mesh.
                depth: Some(DepthState { compare: CompareFunction::LessEqual, write: true }),
                cull: CullMode::None,
                blend: BlendMode::Replace,
                depth_bias: None,
                textures: smallvec![TextureBindingKind::Cube],
                constant_slots: smallvec![slots::OBJECT, slots::PASS],
            },
            Self::DeferredLights => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.deferred_lighting, "vs_fullscreen"),
                fragment: Some(stage(&shaders.deferred_lighting, "fs_directional")),
                input_layout: InputLayout::None,
                color_formats: smallvec![Attachment::Bloom.format()],
                depth_format: Some(DEPTH_FORMAT),
                depth: None,
                cull: CullMode::None,
                blend: BlendMode::Additive,
                depth_bias: None,
                textures: {
                    let mut t = lighting_textures();
                    t.push(TextureBindingKind::DepthArray);
                    t
                },
                constant_slots: smallvec![slots::PASS, slots::LIGHT],
            },
            Self::LightVolumes => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.deferred_lighting, "vs_volume"),
                fragment: Some(stage(&shaders.deferred_lighting, "fs_volume")),
                input_layout: InputLayout::Standard,
                color_formats: smallvec![Attachment::Bloom.format()],
                depth_format: Some(DEPTH_FORMAT),
                // Back faces behind the surface: works with the camera inside the volume.
                depth: Some(DepthState { compare: CompareFunction::Greater, write: false }),
                cull: CullMode::Front,
                blend: BlendMode::Additive,
                depth_bias: None,
                textures: {
                    let mut t = lighting_textures();
                    t.push(TextureBindingKind::DepthArray);
                    t
                },
                constant_slots: smallvec![slots::PASS, slots::LIGHT],
            },
            Self::DeferredAmbient => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.deferred_lighting, "vs_fullscreen"),
                fragment: Some(stage(&shaders.deferred_lighting, "fs_ambient")),
                input_layout: InputLayout::None,
                color_formats: smallvec![Attachment::Bloom.format()],
                depth_format: Some(DEPTH_FORMAT),
                depth: None,
                cull: CullMode::None,
                blend: BlendMode::Additive,
                depth_bias: None,
                textures: lighting_textures(),
                constant_slots: smallvec![slots::PASS],
            },
            Self::PostProcess => PipelineDesc {
                name: self.name(),
                vertex: stage(&shaders.post_process, "vs_fullscreen"),
                fragment: Some(stage(&shaders.post_process, "fs_main")),
                input_layout: InputLayout::None,
                color_formats: smallvec![surface_format],
                depth_format: None,
                depth: None,
                cull: CullMode::None,
                blend: BlendMode::Replace,
                depth_bias: None,
                textures: smallvec![
                    TextureBindingKind::Float2d,
                    TextureBindingKind::UnfilterableFloat2d,
                    TextureBindingKind::Float2d,
                ],
                constant_slots: smallvec![slots::POST_PROCESS],
            },
        }
    }
}

/// Compiled pipelines, one per [`PipelineKind`].
#[derive(Debug, Clone)]
pub struct PipelineLibrary {
    pipelines: [PipelineId; PipelineKind::COUNT],
}

impl PipelineLibrary {
    pub fn new(device: &mut impl GpuDevice, shaders: &ShaderSettings, surface_format: TextureFormat) -> Result<Self> {
        let mut pipelines = [PipelineId::default(); PipelineKind::COUNT];
        for kind in PipelineKind::ALL {
            pipelines[kind as usize] = device.create_pipeline(&kind.desc(shaders, surface_format))?;
        }
        log::debug!("Built {} pipelines from {}", PipelineKind::COUNT, shaders.directory.display());
        Ok(Self { pipelines })
    }

    #[inline]
    #[must_use]
    pub fn get(&self, kind: PipelineKind) -> PipelineId {
        self.pipelines[kind as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(kind: PipelineKind) -> PipelineDesc {
        kind.desc(&ShaderSettings::default(), TextureFormat::Bgra8Unorm)
    }

    #[test]
    fn shadow_map_sits_after_the_ambient_inputs() {
        let ambient = desc(PipelineKind::DeferredAmbient);
        let lights = desc(PipelineKind::DeferredLights);
        assert_eq!(ambient.textures.len() as u32, slots::SHADOW_MAP);
        assert_eq!(lights.textures[slots::SHADOW_MAP as usize], TextureBindingKind::DepthArray);
        assert_eq!(lights.textures[Attachment::ZW as usize], TextureBindingKind::UnfilterableFloat2d);
    }

    #[test]
    fn geometry_writes_the_surface_group() {
        let geometry = desc(PipelineKind::Geometry);
        assert_eq!(geometry.color_formats.len(), Attachment::SURFACE.len());
        assert_eq!(geometry.color_formats[1], TextureFormat::Rgba32Float);
    }

    #[test]
    fn shadow_pass_is_depth_only_with_bias() {
        let shadow = desc(PipelineKind::ShadowOpaque);
        assert!(shadow.fragment.is_none());
        assert!(shadow.color_formats.is_empty());
        assert_eq!(shadow.depth_bias.map(|b| b.constant), Some(1000));
    }

    #[test]
    fn post_process_targets_the_surface() {
        let post = desc(PipelineKind::PostProcess);
        assert_eq!(post.color_formats.as_slice(), &[TextureFormat::Bgra8Unorm]);
        assert_eq!(post.depth_format, None);
        assert!(post.vertex.path.ends_with("post_process.wgsl"));
    }
}
