//! G-Buffer
//!
//! Seven screen-sized attachments written by the geometry pass and consumed
//! by lighting and post-processing. Their states move in lockstep through a
//! fixed cycle, one transition helper per edge:
//!
//! ```text
//!            transition_to_geometry_pass     (all 7: Common → RenderTarget)
//! Common ──────────────────────────────────▶ Geometry
//!   ▲                                          │ transition_to_lighting_pass
//!   │                                          ▼ (surface 5: RenderTarget → ShaderResource)
//!   │ transition_to_common                  Lighting
//!   │ (all 7: ShaderResource → Common)         │ transition_to_tonemap
//!   └─────────────────────────────────────  Tonemap ◀┘ (composite 2: RenderTarget → ShaderResource)
//! ```
//!
//! `abort_to_common` returns every attachment to `Common` from wherever the
//! frame stopped.
//!
//! Calling a helper out of order is a bug in the caller. Debug builds
//! assert; release builds log it and still derive every barrier from the
//! tracked state, so the barriers handed to the device are always correct.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{Barrier, GpuDevice, ResourceState, TextureDesc, TextureFormat, TextureId};

pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Attachment {
    Diffuse = 0,
    /// View-space depth terms.
    ZW = 1,
    Normal = 2,
    Albedo = 3,
    FresnelRoughness = 4,
    /// Lighting accumulation.
    Accumulation = 5,
    /// Lit scene color, input to post-processing.
    Bloom = 6,
}

impl Attachment {
    pub const COUNT: usize = 7;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Diffuse,
        Self::ZW,
        Self::Normal,
        Self::Albedo,
        Self::FresnelRoughness,
        Self::Accumulation,
        Self::Bloom,
    ];

    /// Written by the geometry pass, read by lighting.
    pub const SURFACE: [Self; 5] = [Self::Diffuse, Self::ZW, Self::Normal, Self::Albedo, Self::FresnelRoughness];

    /// Written by lighting, read by post-processing.
    pub const COMPOSITE: [Self; 2] = [Self::Accumulation, Self::Bloom];

    #[must_use]
    pub const fn format(self) -> TextureFormat {
        match self {
            Self::Diffuse | Self::Albedo | Self::FresnelRoughness | Self::Bloom => TextureFormat::Rgba8Unorm,
            Self::ZW => TextureFormat::Rgba32Float,
            Self::Normal => TextureFormat::Rgba16Snorm,
            Self::Accumulation => TextureFormat::Rgba16Float,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Diffuse => "GBuffer Diffuse",
            Self::ZW => "GBuffer ZW",
            Self::Normal => "GBuffer Normal",
            Self::Albedo => "GBuffer Albedo",
            Self::FresnelRoughness => "GBuffer Fresnel Roughness",
            Self::Accumulation => "GBuffer Accumulation",
            Self::Bloom => "GBuffer Bloom",
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

/// Where the attachments are in the per-frame cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GBufferPhase {
    Common,
    Geometry,
    Lighting,
    Tonemap,
}

#[derive(Debug)]
pub struct GBuffer {
    textures: [TextureId; Attachment::COUNT],
    states: [ResourceState; Attachment::COUNT],
    phase: GBufferPhase,
    width: u32,
    height: u32,
}

impl GBuffer {
    pub fn new(device: &mut impl GpuDevice, width: u32, height: u32) -> Result<Self> {
        let textures = Self::create_textures(device, width, height)?;
        log::debug!("Created G-buffer {width}x{height}");
        Ok(Self {
            textures,
            states: [ResourceState::Common; Attachment::COUNT],
            phase: GBufferPhase::Common,
            width,
            height,
        })
    }

    fn create_textures(device: &mut impl GpuDevice, width: u32, height: u32) -> Result<[TextureId; Attachment::COUNT]> {
        let mut textures = [TextureId::default(); Attachment::COUNT];
        for (i, attachment) in Attachment::ALL.into_iter().enumerate() {
            let desc = TextureDesc::render_target(attachment.label(), width, height, attachment.format());
            match device.create_texture(&desc) {
                Ok(texture) => textures[i] = texture,
                Err(e) => {
                    for &texture in &textures[..i] {
                        device.destroy_texture(texture);
                    }
                    return Err(e);
                }
            }
        }
        Ok(textures)
    }

    // ========================================================================
    // State machine
    // ========================================================================

    fn transition(
        &mut self,
        device: &mut impl GpuDevice,
        op: &'static str,
        from: GBufferPhase,
        to: GBufferPhase,
        set: &[Attachment],
        after: ResourceState,
    ) {
        debug_assert_eq!(self.phase, from, "G-buffer {op} called in the {:?} phase", self.phase);
        if self.phase != from {
            log::error!("G-buffer {op} called in the {:?} phase (expected {from:?})", self.phase);
        }

        let barriers: SmallVec<[Barrier; Attachment::COUNT]> = set
            .iter()
            .filter(|a| self.states[a.index()] != after)
            .map(|&a| Barrier::transition(self.textures[a.index()], self.states[a.index()], after))
            .collect();
        device.resource_barrier(&barriers);

        for a in set {
            self.states[a.index()] = after;
        }
        self.phase = to;
    }

    /// All attachments `Common → RenderTarget`.
    pub fn transition_to_geometry_pass(&mut self, device: &mut impl GpuDevice) {
        self.transition(
            device,
            "transition_to_geometry_pass",
            GBufferPhase::Common,
            GBufferPhase::Geometry,
            &Attachment::ALL,
            ResourceState::RenderTarget,
        );
    }

    /// Surface attachments `RenderTarget → ShaderResource`.
    pub fn transition_to_lighting_pass(&mut self, device: &mut impl GpuDevice) {
        self.transition(
            device,
            "transition_to_lighting_pass",
            GBufferPhase::Geometry,
            GBufferPhase::Lighting,
            &Attachment::SURFACE,
            ResourceState::ShaderResource,
        );
    }

    /// Composite attachments `RenderTarget → ShaderResource`.
    pub fn transition_to_tonemap(&mut self, device: &mut impl GpuDevice) {
        self.transition(
            device,
            "transition_to_tonemap",
            GBufferPhase::Lighting,
            GBufferPhase::Tonemap,
            &Attachment::COMPOSITE,
            ResourceState::ShaderResource,
        );
    }

    /// All attachments `ShaderResource → Common`.
    pub fn transition_to_common(&mut self, device: &mut impl GpuDevice) {
        self.transition(
            device,
            "transition_to_common",
            GBufferPhase::Tonemap,
            GBufferPhase::Common,
            &Attachment::ALL,
            ResourceState::Common,
        );
    }

    /// Early exit: every attachment not yet `Common` goes back from its
    /// tracked state. Legal in any phase.
    pub fn abort_to_common(&mut self, device: &mut impl GpuDevice) {
        let barriers: SmallVec<[Barrier; Attachment::COUNT]> = Attachment::ALL
            .iter()
            .filter(|a| self.states[a.index()] != ResourceState::Common)
            .map(|&a| Barrier::transition(self.textures[a.index()], self.states[a.index()], ResourceState::Common))
            .collect();
        if !barriers.is_empty() {
            log::warn!("G-buffer aborted from the {:?} phase", self.phase);
            device.resource_barrier(&barriers);
        }
        self.states = [ResourceState::Common; Attachment::COUNT];
        self.phase = GBufferPhase::Common;
    }

    /// Clears every attachment to opaque black. Geometry phase only.
    pub fn clear_render_targets(&self, device: &mut impl GpuDevice) {
        debug_assert_eq!(self.phase, GBufferPhase::Geometry, "G-buffer cleared outside the geometry phase");
        for a in Attachment::ALL {
            if self.states[a.index()] == ResourceState::RenderTarget {
                device.clear_color(self.textures[a.index()], CLEAR_COLOR);
            } else {
                log::error!("Skipping clear of {} in state {:?}", a.label(), self.states[a.index()]);
            }
        }
    }

    /// Recreates every attachment at the new size. `Common` phase only, and
    /// the GPU must be idle.
    pub fn resize(&mut self, device: &mut impl GpuDevice, width: u32, height: u32) -> Result<()> {
        debug_assert_eq!(self.phase, GBufferPhase::Common, "G-buffer resized in the {:?} phase", self.phase);
        if self.phase != GBufferPhase::Common {
            log::error!("G-buffer resized in the {:?} phase; attachments reset to Common", self.phase);
        }
        let textures = Self::create_textures(device, width, height)?;
        for texture in std::mem::replace(&mut self.textures, textures) {
            device.destroy_texture(texture);
        }
        self.states = [ResourceState::Common; Attachment::COUNT];
        self.phase = GBufferPhase::Common;
        self.width = width;
        self.height = height;
        log::debug!("Resized G-buffer to {width}x{height}");
        Ok(())
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn texture(&self, attachment: Attachment) -> TextureId {
        self.textures[attachment.index()]
    }

    #[must_use]
    pub fn state(&self, attachment: Attachment) -> ResourceState {
        self.states[attachment.index()]
    }

    #[must_use]
    pub fn phase(&self) -> GBufferPhase {
        self.phase
    }

    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn targets(&self, set: &[Attachment]) -> SmallVec<[TextureId; 8]> {
        set.iter().map(|&a| self.texture(a)).collect()
    }

    pub fn release(self, device: &mut impl GpuDevice) {
        for texture in self.textures {
            device.destroy_texture(texture);
        }
    }
}
