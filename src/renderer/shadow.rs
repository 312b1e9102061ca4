//! Shadow Maps
//!
//! Every light owns one [`ShadowMap`]: a 2D depth array with one layer per
//! shadow view. The number of views depends on the light type:
//!
//! | Light       | Views | Projection                                         |
//! |-------------|-------|----------------------------------------------------|
//! | Directional | 4     | orthographic box around a camera-centered sphere   |
//! | Spot        | 1     | 72° perspective backed off 20 units along the beam |
//! | Point       | 6     | 90° perspective per cube face                      |
//!
//! All matrices are left-handed with a [0, 1] depth range. Each view also
//! yields a shadow transform that maps world space straight to shadow-map
//! texture coordinates.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    Barrier, DepthTarget, GpuDevice, PassDesc, ResourceState, TextureDesc, TextureDimension, TextureFormat,
    TextureId, TextureUsages, Viewport,
};
use crate::scene::light::{LightParams, LightType};

pub const SHADOW_MAP_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Directional light cascades.
pub const CASCADE_COUNT: usize = 4;
/// Radius of each cascade's camera-centered bounding sphere.
pub const CASCADE_RADII: [f32; CASCADE_COUNT] = [100.0, 150.0, 200.0, 500.0];

pub const CUBE_FACE_COUNT: usize = 6;
/// Upper bound on views per light; also the array size of every shadow map.
pub const MAX_SHADOW_VIEWS: usize = CUBE_FACE_COUNT;

pub const SPOT_FOV_Y: f32 = PI / 2.5;
pub const SPOT_NEAR: f32 = 10.0;
/// Spot shadow far plane, as a multiple of the light's falloff end.
pub const SPOT_FAR_SCALE: f32 = 10.0;
/// Distance the spot shadow camera is pulled back along the beam.
pub const SPOT_BACKOFF: f32 = 20.0;

pub const POINT_NEAR: f32 = 0.1;

/// Look direction of each cube face: +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACE_DIRECTIONS: [Vec3; CUBE_FACE_COUNT] =
    [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

/// Up vector of each cube face.
pub const CUBE_FACE_UPS: [Vec3; CUBE_FACE_COUNT] = [Vec3::Y, Vec3::Y, Vec3::NEG_Z, Vec3::Z, Vec3::Y, Vec3::Y];

/// Maps NDC `[-1, 1]²` to texture space `[0, 1]²`, flipping y.
pub const NDC_TO_TEXTURE: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, -0.5, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.5, 0.5, 0.0, 1.0,
]);

// ============================================================================
// View math
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowView {
    pub view_proj: Mat4,
    /// World space to shadow-map texture space.
    pub shadow_transform: Mat4,
}

impl ShadowView {
    #[must_use]
    pub fn new(view: Mat4, proj: Mat4) -> Self {
        let view_proj = proj * view;
        Self { view_proj, shadow_transform: NDC_TO_TEXTURE * view_proj }
    }
}

pub type ShadowViews = SmallVec<[ShadowView; MAX_SHADOW_VIEWS]>;

fn up_for(direction: Vec3) -> Vec3 {
    if direction.normalize_or_zero().y.abs() > 0.999 { Vec3::X } else { Vec3::Y }
}

/// One cascade: an orthographic box enclosing the sphere of `radius`
/// around the camera, seen from `2 * radius` back along the light.
#[must_use]
pub fn cascade_view(direction: Vec3, camera_position: Vec3, radius: f32) -> ShadowView {
    let dir = direction.normalize_or(Vec3::NEG_Y);
    let eye = camera_position - 2.0 * radius * dir;
    let view = Mat4::look_at_lh(eye, camera_position, up_for(dir));

    let c = view.transform_point3(camera_position);
    let proj = Mat4::orthographic_lh(c.x - radius, c.x + radius, c.y - radius, c.y + radius, c.z - radius, c.z + radius);
    ShadowView::new(view, proj)
}

#[must_use]
pub fn directional_views(direction: Vec3, camera_position: Vec3) -> ShadowViews {
    CASCADE_RADII
        .iter()
        .map(|&r| cascade_view(direction, camera_position, r))
        .collect()
}

#[must_use]
pub fn spot_view(position: Vec3, direction: Vec3, falloff_end: f32) -> ShadowView {
    let dir = direction.normalize_or(Vec3::NEG_Y);
    let eye = position - SPOT_BACKOFF * dir;
    let view = Mat4::look_at_lh(eye, eye + dir, up_for(dir));
    let proj = Mat4::perspective_lh(SPOT_FOV_Y, 1.0, SPOT_NEAR, falloff_end * SPOT_FAR_SCALE);
    ShadowView::new(view, proj)
}

#[must_use]
pub fn point_views(position: Vec3, falloff_end: f32) -> ShadowViews {
    let proj = Mat4::perspective_lh(FRAC_PI_2, 1.0, POINT_NEAR, falloff_end);
    CUBE_FACE_DIRECTIONS
        .iter()
        .zip(CUBE_FACE_UPS.iter())
        .map(|(&dir, &up)| ShadowView::new(Mat4::look_at_lh(position, position + dir, up), proj))
        .collect()
}

/// Number of shadow map layers a light renders.
#[must_use]
pub const fn shadow_view_count(kind: LightType) -> usize {
    match kind {
        LightType::Directional => CASCADE_COUNT,
        LightType::Spot => 1,
        LightType::Point => CUBE_FACE_COUNT,
    }
}

/// All shadow views of a light.
#[must_use]
pub fn shadow_views(kind: LightType, params: &LightParams, camera_position: Vec3) -> ShadowViews {
    match kind {
        LightType::Directional => directional_views(params.direction, camera_position),
        LightType::Spot => std::iter::once(spot_view(params.position, params.direction, params.falloff_end)).collect(),
        LightType::Point => point_views(params.position, params.falloff_end),
    }
}

// ============================================================================
// ShadowMap
// ============================================================================

/// Depth array rendered once per frame and sampled by the lighting pass.
///
/// Resting state is `GenericRead`; it is `DepthWrite` only between
/// [`ShadowMap::begin_render`] and [`ShadowMap::end_render`].
#[derive(Debug)]
pub struct ShadowMap {
    texture: TextureId,
    size: u32,
    state: ResourceState,
}

impl ShadowMap {
    pub fn new(device: &mut impl GpuDevice, label: &str, size: u32) -> Result<Self> {
        let texture = device.create_texture(&TextureDesc {
            label: format!("{label} Shadow Map"),
            width: size,
            height: size,
            layers: MAX_SHADOW_VIEWS as u32,
            dimension: TextureDimension::D2Array,
            format: SHADOW_MAP_FORMAT,
            usage: TextureUsages::DEPTH_STENCIL | TextureUsages::SHADER_RESOURCE,
            initial_state: ResourceState::GenericRead,
        })?;
        Ok(Self { texture, size, state: ResourceState::GenericRead })
    }

    /// Transitions to `DepthWrite` and clears every layer to 1.0.
    pub fn begin_render(&mut self, device: &mut impl GpuDevice) {
        debug_assert_eq!(self.state, ResourceState::GenericRead, "shadow map rendered twice without end_render");
        device.resource_barrier(&[Barrier::transition(self.texture, self.state, ResourceState::DepthWrite)]);
        self.state = ResourceState::DepthWrite;
        device.clear_depth(self.texture, 1.0);
    }

    pub fn end_render(&mut self, device: &mut impl GpuDevice) {
        debug_assert_eq!(self.state, ResourceState::DepthWrite, "end_render without begin_render");
        device.resource_barrier(&[Barrier::transition(self.texture, self.state, ResourceState::GenericRead)]);
        self.state = ResourceState::GenericRead;
    }

    /// Depth-only pass into one array layer.
    #[must_use]
    pub fn pass_desc(&self, layer: u32) -> PassDesc {
        PassDesc {
            label: "Shadow Map",
            color_targets: SmallVec::new(),
            depth_target: Some(DepthTarget { texture: self.texture, layer }),
            viewport: self.viewport(),
        }
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.size, self.size)
    }

    #[must_use]
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Destroys the texture. The GPU must be idle.
    pub fn release(self, device: &mut impl GpuDevice) {
        device.destroy_texture(self.texture);
    }
}
