//! Constant Buffer Layouts
//!
//! Plain-old-data mirrors of the shader constant blocks. Fields are laid out
//! in 16-byte rows (a `Vec3` is always followed by a scalar) so the structs
//! have no implicit padding and match the shader side byte for byte.
//! Matrices are column-major.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use super::settings::PostProcessSettings;
use super::shadow::{MAX_SHADOW_VIEWS, ShadowView};
use crate::scene::camera::Camera;
use crate::scene::light::LightObject;
use crate::scene::material::Material;
use crate::scene::render_item::RenderItem;
use crate::utils::time::FrameTime;

/// Per-item constants (`b0` in the geometry and shadow passes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: Mat4,
    pub tex_transform: Mat4,
}

impl ObjectConstants {
    #[must_use]
    pub fn new(item: &RenderItem) -> Self {
        Self { world: item.world(), tex_transform: item.tex_transform() }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    pub metallic: f32,
    pub _pad: [f32; 3],
}

impl From<&Material> for MaterialConstants {
    fn from(m: &Material) -> Self {
        Self {
            diffuse_albedo: m.diffuse_albedo,
            fresnel_r0: m.fresnel_r0,
            roughness: m.roughness,
            transform: m.transform,
            metallic: m.metallic,
            _pad: [0.0; 3],
        }
    }
}

/// Per-light constants, shared by the shadow and lighting passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightConstants {
    pub strength: Vec3,
    pub falloff_start: f32,
    pub direction: Vec3,
    pub falloff_end: f32,
    pub position: Vec3,
    pub spot_power: f32,
    pub color: Vec3,
    /// [`crate::scene::light::LightType`] as `u32`.
    pub light_type: u32,
    pub view_proj: [Mat4; MAX_SHADOW_VIEWS],
    pub shadow_transform: [Mat4; MAX_SHADOW_VIEWS],
    /// Light-volume world transform.
    pub world: Mat4,
}

impl LightConstants {
    /// Views past `views.len()` are left as identity.
    #[must_use]
    pub fn new(light: &LightObject, views: &[ShadowView]) -> Self {
        let p = light.params();
        let mut view_proj = [Mat4::IDENTITY; MAX_SHADOW_VIEWS];
        let mut shadow_transform = [Mat4::IDENTITY; MAX_SHADOW_VIEWS];
        for (i, view) in views.iter().take(MAX_SHADOW_VIEWS).enumerate() {
            view_proj[i] = view.view_proj;
            shadow_transform[i] = view.shadow_transform;
        }
        Self {
            strength: p.strength,
            falloff_start: p.falloff_start,
            direction: p.direction,
            falloff_end: p.falloff_end,
            position: p.position,
            spot_power: p.spot_power,
            color: p.color,
            light_type: light.kind() as u32,
            view_proj,
            shadow_transform,
            world: light.volume_transform(),
        }
    }
}

/// Per-frame camera constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub eye_position: Vec3,
    pub _pad0: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
}

impl PassConstants {
    #[must_use]
    pub fn new(camera: &Camera, (width, height): (u32, u32), time: FrameTime) -> Self {
        let view = camera.view();
        let proj = camera.proj();
        let view_proj = proj * view;
        let size = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        Self {
            view,
            inv_view: view.inverse(),
            proj,
            inv_proj: proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            eye_position: camera.position(),
            _pad0: 0.0,
            render_target_size: size,
            inv_render_target_size: size.recip(),
            near_z: camera.near(),
            far_z: camera.far(),
            total_time: time.total,
            delta_time: time.delta,
        }
    }
}

/// One shadow view (`b4` in the shadow pass).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShadowViewConstants {
    pub view_proj: Mat4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PostProcessConstants {
    pub focus_distance: f32,
    pub focus_range: f32,
    pub near_blur_strength: f32,
    pub far_blur_strength: f32,
    pub chromatic_direction: Vec2,
    pub chromatic_intensity: f32,
    pub chromatic_distance_scale: f32,
    pub effect_intensity: f32,
    pub effect_type: u32,
    pub _pad: [f32; 2],
}

impl From<&PostProcessSettings> for PostProcessConstants {
    fn from(s: &PostProcessSettings) -> Self {
        Self {
            focus_distance: s.focus_distance,
            focus_range: s.focus_range,
            near_blur_strength: s.near_blur_strength,
            far_blur_strength: s.far_blur_strength,
            chromatic_direction: Vec2::from_array(s.chromatic_direction),
            chromatic_intensity: s.chromatic_intensity,
            chromatic_distance_scale: s.chromatic_distance_scale,
            effect_intensity: s.effect_intensity,
            effect_type: s.effect_type,
            _pad: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn layouts_are_whole_rows() {
        assert_eq!(size_of::<ObjectConstants>(), 128);
        assert_eq!(size_of::<MaterialConstants>(), 112);
        assert_eq!(size_of::<LightConstants>(), 896);
        assert_eq!(size_of::<PassConstants>(), 432);
        assert_eq!(size_of::<ShadowViewConstants>(), 64);
        assert_eq!(size_of::<PostProcessConstants>(), 48);
    }

    #[test]
    fn post_process_defaults_carry_over() {
        let c = PostProcessConstants::from(&PostProcessSettings::default());
        assert!((c.focus_distance - 0.95).abs() < f32::EPSILON);
        assert_eq!(c.chromatic_direction, Vec2::new(-1.0, -1.0));
        assert_eq!(c.effect_type, 0);
    }
}
