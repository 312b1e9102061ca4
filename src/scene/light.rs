use glam::{Mat4, Quat, Vec3};

use super::dirty::DirtyCounter;
use super::geometry::DrawArgs;
use crate::renderer::shadow::ShadowMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum LightType {
    Directional = 0,
    Spot = 1,
    Point = 2,
}

/// Photometric parameters of a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    pub strength: Vec3,
    /// Point / spot only.
    pub falloff_start: f32,
    /// Directional / spot only.
    pub direction: Vec3,
    /// Point / spot only.
    pub falloff_end: f32,
    /// Point / spot only.
    pub position: Vec3,
    /// Spot only.
    pub spot_power: f32,
    pub color: Vec3,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            strength: Vec3::splat(0.5),
            falloff_start: 1.0,
            direction: Vec3::new(0.577_35, -0.577_35, 0.577_35),
            falloff_end: 50.0,
            position: Vec3::ZERO,
            spot_power: 64.0,
            color: Vec3::ONE,
        }
    }
}

/// A light in the scene together with the shadow map it owns.
#[derive(Debug)]
pub struct LightObject {
    kind: LightType,
    params: LightParams,
    pub(crate) cb_index: u32,
    pub(crate) dirty: DirtyCounter,
    /// Sphere (point) or cone (spot) drawn to bound the light's influence.
    pub(crate) volume: Option<DrawArgs>,
    pub(crate) shadow_map: ShadowMap,
}

impl LightObject {
    pub(crate) fn new(kind: LightType, params: LightParams, cb_index: u32, ring_depth: u32, shadow_map: ShadowMap) -> Self {
        Self {
            kind,
            params,
            cb_index,
            dirty: DirtyCounter::new(ring_depth),
            volume: None,
            shadow_map,
        }
    }

    #[must_use]
    pub fn kind(&self) -> LightType {
        self.kind
    }

    #[must_use]
    pub fn params(&self) -> &LightParams {
        &self.params
    }

    /// Mutable access; marks every ring slot stale.
    pub fn params_mut(&mut self) -> &mut LightParams {
        self.dirty.mark();
        &mut self.params
    }

    #[must_use]
    pub fn cb_index(&self) -> u32 {
        self.cb_index
    }

    #[must_use]
    pub fn dirty(&self) -> DirtyCounter {
        self.dirty
    }

    #[must_use]
    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    #[must_use]
    pub fn volume(&self) -> Option<DrawArgs> {
        self.volume
    }

    /// World transform of the light volume. Directional lights cover the
    /// whole screen and return identity.
    #[must_use]
    pub fn volume_transform(&self) -> Mat4 {
        let p = &self.params;
        match self.kind {
            LightType::Directional => Mat4::IDENTITY,
            LightType::Spot => {
                let radius = 20.0 / p.falloff_end * p.spot_power * 8.0;
                let scale = Vec3::new(radius, p.falloff_end, radius);
                let rotation = Quat::from_rotation_arc(Vec3::NEG_Y, p.direction.normalize_or(Vec3::NEG_Y));
                Mat4::from_scale_rotation_translation(scale, rotation, p.position)
            }
            LightType::Point => {
                Mat4::from_translation(p.position) * Mat4::from_scale(p.strength * p.falloff_end)
            }
        }
    }
}
