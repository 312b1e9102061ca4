//! Renderer Settings
//!
//! Everything the renderer reads at construction time: frame pipelining
//! depth, shadow map resolution, LOD switching distance, fence wait bound,
//! camera lens, shader locations and the post-process constants.
//!
//! Settings can be built in code or loaded from a JSON file. Missing keys
//! fall back to [`Default`], so a config file only needs to name what it
//! overrides.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use penumbra::renderer::settings::RendererSettings;
//!
//! // Defaults: triple buffering, 2048² shadow maps
//! let settings = RendererSettings::default();
//!
//! // Double buffering with smaller shadow maps
//! let settings = RendererSettings {
//!     frame_resource_count: 2,
//!     shadow_map_size: 1024,
//!     ..Default::default()
//! };
//!
//! // From disk
//! let settings = RendererSettings::load("renderer.json")?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{RenderError, Result};

// ---------------------------------------------------------------------------
// Camera lens
// ---------------------------------------------------------------------------

/// Camera lens and fly-camera movement parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Walk / strafe speed in world units per second.
    pub move_speed: f32,
    /// Mouse look sensitivity in degrees per pixel of drag.
    pub look_degrees_per_pixel: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_y: 0.25 * std::f32::consts::PI,
            near: 1.0,
            far: 1000.0,
            move_speed: 30.0,
            look_degrees_per_pixel: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// Post-process constants
// ---------------------------------------------------------------------------

/// Depth-of-field and chromatic aberration parameters, uploaded to the
/// post-process constant buffer every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    pub focus_distance: f32,
    pub focus_range: f32,
    pub near_blur_strength: f32,
    pub far_blur_strength: f32,
    pub chromatic_direction: [f32; 2],
    pub chromatic_intensity: f32,
    pub chromatic_distance_scale: f32,
    /// 0 disables the stylised effect.
    pub effect_intensity: f32,
    pub effect_type: u32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            focus_distance: 0.95,
            focus_range: 0.1,
            near_blur_strength: 5.0,
            far_blur_strength: 5.0,
            chromatic_direction: [-1.0, -1.0],
            chromatic_intensity: 2.0,
            chromatic_distance_scale: 1.5,
            effect_intensity: 0.0,
            effect_type: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Shader locations
// ---------------------------------------------------------------------------

/// Where the pipeline shader programs live.
///
/// Paths are resolved relative to [`ShaderSettings::directory`]. The renderer
/// never reads shader files itself; it hands the resolved paths to the
/// device when building pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderSettings {
    pub directory: PathBuf,
    pub deferred_geometry: String,
    pub shadows: String,
    pub sky: String,
    pub deferred_lighting: String,
    pub post_process: String,
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("shaders"),
            deferred_geometry: "deferred_geometry.wgsl".to_string(),
            shadows: "shadows.wgsl".to_string(),
            sky: "sky.wgsl".to_string(),
            deferred_lighting: "deferred_lighting.wgsl".to_string(),
            post_process: "post_process.wgsl".to_string(),
        }
    }
}

impl ShaderSettings {
    #[must_use]
    pub fn resolve(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Number of frame resources in the ring (frames the CPU may run ahead).
    ///
    /// Default: `3`
    pub frame_resource_count: usize,

    /// Width and height of every light's shadow map.
    ///
    /// Default: `2048`
    pub shadow_map_size: u32,

    /// Camera distance past which items switch to their second LOD.
    ///
    /// Default: `150.0`
    pub lod_switch_distance: f32,

    /// Upper bound on a single fence wait before the device is declared hung.
    ///
    /// Default: `5000` ms
    pub fence_timeout_ms: u64,

    /// Clear color of the back buffer.
    ///
    /// Default: light steel blue
    pub clear_color: [f32; 4],

    /// Enables vertical sync on the presentation surface.
    ///
    /// Default: `true`
    pub vsync: bool,

    /// Upper bound on render items (sizes the object constant buffers).
    pub max_render_items: u32,
    /// Upper bound on materials.
    pub max_materials: u32,
    /// Upper bound on lights.
    pub max_lights: u32,

    pub camera: CameraSettings,
    pub post_process: PostProcessSettings,
    pub shaders: ShaderSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frame_resource_count: 3,
            shadow_map_size: 2048,
            lod_switch_distance: 150.0,
            fence_timeout_ms: 5000,
            clear_color: [0.690_196, 0.768_627, 0.870_588, 1.0],
            vsync: true,
            max_render_items: 512,
            max_materials: 256,
            max_lights: 16,
            camera: CameraSettings::default(),
            post_process: PostProcessSettings::default(),
            shaders: ShaderSettings::default(),
        }
    }
}

impl RendererSettings {
    /// Parses settings from a JSON document and validates them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_json_str(&text)?;
        log::info!("Loaded renderer settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_resource_count == 0 {
            return Err(RenderError::InvalidSettings(
                "frame_resource_count must be at least 1".into(),
            ));
        }
        if self.shadow_map_size == 0 {
            return Err(RenderError::InvalidSettings(
                "shadow_map_size must be non-zero".into(),
            ));
        }
        if self.fence_timeout_ms == 0 {
            return Err(RenderError::InvalidSettings(
                "fence_timeout_ms must be non-zero".into(),
            ));
        }
        if self.max_render_items == 0 || self.max_materials == 0 || self.max_lights == 0 {
            return Err(RenderError::InvalidSettings(
                "constant buffer capacities must be non-zero".into(),
            ));
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return Err(RenderError::InvalidSettings(format!(
                "camera planes out of order: near {} far {}",
                self.camera.near, self.camera.far
            )));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_scene() {
        let s = RendererSettings::default();
        assert_eq!(s.frame_resource_count, 3);
        assert_eq!(s.shadow_map_size, 2048);
        assert!((s.lod_switch_distance - 150.0).abs() < f32::EPSILON);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s = RendererSettings::from_json_str(r#"{ "shadow_map_size": 1024, "camera": { "far": 500.0 } }"#)
            .unwrap();
        assert_eq!(s.shadow_map_size, 1024);
        assert_eq!(s.frame_resource_count, 3);
        assert!((s.camera.far - 500.0).abs() < f32::EPSILON);
        assert!((s.camera.near - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn zero_ring_depth_is_rejected() {
        let err = RendererSettings::from_json_str(r#"{ "frame_resource_count": 0 }"#).unwrap_err();
        assert!(matches!(err, RenderError::InvalidSettings(_)));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = RendererSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, RenderError::JsonError(_)));
    }
}
