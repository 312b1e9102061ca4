//! Per-frame constant updates.
//!
//! Runs once per frame against the ring slot just acquired. Objects whose
//! [`DirtyCounter`](crate::scene::DirtyCounter) is positive are rewritten
//! into that slot and the counter is decremented, so a change reaches every
//! slot after `ring_depth` frames. Pass and post-process constants are
//! cheap and rewritten unconditionally.

use super::frame_resource::FrameResource;
use super::settings::PostProcessSettings;
use super::shadow::shadow_views;
use super::uniforms::{
    LightConstants, MaterialConstants, ObjectConstants, PassConstants, PostProcessConstants, ShadowViewConstants,
};
use crate::gpu::GpuDevice;
use crate::scene::camera::Camera;
use crate::scene::registry::SceneRegistry;
use crate::utils::time::FrameTime;

/// Counters reported by one update, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub objects_written: u32,
    pub lights_written: u32,
    pub materials_written: u32,
    pub visible: u32,
}

/// Writes stale object constants, then rebuilds the per-layer visible lists
/// with frustum culling and LOD selection.
pub fn update_object_constants(
    device: &mut impl GpuDevice,
    frame: &FrameResource,
    scene: &mut SceneRegistry,
    camera: &Camera,
    lod_switch_distance: f32,
    stats: &mut UpdateStats,
) {
    scene.clear_visible();

    let eye = camera.position();
    let frustum = camera.frustum();
    for (key, item) in &mut scene.items {
        if item.dirty.is_dirty() {
            item.refresh_bounds();
            frame.object_cb.copy_data(device, item.object_cb_index, &ObjectConstants::new(item));
            item.dirty.consume();
            stats.objects_written += 1;
        }

        if frustum.intersects_box(&item.bounds) {
            item.select_lod(eye.distance(item.world_position()), lod_switch_distance);
            scene.visible[item.layer].push(key);
            stats.visible += 1;
        }
    }
}

/// Writes stale light constants together with their shadow views.
pub fn update_light_constants(
    device: &mut impl GpuDevice,
    frame: &FrameResource,
    scene: &mut SceneRegistry,
    camera: &Camera,
    stats: &mut UpdateStats,
) {
    let eye = camera.position();
    for light in scene.lights.iter_mut().filter(|l| l.dirty.is_dirty()) {
        let views = shadow_views(light.kind(), light.params(), eye);
        frame.light_cb.copy_data(device, light.cb_index, &LightConstants::new(light, &views));
        for (i, view) in views.iter().enumerate() {
            let index = FrameResource::shadow_view_index(light.cb_index, i as u32);
            frame.shadow_view_cb.copy_data(device, index, &ShadowViewConstants { view_proj: view.view_proj });
        }
        light.dirty.consume();
        stats.lights_written += 1;
    }
}

pub fn update_material_constants(
    device: &mut impl GpuDevice,
    frame: &FrameResource,
    scene: &mut SceneRegistry,
    stats: &mut UpdateStats,
) {
    for material in scene.materials.iter_mut().filter(|m| m.dirty.is_dirty()) {
        frame.material_cb.copy_data(device, material.cb_index, &MaterialConstants::from(&*material));
        material.dirty.consume();
        stats.materials_written += 1;
    }
}

pub fn update_main_pass(
    device: &mut impl GpuDevice,
    frame: &FrameResource,
    camera: &Camera,
    size: (u32, u32),
    time: FrameTime,
) {
    frame.pass_cb.copy_data(device, 0, &PassConstants::new(camera, size, time));
}

pub fn update_post_process(device: &mut impl GpuDevice, frame: &FrameResource, settings: &PostProcessSettings) {
    frame.post_process_cb.copy_data(device, 0, &PostProcessConstants::from(settings));
}
