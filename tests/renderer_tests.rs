//! Renderer Integration Tests
//!
//! Tests for:
//! - Frame lifecycle: initialize, resize, update, draw, shutdown
//! - Ring-buffered constants reaching every frame resource
//! - Culling, LOD selection and shadow cascade upload
//! - Command stream validity and pass order
//! - Error paths: NotReady, device loss, fence timeout, failed init

use glam::{Mat4, Vec3};

use penumbra::gpu::recording::{Command, RecordingDevice};
use penumbra::gpu::GpuDevice;
use penumbra::primitives::{self, SphereOptions};
use penumbra::renderer::frame_resource::FrameResource;
use penumbra::renderer::gbuffer::GBufferPhase;
use penumbra::renderer::stage::FrameStage;
use penumbra::renderer::uniforms::{ObjectConstants, ShadowViewConstants};
use penumbra::scene::{ItemPlacement, Material};
use penumbra::{
    FrameTime, ImageData, ItemDesc, LightDesc, MaterialDesc, RenderError, RenderLayer, Renderer, RendererSettings,
    SceneDescription,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

// ============================================================================
// Helpers
// ============================================================================

/// One box 50 units in front of the default camera, lit by one directional
/// light.
fn box_scene() -> SceneDescription {
    let mut scene = SceneDescription::new();
    scene.add_texture("bricks", ImageData::solid([180, 90, 60, 255]));
    scene.add_geometry("shapes", vec![primitives::create_box("box", 10.0, 10.0, 10.0)]);
    scene.add_material(MaterialDesc::new(Material::new("bricks0")).diffuse("bricks"));
    scene.add_item(ItemDesc::new("shapes", "box", "bricks0").translated(Vec3::new(0.0, 0.0, 50.0)));
    scene.add_light(LightDesc::directional(Vec3::new(0.577_35, -0.577_35, 0.577_35), Vec3::splat(0.8)));
    scene
}

fn ready(device: RecordingDevice, settings: RendererSettings, scene: &SceneDescription) -> Renderer<RecordingDevice> {
    let mut renderer = Renderer::new(device, settings).unwrap();
    renderer.initialize(scene).unwrap();
    renderer.on_resize(WIDTH, HEIGHT).unwrap();
    renderer
}

fn ready_default(scene: &SceneDescription) -> Renderer<RecordingDevice> {
    ready(RecordingDevice::new(WIDTH, HEIGHT), RendererSettings::default(), scene)
}

fn time(frame: u32) -> FrameTime {
    FrameTime::new(frame as f32 / 60.0, 1.0 / 60.0)
}

fn run_frames(renderer: &mut Renderer<RecordingDevice>, count: u32) {
    for i in 0..count {
        renderer.update(time(i)).unwrap();
        renderer.draw().unwrap();
    }
}

fn count_commands(device: &RecordingDevice, pred: impl Fn(&Command) -> bool) -> usize {
    device.commands().iter().filter(|&c| pred(c)).count()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn full_frame_is_valid_and_ordered() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 1);

    let device = renderer.device();
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert_eq!(
        device.debug_groups(),
        ["Shadow Maps", "Deferred Geometry", "Deferred Lighting", "Sky", "Post Process"]
    );
    assert_eq!(renderer.stage(), FrameStage::Idle);
    assert_eq!(renderer.gbuffer().unwrap().phase(), GBufferPhase::Common);
}

#[test]
fn one_frame_draw_counts() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 1);

    let device = renderer.device();
    // Four cascades plus the geometry pass.
    assert_eq!(count_commands(device, |c| matches!(c, Command::DrawIndexed { .. })), 5);
    // Directional light, ambient, post-process.
    assert_eq!(count_commands(device, |c| matches!(c, Command::Draw { vertex_count: 3 })), 3);
    assert_eq!(count_commands(device, |c| matches!(c, Command::Present)), 1);
    assert_eq!(device.commands().last(), Some(&Command::Signal(1)));
}

#[test]
fn fence_advances_once_per_frame() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 5);
    assert_eq!(renderer.frame_index(), 5);
    assert_eq!(renderer.current_fence(), 5);
    assert_eq!(renderer.device().last_signaled(), 5);
}

#[test]
fn shutdown_releases_everything() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 3);
    assert!(renderer.device().live_texture_count() > 0);

    renderer.shutdown().unwrap();
    assert_eq!(renderer.device().live_texture_count(), 0);
    assert_eq!(renderer.device().live_buffer_count(), 0);
    assert!(renderer.device().violations().is_empty());

    // Second call is a no-op.
    renderer.shutdown().unwrap();
    assert!(renderer.device().violations().is_empty());
}

#[test]
fn reinitialize_replaces_the_scene() {
    let scene = box_scene();
    let mut renderer = ready_default(&scene);
    run_frames(&mut renderer, 2);
    let textures = renderer.device().live_texture_count();
    let buffers = renderer.device().live_buffer_count();

    renderer.initialize(&scene).unwrap();
    assert_eq!(renderer.device().live_texture_count(), textures);
    assert_eq!(renderer.device().live_buffer_count(), buffers);
    run_frames(&mut renderer, 2);
    assert!(renderer.device().violations().is_empty());
}

#[test]
fn resize_recreates_screen_targets() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 2);
    let textures = renderer.device().live_texture_count();

    renderer.on_resize(800, 600).unwrap();
    assert_eq!(renderer.gbuffer().unwrap().size(), (800, 600));
    assert_eq!(renderer.device().surface_size(), (800, 600));
    assert_eq!(renderer.device().live_texture_count(), textures);
    assert!((renderer.camera().aspect() - 800.0 / 600.0).abs() < 1e-5);

    run_frames(&mut renderer, 1);
    assert!(renderer.device().violations().is_empty());
}

#[test]
fn zero_sized_resize_is_rejected() {
    let mut renderer = ready_default(&box_scene());
    let err = renderer.on_resize(0, 720).unwrap_err();
    assert!(matches!(err, RenderError::InvalidSurfaceSize { width: 0, height: 720 }));
}

// ============================================================================
// NotReady paths
// ============================================================================

#[test]
fn update_before_initialize_is_not_ready() {
    let mut renderer = Renderer::new(RecordingDevice::default(), RendererSettings::default()).unwrap();
    assert!(matches!(renderer.update(time(0)), Err(RenderError::NotReady(_))));
}

#[test]
fn update_before_resize_is_not_ready() {
    let mut renderer = Renderer::new(RecordingDevice::default(), RendererSettings::default()).unwrap();
    renderer.initialize(&box_scene()).unwrap();
    assert!(matches!(renderer.update(time(0)), Err(RenderError::NotReady(_))));
}

#[test]
fn draw_without_update_is_not_ready() {
    let mut renderer = ready_default(&box_scene());
    assert!(matches!(renderer.draw(), Err(RenderError::NotReady(_))));

    run_frames(&mut renderer, 1);
    // Each update prepares exactly one draw.
    assert!(matches!(renderer.draw(), Err(RenderError::NotReady(_))));
}

#[test]
fn invalid_settings_are_rejected_up_front() {
    let settings = RendererSettings { frame_resource_count: 0, ..RendererSettings::default() };
    assert!(matches!(
        Renderer::new(RecordingDevice::default(), settings),
        Err(RenderError::InvalidSettings(_))
    ));
}

// ============================================================================
// Ring-buffered constants
// ============================================================================

#[test]
fn every_slot_converges_to_the_latest_transform() {
    let mut renderer = ready_default(&box_scene());
    let ring_depth = renderer.settings().frame_resource_count as u32;
    run_frames(&mut renderer, ring_depth);

    let scene = renderer.scene().unwrap();
    assert!(!scene.has_pending_uploads());
    let key = scene.layer(RenderLayer::Opaque)[0];

    let moved = Mat4::from_translation(Vec3::new(5.0, 0.0, 60.0));
    renderer.scene_mut().unwrap().item_mut(key).unwrap().set_world(moved);
    assert_eq!(renderer.scene().unwrap().item(key).unwrap().dirty().remaining(), ring_depth);

    for remaining in (0..ring_depth).rev() {
        run_frames(&mut renderer, 1);
        assert_eq!(renderer.scene().unwrap().item(key).unwrap().dirty().remaining(), remaining);
    }

    let index = renderer.scene().unwrap().item(key).unwrap().object_cb_index();
    for frame in renderer.frame_resources().unwrap().iter() {
        let constants: ObjectConstants =
            renderer.device().read_buffer(frame.object_cb.buffer(), frame.object_cb.offset(index)).unwrap();
        assert_eq!(constants.world, moved);
    }
    assert!(!renderer.scene().unwrap().has_pending_uploads());
}

#[test]
fn clean_frames_write_nothing() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 3);
    run_frames(&mut renderer, 1);
    let stats = renderer.last_update();
    assert_eq!(stats.objects_written, 0);
    assert_eq!(stats.lights_written, 0);
    assert_eq!(stats.materials_written, 0);
}

#[test]
fn camera_motion_refreshes_directional_lights() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 3);

    renderer.camera_mut().walk(10.0);
    run_frames(&mut renderer, 1);
    assert_eq!(renderer.last_update().lights_written, 1);
}

// ============================================================================
// Culling, LOD and shadows
// ============================================================================

#[test]
fn directional_light_end_to_end() {
    let mut renderer = ready_default(&box_scene());
    renderer.update(time(0)).unwrap();

    let scene = renderer.scene().unwrap();
    assert_eq!(scene.visible(RenderLayer::Opaque).len(), 1);

    let frame = renderer.frame_resources().unwrap().get(renderer.frame_index());
    let index = FrameResource::shadow_view_index(0, 0);
    let cascade: ShadowViewConstants =
        renderer.device().read_buffer(frame.shadow_view_cb.buffer(), frame.shadow_view_cb.offset(index)).unwrap();
    assert!(cascade.view_proj.determinant().abs() > 0.0);

    renderer.draw().unwrap();
    // The geometry pass drains the visible lists.
    assert!(renderer.scene().unwrap().visible(RenderLayer::Opaque).is_empty());
}

#[test]
fn culled_items_still_cast_shadows() {
    let mut scene = box_scene();
    scene.items[0] = ItemDesc::new("shapes", "box", "bricks0").translated(Vec3::new(0.0, 0.0, -50.0));
    let mut renderer = ready_default(&scene);

    renderer.update(time(0)).unwrap();
    assert_eq!(renderer.last_update().visible, 0);
    renderer.draw().unwrap();

    // Four cascades, no geometry-pass draw.
    let device = renderer.device();
    assert_eq!(count_commands(device, |c| matches!(c, Command::DrawIndexed { .. })), 4);
    assert!(device.violations().is_empty());
}

#[test]
fn far_items_switch_lod() {
    let mut scene = box_scene();
    let hi = SphereOptions { radius: 5.0, slices: 20, stacks: 20 };
    let lo = SphereOptions { radius: 5.0, slices: 6, stacks: 4 };
    scene.add_geometry(
        "rock",
        vec![primitives::create_sphere("rock_hi", &hi), primitives::create_sphere("rock_lo", &lo)],
    );
    scene.add_item(
        ItemDesc::new("rock", "rock_hi", "bricks0")
            .translated(Vec3::new(0.0, 0.0, 400.0))
            .with_lods(["rock_hi", "rock_lo"]),
    );
    let mut renderer = ready_default(&scene);

    let key = renderer.scene().unwrap().layer(RenderLayer::Opaque)[1];
    run_frames(&mut renderer, 1);
    assert_eq!(renderer.scene().unwrap().item(key).unwrap().current_lod(), 1);

    renderer.camera_mut().set_position(Vec3::new(0.0, 0.0, 380.0));
    run_frames(&mut renderer, 1);
    assert_eq!(renderer.scene().unwrap().item(key).unwrap().current_lod(), 0);
}

#[test]
fn spot_and_point_lights_use_volumes() {
    let mut scene = box_scene();
    scene.add_light(LightDesc::spot(Vec3::new(0.0, 30.0, 40.0), Vec3::NEG_Y, Vec3::ONE).with_falloff(1.0, 60.0));
    scene.add_light(LightDesc::point(Vec3::new(10.0, 10.0, 40.0), Vec3::ONE).with_falloff(1.0, 30.0));
    let mut renderer = ready_default(&scene);
    run_frames(&mut renderer, 1);

    let device = renderer.device();
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    // Shadows: 4 cascades + 1 spot view + 6 cube faces, one box each.
    // Then one geometry draw and two light volumes.
    assert_eq!(count_commands(device, |c| matches!(c, Command::DrawIndexed { .. })), 11 + 1 + 2);
}

// ============================================================================
// Pipelining and failures
// ============================================================================

#[test]
fn lagging_gpu_never_sees_in_flight_writes() {
    let mut device = RecordingDevice::new(WIDTH, HEIGHT);
    device.set_gpu_lag(5);
    let mut renderer = ready(device, RendererSettings::default(), &box_scene());
    let depth = renderer.settings().frame_resource_count as u64;

    for i in 0..12 {
        renderer.update(time(i)).unwrap();
        let in_flight = renderer.frame_index() - renderer.device().completed_value();
        assert!(in_flight <= depth, "{in_flight} frames in flight");
        renderer.draw().unwrap();
    }

    let device = renderer.device();
    assert!(device.violations().is_empty(), "{:?}", device.violations());
    assert!(device.commands().iter().any(|c| matches!(c, Command::Wait { blocked: true, .. })));
}

#[test]
fn stalled_gpu_times_out() {
    let mut device = RecordingDevice::new(WIDTH, HEIGHT);
    device.set_gpu_lag(10);
    let settings = RendererSettings { fence_timeout_ms: 10, ..RendererSettings::default() };
    let mut renderer = ready(device, settings, &box_scene());
    run_frames(&mut renderer, 3);

    renderer.device_mut().stall();
    let err = renderer.update(time(3)).unwrap_err();
    assert!(matches!(err, RenderError::FenceTimeout { value: 1, .. }));
    assert!(err.is_device_failure());

    // Let Drop shut down cleanly.
    renderer.device_mut().complete_all();
}

#[test]
fn device_loss_aborts_the_frame() {
    let mut renderer = ready_default(&box_scene());
    run_frames(&mut renderer, 1);

    renderer.device_mut().lose_device();
    renderer.update(time(1)).unwrap();
    let err = renderer.draw().unwrap_err();
    assert!(matches!(err, RenderError::DeviceLost(_)));
    assert!(err.is_device_failure());
    assert_eq!(renderer.stage(), FrameStage::Idle);
    assert_eq!(renderer.gbuffer().unwrap().phase(), GBufferPhase::Common);
    assert_eq!(renderer.current_fence(), 1);
}

#[test]
fn failed_initialize_leaks_nothing() {
    let mut device = RecordingDevice::new(WIDTH, HEIGHT);
    device.fail_pipeline("Sky");
    let mut renderer = Renderer::new(device, RendererSettings::default()).unwrap();

    let err = renderer.initialize(&box_scene()).unwrap_err();
    assert!(matches!(err, RenderError::PipelineCreation { .. }));
    assert!(renderer.scene().is_none());
    assert_eq!(renderer.device().live_texture_count(), 0);
    assert_eq!(renderer.device().live_buffer_count(), 0);
}

// ============================================================================
// Runtime scene growth
// ============================================================================

#[test]
fn runtime_additions_stop_at_constant_buffer_capacity() {
    let settings = RendererSettings { max_render_items: 2, max_materials: 1, ..RendererSettings::default() };
    let mut renderer = ready(RecordingDevice::new(WIDTH, HEIGHT), settings, &box_scene());

    let scene = renderer.scene_mut().unwrap();
    let geometry = scene.geometries().find("shapes").unwrap();
    let material = scene.materials().find("bricks0").unwrap();

    // One free object slot left.
    let placement = ItemPlacement { world: Mat4::from_translation(Vec3::new(20.0, 0.0, 50.0)), ..ItemPlacement::default() };
    let key = scene.add_item(geometry, "box", &[], material, placement.clone()).unwrap();
    assert_eq!(scene.item(key).unwrap().object_cb_index(), 1);

    let err = scene.add_item(geometry, "box", &[], material, placement).unwrap_err();
    assert!(matches!(err, RenderError::InvalidSettings(_)));
    assert_eq!(scene.item_count(), 2);

    let err = scene.add_material(Material::new("extra")).unwrap_err();
    assert!(matches!(err, RenderError::InvalidSettings(_)));
    assert_eq!(scene.materials().len(), 1);

    // Frames still write only in-range constants.
    run_frames(&mut renderer, 3);
    assert!(renderer.device().violations().is_empty());
}
