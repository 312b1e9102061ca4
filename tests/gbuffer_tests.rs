//! G-Buffer Tests
//!
//! Tests for:
//! - Attachment formats and creation
//! - The Common → Geometry → Lighting → Tonemap → Common barrier cycle
//! - Out-of-order transitions
//! - Early abort and resize

use penumbra::gpu::recording::{Command, RecordingDevice};
use penumbra::gpu::{ResourceState, TextureFormat};
use penumbra::renderer::gbuffer::{Attachment, GBuffer, GBufferPhase};

fn barrier_count(device: &mut RecordingDevice) -> usize {
    device.take_commands().iter().filter(|c| matches!(c, Command::Barrier(_))).count()
}

fn all_in(gbuffer: &GBuffer, device: &RecordingDevice, set: &[Attachment], state: ResourceState) -> bool {
    set.iter()
        .all(|&a| gbuffer.state(a) == state && device.texture_state(gbuffer.texture(a)) == Some(state))
}

// ============================================================================
// Creation
// ============================================================================

#[test]
fn attachments_use_their_formats() {
    let mut device = RecordingDevice::default();
    let gbuffer = GBuffer::new(&mut device, 640, 480).unwrap();

    assert_eq!(device.live_texture_count(), Attachment::COUNT);
    let zw = device.texture_desc(gbuffer.texture(Attachment::ZW)).unwrap();
    assert_eq!(zw.format, TextureFormat::Rgba32Float);
    assert_eq!((zw.width, zw.height), (640, 480));
    let normal = device.texture_desc(gbuffer.texture(Attachment::Normal)).unwrap();
    assert_eq!(normal.format, TextureFormat::Rgba16Snorm);
    assert_eq!(gbuffer.phase(), GBufferPhase::Common);
}

// ============================================================================
// Barrier cycle
// ============================================================================

#[test]
fn full_cycle_issues_expected_barriers() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();

    gbuffer.transition_to_geometry_pass(&mut device);
    assert_eq!(barrier_count(&mut device), 7);
    assert!(all_in(&gbuffer, &device, &Attachment::ALL, ResourceState::RenderTarget));

    gbuffer.transition_to_lighting_pass(&mut device);
    assert_eq!(barrier_count(&mut device), 5);
    assert!(all_in(&gbuffer, &device, &Attachment::SURFACE, ResourceState::ShaderResource));
    assert!(all_in(&gbuffer, &device, &Attachment::COMPOSITE, ResourceState::RenderTarget));

    gbuffer.transition_to_tonemap(&mut device);
    assert_eq!(barrier_count(&mut device), 2);
    assert!(all_in(&gbuffer, &device, &Attachment::ALL, ResourceState::ShaderResource));

    gbuffer.transition_to_common(&mut device);
    assert_eq!(barrier_count(&mut device), 7);
    assert!(all_in(&gbuffer, &device, &Attachment::ALL, ResourceState::Common));
    assert_eq!(gbuffer.phase(), GBufferPhase::Common);

    assert!(device.violations().is_empty());
}

#[test]
fn clear_hits_every_attachment() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_geometry_pass(&mut device);
    device.take_commands();

    gbuffer.clear_render_targets(&mut device);
    let clears = device.commands().iter().filter(|c| matches!(c, Command::ClearColor { .. })).count();
    assert_eq!(clears, Attachment::COUNT);
    assert!(device.violations().is_empty());
}

#[test]
#[should_panic(expected = "transition_to_tonemap")]
fn skipping_the_lighting_transition_panics() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_geometry_pass(&mut device);
    gbuffer.transition_to_tonemap(&mut device);
}

#[test]
#[should_panic(expected = "transition_to_common called in the Lighting phase")]
fn skipping_the_tonemap_transition_panics() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_geometry_pass(&mut device);
    gbuffer.transition_to_lighting_pass(&mut device);
    gbuffer.transition_to_common(&mut device);
}

#[test]
#[should_panic(expected = "transition_to_lighting_pass called in the Common phase")]
fn lighting_without_geometry_panics() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_lighting_pass(&mut device);
}

#[test]
#[should_panic(expected = "transition_to_geometry_pass called in the Geometry phase")]
fn entering_geometry_twice_panics() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_geometry_pass(&mut device);
    gbuffer.transition_to_geometry_pass(&mut device);
}

#[test]
#[should_panic(expected = "cleared outside the geometry phase")]
fn clearing_outside_geometry_panics() {
    let mut device = RecordingDevice::default();
    let gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.clear_render_targets(&mut device);
}

// ============================================================================
// Abort and resize
// ============================================================================

#[test]
fn abort_from_lighting_returns_everything_to_common() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.transition_to_geometry_pass(&mut device);
    gbuffer.transition_to_lighting_pass(&mut device);
    device.take_commands();

    gbuffer.abort_to_common(&mut device);
    assert_eq!(barrier_count(&mut device), 7);
    assert!(all_in(&gbuffer, &device, &Attachment::ALL, ResourceState::Common));
    assert_eq!(gbuffer.phase(), GBufferPhase::Common);

    // A normal frame can follow.
    gbuffer.transition_to_geometry_pass(&mut device);
    assert!(device.violations().is_empty());
}

#[test]
fn abort_when_idle_is_silent() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    gbuffer.abort_to_common(&mut device);
    assert!(device.commands().is_empty());
}

#[test]
fn resize_replaces_textures() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    let old = gbuffer.texture(Attachment::Bloom);

    gbuffer.resize(&mut device, 128, 32).unwrap();
    assert!(!device.is_texture_alive(old));
    assert_eq!(device.live_texture_count(), Attachment::COUNT);
    assert_eq!(gbuffer.size(), (128, 32));
    let bloom = device.texture_desc(gbuffer.texture(Attachment::Bloom)).unwrap();
    assert_eq!((bloom.width, bloom.height), (128, 32));

    gbuffer.release(&mut device);
    assert_eq!(device.live_texture_count(), 0);
}

#[test]
fn failed_resize_keeps_old_targets() {
    let mut device = RecordingDevice::default();
    let mut gbuffer = GBuffer::new(&mut device, 64, 64).unwrap();
    let old = gbuffer.texture(Attachment::Diffuse);

    assert!(gbuffer.resize(&mut device, 0, 64).is_err());
    assert!(device.is_texture_alive(old));
    assert_eq!(gbuffer.size(), (64, 64));
    assert_eq!(device.live_texture_count(), Attachment::COUNT);
}
