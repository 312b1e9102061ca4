//! Shadow Tests
//!
//! Tests for:
//! - Directional cascade views around the camera
//! - Spot and point light view construction
//! - NDC-to-texture shadow transforms
//! - ShadowMap state transitions

use glam::{Vec3, Vec4Swizzles};

use penumbra::gpu::recording::RecordingDevice;
use penumbra::gpu::ResourceState;
use penumbra::renderer::shadow::*;
use penumbra::scene::light::LightParams;
use penumbra::LightType;

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn to_ndc(view: &ShadowView, p: Vec3) -> Vec3 {
    let clip = view.view_proj * p.extend(1.0);
    clip.xyz() / clip.w
}

// ============================================================================
// Directional cascades
// ============================================================================

#[test]
fn directional_light_has_one_view_per_cascade() {
    let views = directional_views(Vec3::new(0.577_35, -0.577_35, 0.577_35), Vec3::ZERO);
    assert_eq!(views.len(), CASCADE_COUNT);
    assert_eq!(shadow_view_count(LightType::Directional), CASCADE_COUNT);
}

#[test]
fn cascade_centers_the_camera() {
    let camera = Vec3::new(-30.0, 70.0, -20.0);
    for radius in CASCADE_RADII {
        let view = cascade_view(Vec3::new(1.0, -1.0, 0.5), camera, radius);
        let ndc = to_ndc(&view, camera);
        assert!(approx(ndc.x, 0.0) && approx(ndc.y, 0.0), "radius {radius}: {ndc}");
        assert!(approx(ndc.z, 0.5), "radius {radius}: depth {}", ndc.z);
    }
}

#[test]
fn cascade_covers_its_radius() {
    let camera = Vec3::new(10.0, 5.0, 0.0);
    let view = cascade_view(Vec3::NEG_Y, camera, 100.0);
    let inside = to_ndc(&view, camera + Vec3::new(99.0, 0.0, 0.0));
    assert!(inside.x.abs() <= 1.0 && inside.y.abs() <= 1.0);
    let outside = to_ndc(&view, camera + Vec3::new(101.0, 0.0, 0.0));
    assert!(outside.x.abs() > 1.0 || outside.y.abs() > 1.0);
}

#[test]
fn straight_down_light_is_well_formed() {
    let view = cascade_view(Vec3::NEG_Y, Vec3::ZERO, 100.0);
    assert!(view.view_proj.determinant().abs() > 0.0);
    assert!(!view.view_proj.is_nan());
}

#[test]
fn larger_cascades_cover_more() {
    let camera = Vec3::ZERO;
    let views = directional_views(Vec3::new(0.3, -1.0, 0.2), camera);
    let p = Vec3::new(120.0, 0.0, 0.0);
    let spans: Vec<f32> = views.iter().map(|v| to_ndc(v, p).truncate().length()).collect();
    for pair in spans.windows(2) {
        assert!(pair[1] < pair[0]);
    }
}

// ============================================================================
// Spot and point
// ============================================================================

#[test]
fn spot_view_looks_along_the_light() {
    let position = Vec3::new(0.0, 50.0, 0.0);
    let view = spot_view(position, Vec3::NEG_Y, 100.0);
    let ndc = to_ndc(&view, Vec3::new(0.0, 20.0, 0.0));
    assert!(approx(ndc.x, 0.0) && approx(ndc.y, 0.0));
    assert!((0.0..=1.0).contains(&ndc.z));
}

#[test]
fn point_light_has_six_faces() {
    let views = point_views(Vec3::ZERO, 50.0);
    assert_eq!(views.len(), CUBE_FACE_COUNT);
    for (view, dir) in views.iter().zip(CUBE_FACE_DIRECTIONS) {
        let ndc = to_ndc(view, dir * 10.0);
        assert!(approx(ndc.x, 0.0) && approx(ndc.y, 0.0), "face {dir}: {ndc}");
    }
}

#[test]
fn shadow_views_dispatch_by_kind() {
    let params = LightParams::default();
    for kind in [LightType::Directional, LightType::Spot, LightType::Point] {
        assert_eq!(shadow_views(kind, &params, Vec3::ZERO).len(), shadow_view_count(kind));
    }
}

#[test]
fn shadow_transform_maps_into_unit_square() {
    let view = cascade_view(Vec3::NEG_Y, Vec3::ZERO, 100.0);
    let tex = view.shadow_transform * Vec3::ZERO.extend(1.0);
    let uv = tex.xy() / tex.w;
    assert!(approx(uv.x, 0.5) && approx(uv.y, 0.5), "{uv}");

    // +y in NDC is the top row of the texture.
    let top = view.shadow_transform * Vec3::new(0.0, 0.0, 90.0).extend(1.0);
    let ndc = to_ndc(&view, Vec3::new(0.0, 0.0, 90.0));
    assert!(approx(top.y / top.w, 0.5 - 0.5 * ndc.y));
}

// ============================================================================
// ShadowMap
// ============================================================================

#[test]
fn shadow_map_rests_in_generic_read() {
    let mut device = RecordingDevice::default();
    let mut map = ShadowMap::new(&mut device, "Sun", 256).unwrap();
    assert_eq!(map.state(), ResourceState::GenericRead);

    map.begin_render(&mut device);
    assert_eq!(device.texture_state(map.texture()), Some(ResourceState::DepthWrite));
    let pass = map.pass_desc(3);
    assert_eq!(pass.depth_target.unwrap().layer, 3);
    assert!(pass.color_targets.is_empty());

    map.end_render(&mut device);
    assert_eq!(device.texture_state(map.texture()), Some(ResourceState::GenericRead));
    assert!(device.violations().is_empty());

    map.release(&mut device);
    assert_eq!(device.live_texture_count(), 0);
}

#[test]
#[should_panic(expected = "end_render without begin_render")]
fn end_without_begin_panics() {
    let mut device = RecordingDevice::default();
    let mut map = ShadowMap::new(&mut device, "Sun", 256).unwrap();
    map.end_render(&mut device);
}
