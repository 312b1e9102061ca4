//! Scene Integration Tests
//!
//! Tests for:
//! - SceneDescription: name resolution into a SceneRegistry
//! - Unknown names and capacity errors, with no GPU leaks
//! - Light registration: shadow maps, volumes, constant indices
//! - Layer lists and dirty counters

use glam::Vec3;
use penumbra::gpu::recording::RecordingDevice;
use penumbra::primitives;
use penumbra::renderer::shadow::MAX_SHADOW_VIEWS;
use penumbra::scene::registry::SceneRegistry;
use penumbra::scene::light::LightParams;
use penumbra::scene::Material;
use penumbra::{
    EnvironmentDesc, ImageData, ItemDesc, LightDesc, LightType, MaterialDesc, RenderError, RenderLayer,
    RendererSettings, SceneDescription,
};

fn settings() -> RendererSettings {
    RendererSettings { shadow_map_size: 64, ..RendererSettings::default() }
}

fn base_scene() -> SceneDescription {
    let mut scene = SceneDescription::new();
    scene.add_texture("stone", ImageData::solid([128, 128, 128, 255]));
    scene.add_texture("sky", ImageData::solid_cube([40, 60, 200, 255]));
    scene.add_geometry(
        "shapes",
        vec![
            primitives::create_box("box", 2.0, 2.0, 2.0),
            primitives::create_grid("grid", 20.0, 20.0, 4, 4),
        ],
    );
    scene.add_material(MaterialDesc::new(Material::new("stone0")).diffuse("stone"));
    scene.add_item(ItemDesc::new("shapes", "box", "stone0"));
    scene.add_item(ItemDesc::new("shapes", "grid", "stone0").tex_scaled(8.0));
    scene
}

fn build(scene: &SceneDescription, device: &mut RecordingDevice) -> Result<SceneRegistry, RenderError> {
    scene.build(device, &settings())
}

// ============================================================================
// Successful builds
// ============================================================================

#[test]
fn build_resolves_names() {
    let mut device = RecordingDevice::default();
    let registry = build(&base_scene(), &mut device).unwrap();

    assert_eq!(registry.item_count(), 2);
    assert_eq!(registry.layer(RenderLayer::Opaque).len(), 2);
    assert!(registry.layer(RenderLayer::Sky).is_empty());
    // Black, black cube, stone, sky.
    assert_eq!(registry.textures().len(), 4);
    // Light volumes plus "shapes".
    assert_eq!(registry.geometries().len(), 2);

    let key = registry.materials().find("stone0").unwrap();
    let material = registry.materials().get(key).unwrap();
    assert_eq!(material.diffuse_texture, registry.textures().find("stone").unwrap());
    assert_eq!(material.cb_index(), 0);
}

#[test]
fn items_get_dense_indices_and_fresh_counters() {
    let mut device = RecordingDevice::default();
    let registry = build(&base_scene(), &mut device).unwrap();
    let ring_depth = registry.ring_depth();

    let mut indices: Vec<u32> = registry.items().map(|(_, item)| item.object_cb_index()).collect();
    indices.sort_unstable();
    assert_eq!(indices, [0, 1]);
    assert!(registry.items().all(|(_, item)| item.dirty().remaining() == ring_depth));
    assert!(registry.has_pending_uploads());
}

#[test]
fn lights_own_shadow_maps_and_volumes() {
    let mut device = RecordingDevice::default();
    let mut scene = base_scene();
    scene.add_light(LightDesc::directional(Vec3::NEG_Y, Vec3::ONE));
    scene.add_light(LightDesc::spot(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, Vec3::ONE));
    scene.add_light(LightDesc::point(Vec3::new(5.0, 5.0, 0.0), Vec3::ONE));
    let registry = build(&scene, &mut device).unwrap();

    let lights = registry.lights();
    assert_eq!(lights.len(), 3);
    assert_eq!(lights[0].kind(), LightType::Directional);
    assert!(lights[0].volume().is_none());
    assert_eq!(lights[1].volume(), Some(registry.light_volumes().cone));
    assert_eq!(lights[2].volume(), Some(registry.light_volumes().sphere));

    for (i, light) in lights.iter().enumerate() {
        assert_eq!(light.cb_index() as usize, i);
        let desc = device.texture_desc(light.shadow_map().texture()).unwrap();
        assert_eq!(desc.layers as usize, MAX_SHADOW_VIEWS);
        assert_eq!(desc.width, 64);
    }
}

#[test]
fn environment_defaults_to_black() {
    let mut device = RecordingDevice::default();
    let registry = build(&base_scene(), &mut device).unwrap();
    let env = registry.environment();
    assert_eq!(registry.textures().name(env.sky_diffuse), Some("blackCube"));
    assert_eq!(registry.textures().name(env.brdf), Some("black"));
}

#[test]
fn environment_resolves_by_name() {
    let mut device = RecordingDevice::default();
    let mut scene = base_scene();
    scene.set_environment(EnvironmentDesc {
        sky_diffuse: "sky".into(),
        sky_irradiance: "sky".into(),
        brdf: "stone".into(),
    });
    let registry = build(&scene, &mut device).unwrap();
    assert_eq!(registry.textures().name(registry.environment().sky_diffuse), Some("sky"));
}

#[test]
fn release_frees_all_gpu_objects() {
    let mut device = RecordingDevice::default();
    let mut scene = base_scene();
    scene.add_light(LightDesc::point(Vec3::ZERO, Vec3::ONE));
    let mut registry = build(&scene, &mut device).unwrap();
    assert!(device.live_texture_count() > 0);

    registry.release(&mut device);
    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(registry.item_count(), 0);
    assert!(device.violations().is_empty());
}

// ============================================================================
// Failures leak nothing
// ============================================================================

fn assert_clean_failure(scene: &SceneDescription, check: impl Fn(&RenderError) -> bool) {
    let mut device = RecordingDevice::default();
    let err = build(scene, &mut device).err().expect("build should fail");
    assert!(check(&err), "unexpected error: {err}");
    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
}

#[test]
fn unknown_texture_fails() {
    let mut scene = base_scene();
    scene.add_material(MaterialDesc::new(Material::new("moss")).normal("moss_normal"));
    assert_clean_failure(&scene, |e| matches!(e, RenderError::TextureNotFound(name) if name == "moss_normal"));
}

#[test]
fn unknown_geometry_fails() {
    let mut scene = base_scene();
    scene.add_item(ItemDesc::new("rocks", "box", "stone0"));
    assert_clean_failure(&scene, |e| matches!(e, RenderError::GeometryNotFound(_)));
}

#[test]
fn unknown_submesh_fails() {
    let mut scene = base_scene();
    scene.add_item(ItemDesc::new("shapes", "cylinder", "stone0"));
    assert_clean_failure(&scene, |e| matches!(e, RenderError::GeometryNotFound(name) if name == "shapes/cylinder"));
}

#[test]
fn unknown_lod_fails() {
    let mut scene = base_scene();
    scene.add_item(ItemDesc::new("shapes", "box", "stone0").with_lods(["box", "box_lo"]));
    assert_clean_failure(&scene, |e| matches!(e, RenderError::GeometryNotFound(_)));
}

#[test]
fn unknown_material_fails() {
    let mut scene = base_scene();
    scene.add_item(ItemDesc::new("shapes", "box", "marble"));
    assert_clean_failure(&scene, |e| matches!(e, RenderError::MaterialNotFound(name) if name == "marble"));
}

#[test]
fn unknown_environment_texture_fails() {
    let mut scene = base_scene();
    scene.set_environment(EnvironmentDesc {
        sky_diffuse: "sky".into(),
        sky_irradiance: "irradiance".into(),
        brdf: "stone".into(),
    });
    assert_clean_failure(&scene, |e| matches!(e, RenderError::TextureNotFound(_)));
}

#[test]
fn malformed_image_fails() {
    let mut scene = base_scene();
    scene.add_texture("broken", ImageData { width: 2, height: 2, layers: 1, texels: vec![0; 3] });
    assert_clean_failure(&scene, |e| matches!(e, RenderError::ResourceCreation { .. }));
}

#[test]
fn too_many_lights_fails_before_any_upload() {
    let mut scene = base_scene();
    for _ in 0..=settings().max_lights {
        scene.add_light(LightDesc::point(Vec3::ZERO, Vec3::ONE));
    }
    assert_clean_failure(&scene, |e| matches!(e, RenderError::InvalidSettings(_)));
}

#[test]
fn registry_rejects_lights_past_capacity() {
    let mut device = RecordingDevice::default();
    let mut scene = base_scene();
    scene.add_light(LightDesc::point(Vec3::ZERO, Vec3::ONE));
    let limited = RendererSettings { max_lights: 1, ..settings() };
    let mut registry = scene.build(&mut device, &limited).unwrap();
    let textures_before = device.live_texture_count();

    let err = registry.add_light(&mut device, LightType::Spot, LightParams::default()).unwrap_err();
    assert!(matches!(err, RenderError::InvalidSettings(_)));
    assert_eq!(registry.lights().len(), 1);
    // No shadow map was created for the rejected light.
    assert_eq!(device.live_texture_count(), textures_before);
}
