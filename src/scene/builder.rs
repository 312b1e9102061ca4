//! Scene Description
//!
//! A name-based, GPU-free description of a scene. `Renderer::initialize`
//! resolves every name and uploads the result into a [`SceneRegistry`].
//! Unknown texture, geometry, submesh or material names are reported as
//! errors and nothing created so far is leaked.
//!
//! ```rust,ignore
//! let mut scene = SceneDescription::new();
//! scene.add_texture("bricks", bricks_image);
//! scene.add_geometry("shapes", vec![create_box("box", 10.0, 10.0, 10.0)]);
//! scene.add_material(MaterialDesc::new(Material::new("bricks0")).diffuse("bricks"));
//! scene.add_item(ItemDesc::new("shapes", "box", "bricks0").translated(Vec3::new(15.0, 0.0, 0.0)));
//! scene.add_light(LightDesc::directional(Vec3::new(0.57735, -0.57735, 0.57735), Vec3::ONE));
//! ```

use glam::{Mat4, Vec3};

use super::geometry::MeshData;
use super::light::{LightParams, LightType};
use super::material::{ImageData, Material, TextureSlot};
use super::registry::{Environment, ItemPlacement, SceneRegistry};
use super::render_item::RenderLayer;
use crate::errors::{RenderError, Result};
use crate::gpu::GpuDevice;
use crate::renderer::frame_resource::FrameCapacities;
use crate::renderer::settings::RendererSettings;

/// A material plus the names of the textures it samples.
#[derive(Debug, Clone)]
pub struct MaterialDesc {
    pub material: Material,
    pub diffuse_texture: Option<String>,
    pub normal_texture: Option<String>,
    pub displacement_texture: Option<String>,
}

impl MaterialDesc {
    #[must_use]
    pub fn new(material: Material) -> Self {
        Self { material, diffuse_texture: None, normal_texture: None, displacement_texture: None }
    }

    #[must_use]
    pub fn diffuse(mut self, texture: impl Into<String>) -> Self {
        self.diffuse_texture = Some(texture.into());
        self
    }

    #[must_use]
    pub fn normal(mut self, texture: impl Into<String>) -> Self {
        self.normal_texture = Some(texture.into());
        self
    }

    #[must_use]
    pub fn displacement(mut self, texture: impl Into<String>) -> Self {
        self.displacement_texture = Some(texture.into());
        self
    }
}

/// One render item, by name.
///
/// The world matrix is `transform * scale`: the uniform scale applies first.
#[derive(Debug, Clone)]
pub struct ItemDesc {
    pub geometry: String,
    pub submesh: String,
    pub material: String,
    pub transform: Mat4,
    pub scale: f32,
    pub tex_scale: f32,
    /// Submeshes of the same geometry used as LOD 0, 1, ...
    pub lods: Vec<String>,
    pub layer: RenderLayer,
}

impl ItemDesc {
    #[must_use]
    pub fn new(geometry: impl Into<String>, submesh: impl Into<String>, material: impl Into<String>) -> Self {
        Self {
            geometry: geometry.into(),
            submesh: submesh.into(),
            material: material.into(),
            transform: Mat4::IDENTITY,
            scale: 1.0,
            tex_scale: 1.0,
            lods: Vec::new(),
            layer: RenderLayer::Opaque,
        }
    }

    #[must_use]
    pub fn transformed(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    #[must_use]
    pub fn translated(self, offset: Vec3) -> Self {
        self.transformed(Mat4::from_translation(offset))
    }

    #[must_use]
    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn tex_scaled(mut self, tex_scale: f32) -> Self {
        self.tex_scale = tex_scale;
        self
    }

    #[must_use]
    pub fn with_lods<S: Into<String>>(mut self, lods: impl IntoIterator<Item = S>) -> Self {
        self.lods = lods.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn in_layer(mut self, layer: RenderLayer) -> Self {
        self.layer = layer;
        self
    }

    fn placement(&self) -> ItemPlacement {
        ItemPlacement {
            world: self.transform * Mat4::from_scale(Vec3::splat(self.scale)),
            tex_transform: Mat4::from_scale(Vec3::splat(self.tex_scale)),
            layer: self.layer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightDesc {
    pub kind: LightType,
    pub params: LightParams,
}

impl LightDesc {
    #[must_use]
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            kind: LightType::Directional,
            params: LightParams { direction, strength, ..LightParams::default() },
        }
    }

    #[must_use]
    pub fn spot(position: Vec3, direction: Vec3, strength: Vec3) -> Self {
        Self {
            kind: LightType::Spot,
            params: LightParams { position, direction, strength, ..LightParams::default() },
        }
    }

    #[must_use]
    pub fn point(position: Vec3, strength: Vec3) -> Self {
        Self {
            kind: LightType::Point,
            params: LightParams { position, strength, ..LightParams::default() },
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: Vec3) -> Self {
        self.params.color = color;
        self
    }

    #[must_use]
    pub fn with_falloff(mut self, start: f32, end: f32) -> Self {
        self.params.falloff_start = start;
        self.params.falloff_end = end;
        self
    }

    #[must_use]
    pub fn with_spot_power(mut self, spot_power: f32) -> Self {
        self.params.spot_power = spot_power;
        self
    }
}

/// Texture names of the image-based lighting inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDesc {
    pub sky_diffuse: String,
    pub sky_irradiance: String,
    pub brdf: String,
}

#[derive(Debug, Clone, Default)]
pub struct SceneDescription {
    pub textures: Vec<(String, ImageData)>,
    pub geometries: Vec<(String, Vec<MeshData>)>,
    pub materials: Vec<MaterialDesc>,
    pub items: Vec<ItemDesc>,
    pub lights: Vec<LightDesc>,
    pub environment: Option<EnvironmentDesc>,
}

impl SceneDescription {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_texture(&mut self, name: impl Into<String>, image: ImageData) -> &mut Self {
        self.textures.push((name.into(), image));
        self
    }

    pub fn add_geometry(&mut self, name: impl Into<String>, meshes: Vec<MeshData>) -> &mut Self {
        self.geometries.push((name.into(), meshes));
        self
    }

    pub fn add_material(&mut self, material: MaterialDesc) -> &mut Self {
        self.materials.push(material);
        self
    }

    pub fn add_item(&mut self, item: ItemDesc) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn add_light(&mut self, light: LightDesc) -> &mut Self {
        self.lights.push(light);
        self
    }

    pub fn set_environment(&mut self, environment: EnvironmentDesc) -> &mut Self {
        self.environment = Some(environment);
        self
    }

    fn check_capacity(&self, settings: &RendererSettings) -> Result<()> {
        let checks = [
            ("render items", self.items.len(), settings.max_render_items),
            ("materials", self.materials.len(), settings.max_materials),
            ("lights", self.lights.len(), settings.max_lights),
        ];
        for (what, count, max) in checks {
            if count > max as usize {
                return Err(RenderError::InvalidSettings(format!(
                    "scene has {count} {what}, capacity is {max}"
                )));
            }
        }
        Ok(())
    }

    /// Resolves names and uploads everything. On failure every GPU object
    /// created so far is destroyed before the error is returned.
    pub fn build(&self, device: &mut impl GpuDevice, settings: &RendererSettings) -> Result<SceneRegistry> {
        self.check_capacity(settings)?;
        let ring_depth = settings.frame_resource_count as u32;
        let mut registry = SceneRegistry::new(device, ring_depth, settings.shadow_map_size, FrameCapacities::from(settings))?;
        match self.populate(device, &mut registry) {
            Ok(()) => {
                log::info!(
                    "Scene built: {} textures, {} geometries, {} materials, {} items, {} lights",
                    registry.textures().len(),
                    registry.geometries().len(),
                    registry.materials().len(),
                    registry.item_count(),
                    registry.lights().len()
                );
                Ok(registry)
            }
            Err(e) => {
                log::error!("Scene build failed: {e}");
                registry.release(device);
                Err(e)
            }
        }
    }

    fn populate(&self, device: &mut impl GpuDevice, registry: &mut SceneRegistry) -> Result<()> {
        for (name, image) in &self.textures {
            registry.add_texture(device, name, image)?;
        }
        for (name, meshes) in &self.geometries {
            registry.upload_geometry(device, name, meshes)?;
        }

        let slot = |registry: &SceneRegistry, name: &Option<String>| -> Result<TextureSlot> {
            name.as_deref().map_or(Ok(super::TextureTable::BLACK), |n| registry.textures().find(n))
        };
        for desc in &self.materials {
            let mut material = desc.material.clone();
            material.diffuse_texture = slot(registry, &desc.diffuse_texture)?;
            material.normal_texture = slot(registry, &desc.normal_texture)?;
            material.displacement_texture = slot(registry, &desc.displacement_texture)?;
            registry.add_material(material)?;
        }

        for item in &self.items {
            let geometry = registry.geometries().find(&item.geometry)?;
            let material = registry.materials().find(&item.material)?;
            let lods: Vec<&str> = item.lods.iter().map(String::as_str).collect();
            registry.add_item(geometry, &item.submesh, &lods, material, item.placement())?;
        }

        for light in &self.lights {
            registry.add_light(device, light.kind, light.params)?;
        }

        if let Some(env) = &self.environment {
            let textures = registry.textures();
            let environment = Environment {
                sky_diffuse: textures.find(&env.sky_diffuse)?,
                sky_irradiance: textures.find(&env.sky_irradiance)?,
                brdf: textures.find(&env.brdf)?,
            };
            registry.set_environment(environment);
        }
        Ok(())
    }
}
