//! Scene Registry
//!
//! Owns the CPU scene: textures, geometry, materials, render items and
//! lights. Each constant-bearing object is assigned a dense constant-buffer
//! index at insertion time and a [`DirtyCounter`] sized to the frame ring,
//! so the per-frame update only rewrites what changed.
//!
//! Items are grouped by [`RenderLayer`] twice: once for the full layer
//! (shadow and sky passes draw everything) and once for what survived
//! frustum culling this frame. The visible lists are rebuilt by every
//! update and drained by the geometry pass.

use glam::Mat4;
use slotmap::SlotMap;

use super::dirty::DirtyCounter;
use super::geometry::{DrawArgs, GeometryStore, MeshData};
use super::light::{LightObject, LightParams, LightType};
use super::material::{ImageData, Material, MaterialStore, TextureSlot, TextureTable};
use super::primitives::{SphereOptions, create_cone, create_sphere};
use super::render_item::{LayerTable, LodList, RenderItem, RenderLayer};
use super::{GeometryKey, ItemKey, MaterialKey};
use crate::errors::{RenderError, Result};
use crate::gpu::{GpuDevice, TextureId};
use crate::renderer::frame_resource::FrameCapacities;
use crate::renderer::shadow::ShadowMap;

pub const LIGHT_VOLUME_GEOMETRY: &str = "lightVolumes";
pub const LIGHT_VOLUME_SPHERE: &str = "sphere";
pub const LIGHT_VOLUME_CONE: &str = "cone";
const LIGHT_VOLUME_SLICES: u32 = 20;

/// Unit sphere and cone shared by every point / spot light.
#[derive(Debug, Clone, Copy)]
pub struct LightVolumes {
    pub geometry: GeometryKey,
    pub sphere: DrawArgs,
    pub cone: DrawArgs,
}

/// Image-based lighting inputs sampled by the lighting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
    pub sky_diffuse: TextureSlot,
    pub sky_irradiance: TextureSlot,
    pub brdf: TextureSlot,
}

/// Placement and appearance of one new render item.
#[derive(Debug, Clone)]
pub struct ItemPlacement {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub layer: RenderLayer,
}

impl Default for ItemPlacement {
    fn default() -> Self {
        Self { world: Mat4::IDENTITY, tex_transform: Mat4::IDENTITY, layer: RenderLayer::Opaque }
    }
}

/// Fails when a store already holds `max` entries.
fn ensure_room(what: &str, count: usize, max: u32) -> Result<()> {
    if count >= max as usize {
        return Err(RenderError::InvalidSettings(format!("{what} capacity {max} reached")));
    }
    Ok(())
}

pub struct SceneRegistry {
    pub(crate) textures: TextureTable,
    pub(crate) geometries: GeometryStore,
    pub(crate) materials: MaterialStore,
    pub(crate) items: SlotMap<ItemKey, RenderItem>,
    pub(crate) layers: LayerTable<Vec<ItemKey>>,
    pub(crate) visible: LayerTable<Vec<ItemKey>>,
    pub(crate) lights: Vec<LightObject>,
    pub(crate) light_volumes: LightVolumes,
    pub(crate) environment: Environment,
    ring_depth: u32,
    shadow_map_size: u32,
    capacities: FrameCapacities,
}

impl SceneRegistry {
    /// Creates an empty registry holding the default black texture, a black
    /// fallback cube map and the light-volume meshes.
    ///
    /// `capacities` bound the items, materials and lights the registry
    /// accepts, matching the per-frame constant buffers they are written to.
    pub fn new(
        device: &mut impl GpuDevice,
        ring_depth: u32,
        shadow_map_size: u32,
        capacities: FrameCapacities,
    ) -> Result<Self> {
        let mut textures = TextureTable::new(device)?;
        let black_cube = textures.add(device, "blackCube", &ImageData::solid_cube([0, 0, 0, 255]))?;

        let mut geometries = GeometryStore::new();
        let geometry = geometries.upload(
            device,
            LIGHT_VOLUME_GEOMETRY,
            &[
                create_sphere(LIGHT_VOLUME_SPHERE, &SphereOptions::default()),
                create_cone(LIGHT_VOLUME_CONE, LIGHT_VOLUME_SLICES),
            ],
        );
        let geometry = match geometry {
            Ok(key) => key,
            Err(e) => {
                textures.destroy_all(device);
                return Err(e);
            }
        };
        let volumes = geometries.get(geometry).map(|g| (g.submesh(LIGHT_VOLUME_SPHERE), g.submesh(LIGHT_VOLUME_CONE)));
        let Some((Ok(sphere), Ok(cone))) = volumes else {
            geometries.destroy_all(device);
            textures.destroy_all(device);
            return Err(RenderError::GeometryNotFound(LIGHT_VOLUME_GEOMETRY.to_string()));
        };

        Ok(Self {
            textures,
            geometries,
            materials: MaterialStore::new(ring_depth),
            items: SlotMap::with_key(),
            layers: LayerTable::default(),
            visible: LayerTable::default(),
            lights: Vec::new(),
            light_volumes: LightVolumes { geometry, sphere, cone },
            environment: Environment {
                sky_diffuse: black_cube,
                sky_irradiance: black_cube,
                brdf: TextureTable::BLACK,
            },
            ring_depth,
            shadow_map_size,
            capacities,
        })
    }

    // ========================================================================
    // Population
    // ========================================================================

    pub fn add_texture(&mut self, device: &mut impl GpuDevice, name: &str, image: &ImageData) -> Result<TextureSlot> {
        self.textures.add(device, name, image)
    }

    pub fn upload_geometry(&mut self, device: &mut impl GpuDevice, name: &str, meshes: &[MeshData]) -> Result<GeometryKey> {
        self.geometries.upload(device, name, meshes)
    }

    pub fn add_material(&mut self, material: Material) -> Result<MaterialKey> {
        ensure_room("materials", self.materials.len(), self.capacities.materials)?;
        Ok(self.materials.insert(material))
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    /// Adds a render item drawing `submesh` of `geometry`, with optional LOD
    /// submeshes from the same geometry.
    pub fn add_item(
        &mut self,
        geometry: GeometryKey,
        submesh: &str,
        lods: &[&str],
        material: MaterialKey,
        placement: ItemPlacement,
    ) -> Result<ItemKey> {
        let geo = self
            .geometries
            .get(geometry)
            .ok_or_else(|| RenderError::GeometryNotFound(format!("<stale key>/{submesh}")))?;
        let draw = geo.submesh(submesh)?;
        let lods = lods.iter().map(|name| geo.submesh(name)).collect::<Result<LodList>>()?;
        if self.materials.get(material).is_none() {
            return Err(RenderError::MaterialNotFound(format!("<stale key> for item '{submesh}'")));
        }
        ensure_room("render items", self.items.len(), self.capacities.objects)?;

        let item = RenderItem::new(
            placement.world,
            placement.tex_transform,
            self.items.len() as u32,
            material,
            geometry,
            draw,
            lods,
            placement.layer,
            self.ring_depth,
        );
        let key = self.items.insert(item);
        self.layers[placement.layer].push(key);
        Ok(key)
    }

    /// Adds a light and creates the shadow map it owns.
    pub fn add_light(&mut self, device: &mut impl GpuDevice, kind: LightType, params: LightParams) -> Result<usize> {
        ensure_room("lights", self.lights.len(), self.capacities.lights)?;
        let index = self.lights.len();
        let label = format!("Light {index} ({kind:?})");
        let shadow_map = ShadowMap::new(device, &label, self.shadow_map_size)?;
        let mut light = LightObject::new(kind, params, index as u32, self.ring_depth, shadow_map);
        light.volume = match kind {
            LightType::Directional => None,
            LightType::Spot => Some(self.light_volumes.cone),
            LightType::Point => Some(self.light_volumes.sphere),
        };
        log::debug!("Registered {label}");
        self.lights.push(light);
        Ok(index)
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[must_use]
    pub fn item(&self, key: ItemKey) -> Option<&RenderItem> {
        self.items.get(key)
    }

    /// Mutable access to an item. Use its setters so changes reach every
    /// ring slot.
    pub fn item_mut(&mut self, key: ItemKey) -> Option<&mut RenderItem> {
        self.items.get_mut(key)
    }

    pub fn items(&self) -> impl Iterator<Item = (ItemKey, &RenderItem)> {
        self.items.iter()
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Every item of a layer, in insertion order.
    #[must_use]
    pub fn layer(&self, layer: RenderLayer) -> &[ItemKey] {
        &self.layers[layer]
    }

    /// Items of a layer that passed culling in the last update.
    #[must_use]
    pub fn visible(&self, layer: RenderLayer) -> &[ItemKey] {
        &self.visible[layer]
    }

    pub(crate) fn clear_visible(&mut self) {
        for list in self.visible.values_mut() {
            list.clear();
        }
    }

    #[must_use]
    pub fn lights(&self) -> &[LightObject] {
        &self.lights
    }

    pub fn light_mut(&mut self, index: usize) -> Option<&mut LightObject> {
        self.lights.get_mut(index)
    }

    /// Directional shadow cascades follow the camera, so their constants go
    /// stale whenever it moves.
    pub fn mark_directional_lights_dirty(&mut self) {
        self.lights
            .iter_mut()
            .filter(|l| l.kind() == LightType::Directional)
            .for_each(|l| l.dirty.mark());
    }

    #[must_use]
    pub fn materials(&self) -> &MaterialStore {
        &self.materials
    }

    pub fn materials_mut(&mut self) -> &mut MaterialStore {
        &mut self.materials
    }

    #[must_use]
    pub fn textures(&self) -> &TextureTable {
        &self.textures
    }

    #[must_use]
    pub fn geometries(&self) -> &GeometryStore {
        &self.geometries
    }

    #[must_use]
    pub fn light_volumes(&self) -> &LightVolumes {
        &self.light_volumes
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Texture bound for a material slot.
    #[must_use]
    pub fn texture(&self, slot: TextureSlot) -> TextureId {
        self.textures.texture(slot)
    }

    #[must_use]
    pub fn ring_depth(&self) -> u32 {
        self.ring_depth
    }

    /// Whether any object still has a stale ring slot.
    #[must_use]
    pub fn has_pending_uploads(&self) -> bool {
        let pending = |d: DirtyCounter| d.is_dirty();
        self.items.values().any(|i| pending(i.dirty))
            || self.lights.iter().any(|l| pending(l.dirty))
            || self.materials.iter().any(|(_, m)| pending(m.dirty))
    }

    /// Destroys every GPU object the scene owns. The GPU must be idle.
    pub fn release(&mut self, device: &mut impl GpuDevice) {
        for light in self.lights.drain(..) {
            light.shadow_map.release(device);
        }
        self.geometries.destroy_all(device);
        self.textures.destroy_all(device);
        self.items.clear();
        for list in self.layers.values_mut() {
            list.clear();
        }
        self.clear_visible();
    }
}
