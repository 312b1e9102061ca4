use glam::{Mat4, Vec3, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::MaterialKey;
use super::dirty::DirtyCounter;
use crate::errors::{RenderError, Result};
use crate::gpu::{GpuDevice, TextureDesc, TextureId};

/// Index into the [`TextureTable`]. Slot 0 is always the 1×1 black texture.
pub type TextureSlot = u32;

/// Decoded image handed over by the asset layer: tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// 1 for 2D textures, 6 for cube maps (+X, -X, +Y, -Y, +Z, -Z).
    pub layers: u32,
    pub texels: Vec<u8>,
}

impl ImageData {
    /// A 1×1 texture of one color.
    #[must_use]
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self { width: 1, height: 1, layers: 1, texels: rgba.to_vec() }
    }

    /// A 1×1 cube map of one color.
    #[must_use]
    pub fn solid_cube(rgba: [u8; 4]) -> Self {
        Self { width: 1, height: 1, layers: 6, texels: rgba.repeat(6) }
    }

    fn layer_size(&self) -> usize {
        (self.width * self.height * 4) as usize
    }
}

#[derive(Debug)]
struct TextureEntry {
    name: String,
    texture: TextureId,
}

/// Shared, ordered table of sampled textures. Materials refer to entries by
/// slot index.
#[derive(Debug, Default)]
pub struct TextureTable {
    entries: Vec<TextureEntry>,
    by_name: FxHashMap<String, TextureSlot>,
}

impl TextureTable {
    pub const BLACK: TextureSlot = 0;

    /// Creates the table with the default black texture in slot 0.
    pub fn new(device: &mut impl GpuDevice) -> Result<Self> {
        let mut table = Self::default();
        table.add(device, "black", &ImageData::solid([0, 0, 0, 255]))?;
        Ok(table)
    }

    pub fn add(&mut self, device: &mut impl GpuDevice, name: &str, image: &ImageData) -> Result<TextureSlot> {
        if image.layers == 0 || image.texels.len() != image.layer_size() * image.layers as usize {
            return Err(RenderError::ResourceCreation {
                kind: "texture",
                label: name.to_string(),
                reason: format!(
                    "{} bytes do not match {}x{}x{}",
                    image.texels.len(),
                    image.width,
                    image.height,
                    image.layers
                ),
            });
        }
        let texture = device.create_texture(&TextureDesc::sampled(name, image.width, image.height, image.layers))?;
        for (layer, texels) in image.texels.chunks_exact(image.layer_size()).enumerate() {
            device.write_texture(texture, layer as u32, texels)?;
        }

        let slot = self.entries.len() as TextureSlot;
        self.entries.push(TextureEntry { name: name.to_string(), texture });
        if self.by_name.insert(name.to_string(), slot).is_some() {
            log::warn!("Texture '{name}' registered twice; the name now refers to slot {slot}");
        }
        Ok(slot)
    }

    pub fn find(&self, name: &str) -> Result<TextureSlot> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::TextureNotFound(name.to_string()))
    }

    /// Texture behind a slot; unknown slots fall back to black.
    #[must_use]
    pub fn texture(&self, slot: TextureSlot) -> TextureId {
        self.entries
            .get(slot as usize)
            .or_else(|| self.entries.first())
            .map(|e| e.texture)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self, slot: TextureSlot) -> Option<&str> {
        self.entries.get(slot as usize).map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn destroy_all(&mut self, device: &mut impl GpuDevice) {
        for entry in self.entries.drain(..) {
            device.destroy_texture(entry.texture);
        }
        self.by_name.clear();
    }
}

/// PBR surface parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub metallic: f32,
    pub transform: Mat4,
    pub diffuse_texture: TextureSlot,
    pub normal_texture: TextureSlot,
    pub displacement_texture: TextureSlot,
    pub(crate) cb_index: u32,
    pub(crate) dirty: DirtyCounter,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            metallic: 0.0,
            transform: Mat4::IDENTITY,
            diffuse_texture: TextureTable::BLACK,
            normal_texture: TextureTable::BLACK,
            displacement_texture: TextureTable::BLACK,
            cb_index: 0,
            dirty: DirtyCounter::new(0),
        }
    }

    #[must_use]
    pub fn cb_index(&self) -> u32 {
        self.cb_index
    }

    #[must_use]
    pub fn dirty(&self) -> DirtyCounter {
        self.dirty
    }
}

/// Owns all materials; hands out constant-buffer indices in insertion order.
#[derive(Debug, Default)]
pub struct MaterialStore {
    materials: SlotMap<MaterialKey, Material>,
    by_name: FxHashMap<String, MaterialKey>,
    ring_depth: u32,
}

impl MaterialStore {
    #[must_use]
    pub fn new(ring_depth: u32) -> Self {
        Self { ring_depth, ..Self::default() }
    }

    pub(crate) fn insert(&mut self, mut material: Material) -> MaterialKey {
        material.cb_index = self.materials.len() as u32;
        material.dirty = DirtyCounter::new(self.ring_depth);
        let name = material.name.clone();
        let key = self.materials.insert(material);
        if self.by_name.insert(name.clone(), key).is_some() {
            log::warn!("Material '{name}' registered twice; the name now refers to the newer one");
        }
        key
    }

    pub fn find(&self, name: &str) -> Result<MaterialKey> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::MaterialNotFound(name.to_string()))
    }

    #[must_use]
    pub fn get(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Mutable access; any change re-uploads the material to every slot.
    pub fn get_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        let material = self.materials.get_mut(key)?;
        material.dirty.mark();
        Some(material)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialKey, &Material)> {
        self.materials.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.materials.values_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
