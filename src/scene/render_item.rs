use std::ops::{Index, IndexMut};

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use super::bounds::BoundingBox;
use super::dirty::DirtyCounter;
use super::geometry::DrawArgs;
use super::{GeometryKey, MaterialKey};

/// Render layers, drawn by different passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RenderLayer {
    /// Lit geometry written to the G-buffer and the shadow maps.
    Opaque = 0,
    /// Screen-space debug overlays.
    Debug = 1,
    /// Sky dome, drawn after lighting.
    Sky = 2,
}

impl RenderLayer {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [Self::Opaque, Self::Debug, Self::Sky];

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One `T` per [`RenderLayer`], indexed by the layer itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerTable<T> {
    slots: [T; RenderLayer::COUNT],
}

impl<T> LayerTable<T> {
    pub fn iter(&self) -> impl Iterator<Item = (RenderLayer, &T)> {
        RenderLayer::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

impl<T> Index<RenderLayer> for LayerTable<T> {
    type Output = T;

    #[inline]
    fn index(&self, layer: RenderLayer) -> &T {
        &self.slots[layer.index()]
    }
}

impl<T> IndexMut<RenderLayer> for LayerTable<T> {
    #[inline]
    fn index_mut(&mut self, layer: RenderLayer) -> &mut T {
        &mut self.slots[layer.index()]
    }
}

/// Levels of detail beyond the base geometry. Two is the common case.
pub type LodList = SmallVec<[DrawArgs; 2]>;

/// A drawable instance of a submesh.
///
/// Items are plain data: they reference geometry and material by key and
/// own nothing on the GPU.
#[derive(Debug, Clone)]
pub struct RenderItem {
    world: Mat4,
    tex_transform: Mat4,
    pub(crate) object_cb_index: u32,
    pub(crate) material: MaterialKey,
    pub(crate) geometry: GeometryKey,
    /// Base submesh.
    pub(crate) draw: DrawArgs,
    pub(crate) lods: LodList,
    pub(crate) current_lod: usize,
    pub(crate) layer: RenderLayer,
    /// World-space bounds, refreshed whenever the constants are.
    pub(crate) bounds: BoundingBox,
    pub(crate) dirty: DirtyCounter,
}

impl RenderItem {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        world: Mat4,
        tex_transform: Mat4,
        object_cb_index: u32,
        material: MaterialKey,
        geometry: GeometryKey,
        draw: DrawArgs,
        lods: LodList,
        layer: RenderLayer,
        ring_depth: u32,
    ) -> Self {
        Self {
            world,
            tex_transform,
            object_cb_index,
            material,
            geometry,
            draw,
            lods,
            current_lod: 0,
            layer,
            bounds: draw.bounds.transformed(&world),
            dirty: DirtyCounter::new(ring_depth),
        }
    }

    #[must_use]
    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
        self.dirty.mark();
    }

    #[must_use]
    pub fn tex_transform(&self) -> Mat4 {
        self.tex_transform
    }

    pub fn set_tex_transform(&mut self, tex_transform: Mat4) {
        self.tex_transform = tex_transform;
        self.dirty.mark();
    }

    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    /// Picks LOD 1 past `threshold`, LOD 0 otherwise.
    pub fn select_lod(&mut self, distance: f32, threshold: f32) -> usize {
        self.current_lod = usize::from(distance > threshold);
        self.current_lod
    }

    /// Draw arguments for this frame. Items without LODs draw their base
    /// submesh; an index past the list clamps to the last LOD.
    #[must_use]
    pub fn active_draw(&self) -> DrawArgs {
        match self.lods.last() {
            None => self.draw,
            Some(last) => self.lods.get(self.current_lod).copied().unwrap_or(*last),
        }
    }

    pub(crate) fn refresh_bounds(&mut self) {
        self.bounds = self.draw.bounds.transformed(&self.world);
    }

    #[must_use]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    #[must_use]
    pub fn layer(&self) -> RenderLayer {
        self.layer
    }

    #[must_use]
    pub fn material(&self) -> MaterialKey {
        self.material
    }

    #[must_use]
    pub fn geometry(&self) -> GeometryKey {
        self.geometry
    }

    #[must_use]
    pub fn object_cb_index(&self) -> u32 {
        self.object_cb_index
    }

    #[must_use]
    pub fn current_lod(&self) -> usize {
        self.current_lod
    }

    #[must_use]
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    #[must_use]
    pub fn dirty(&self) -> DirtyCounter {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(index_count: u32) -> DrawArgs {
        DrawArgs { index_count, ..DrawArgs::default() }
    }

    fn item(lods: &[DrawArgs]) -> RenderItem {
        RenderItem::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            0,
            MaterialKey::default(),
            GeometryKey::default(),
            args(36),
            lods.iter().copied().collect(),
            RenderLayer::Opaque,
            3,
        )
    }

    #[test]
    fn lod_switches_past_threshold() {
        let mut it = item(&[args(900), args(36)]);
        assert_eq!(it.select_lod(150.0, 150.0), 0);
        assert_eq!(it.active_draw().index_count, 900);
        assert_eq!(it.select_lod(150.1, 150.0), 1);
        assert_eq!(it.active_draw().index_count, 36);
    }

    #[test]
    fn out_of_range_lod_clamps_to_last() {
        let mut it = item(&[args(900)]);
        it.select_lod(500.0, 150.0);
        assert_eq!(it.current_lod(), 1);
        assert_eq!(it.active_draw().index_count, 900);
    }

    #[test]
    fn no_lods_draws_base() {
        let mut it = item(&[]);
        it.select_lod(500.0, 150.0);
        assert_eq!(it.active_draw().index_count, 36);
    }

    #[test]
    fn layer_table_indexes_by_layer() {
        let mut t: LayerTable<Vec<u32>> = LayerTable::default();
        t[RenderLayer::Sky].push(7);
        assert!(t[RenderLayer::Opaque].is_empty());
        assert_eq!(t[RenderLayer::Sky], vec![7]);
        assert_eq!(t.iter().map(|(l, _)| l).collect::<Vec<_>>(), RenderLayer::ALL.to_vec());
    }
}
