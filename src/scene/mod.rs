//! Scene Module
//!
//! CPU-side description of what gets drawn:
//! - [`RenderItem`]: one drawable instance (transform, geometry, material, LOD list)
//! - [`LightObject`]: a light and the shadow map it owns
//! - [`Material`] / [`MaterialStore`]: PBR parameters and texture slots
//! - [`GeometryStore`]: packed vertex / index buffers and their submeshes
//! - [`SceneRegistry`]: all of the above plus per-layer visible lists
//! - [`SceneDescription`]: builder consumed by `Renderer::initialize`
//! - [`Camera`]: left-handed fly camera with a world-space frustum

pub mod bounds;
pub mod builder;
pub mod camera;
pub mod dirty;
pub mod geometry;
pub mod light;
pub mod material;
pub mod primitives;
pub mod registry;
pub mod render_item;

pub use bounds::BoundingBox;
pub use builder::{EnvironmentDesc, ItemDesc, LightDesc, MaterialDesc, SceneDescription};
pub use camera::{Camera, Frustum};
pub use dirty::DirtyCounter;
pub use geometry::{DrawArgs, GeometryStore, MeshData, MeshGeometry, Vertex};
pub use light::{LightObject, LightParams, LightType};
pub use material::{ImageData, Material, MaterialStore, TextureSlot, TextureTable};
pub use registry::{Environment, ItemPlacement, LightVolumes, SceneRegistry};
pub use render_item::{LayerTable, RenderItem, RenderLayer};

use slotmap::new_key_type;

new_key_type! {
    pub struct GeometryKey;
    pub struct MaterialKey;
    pub struct ItemKey;
}
