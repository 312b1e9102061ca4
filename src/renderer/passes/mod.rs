//! Render Passes
//!
//! Each pass is a [`RenderNode`] recording into a shared [`FrameContext`].
//! The orchestrator runs them in [`FrameStage`] order:
//!
//! ```text
//! Shadows ─▶ Geometry ─▶ Lighting ─▶ Sky ─▶ PostProcess
//! ```
//!
//! Nodes own no GPU state. Everything they touch lives in the context, so a
//! node is a plain unit struct and the frame graph is a fixed array.

mod geometry;
mod lighting;
mod post;
mod shadow;
mod sky;

pub use geometry::GeometryPass;
pub use lighting::LightingPass;
pub use post::PostProcessPass;
pub use shadow::ShadowPass;
pub use sky::SkyPass;

use super::frame_resource::FrameResource;
use super::gbuffer::GBuffer;
use super::pipelines::{PipelineLibrary, slots};
use super::stage::FrameStage;
use super::tracked::TrackedCommands;
use crate::errors::Result;
use crate::gpu::{GpuDevice, TextureId, Viewport};
use crate::scene::ItemKey;
use crate::scene::registry::SceneRegistry;

/// Everything a pass may read or record during one frame.
pub struct FrameContext<'a, D: GpuDevice> {
    pub cmd: TrackedCommands<'a, D>,
    pub scene: &'a mut SceneRegistry,
    pub frame: &'a FrameResource,
    pub gbuffer: &'a mut GBuffer,
    pub pipelines: &'a PipelineLibrary,
    /// Scene depth buffer, `DepthWrite` for the whole frame.
    pub depth: TextureId,
    pub back_buffer: TextureId,
    pub viewport: Viewport,
}

pub trait RenderNode<D: GpuDevice> {
    /// Debug group label.
    fn name(&self) -> &'static str;

    fn stage(&self) -> FrameStage;

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()>;
}

/// What an item binds besides its object constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemBindings {
    /// Object constants only.
    ObjectOnly,
    /// Material constants and textures too.
    Material,
}

/// Binds an item's geometry and constants and issues its indexed draw.
/// Items whose geometry or material is gone are skipped.
pub(crate) fn draw_item<D: GpuDevice>(
    cmd: &mut TrackedCommands<'_, D>,
    scene: &SceneRegistry,
    frame: &FrameResource,
    key: ItemKey,
    bindings: ItemBindings,
) {
    let Some(item) = scene.item(key) else {
        return;
    };
    let Some(geometry) = scene.geometries().get(item.geometry()) else {
        log::warn!("Render item {key:?} refers to released geometry");
        return;
    };

    cmd.set_geometry(geometry.binding());
    cmd.bind_constants(slots::OBJECT, frame.object_cb.binding(item.object_cb_index()));

    if bindings == ItemBindings::Material {
        let Some(material) = scene.materials().get(item.material()) else {
            log::warn!("Render item {key:?} refers to a missing material");
            return;
        };
        cmd.bind_constants(slots::MATERIAL, frame.material_cb.binding(material.cb_index()));
        cmd.bind_texture(slots::DIFFUSE_MAP, scene.texture(material.diffuse_texture));
        cmd.bind_texture(slots::NORMAL_MAP, scene.texture(material.normal_texture));
        cmd.bind_texture(slots::DISPLACEMENT_MAP, scene.texture(material.displacement_texture));
    }

    let draw = item.active_draw();
    cmd.draw_indexed(draw.index_count, draw.start_index, draw.base_vertex);
}

/// Vertex count of the covering triangle used by full-screen passes.
pub(crate) const FULLSCREEN_VERTICES: u32 = 3;
