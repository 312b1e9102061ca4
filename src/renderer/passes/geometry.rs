use super::{FrameContext, ItemBindings, RenderNode, draw_item};
use crate::errors::Result;
use crate::gpu::{DepthTarget, GpuDevice, PassDesc};
use crate::renderer::gbuffer::Attachment;
use crate::renderer::pipelines::{PipelineKind, slots};
use crate::renderer::stage::FrameStage;
use crate::scene::render_item::RenderLayer;

/// Fills the G-buffer surface attachments with every visible opaque item,
/// then drains the visible lists.
pub struct GeometryPass;

impl<D: GpuDevice> RenderNode<D> for GeometryPass {
    fn name(&self) -> &'static str {
        "Deferred Geometry"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Geometry
    }

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()> {
        ctx.gbuffer.transition_to_geometry_pass(ctx.cmd.device());
        ctx.gbuffer.clear_render_targets(ctx.cmd.device());

        let pass = PassDesc {
            label: "Deferred Geometry",
            color_targets: ctx.gbuffer.targets(&Attachment::SURFACE),
            depth_target: Some(DepthTarget { texture: ctx.depth, layer: 0 }),
            viewport: ctx.viewport,
        };
        ctx.cmd.begin_pass(&pass);
        ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::Geometry));
        ctx.cmd.bind_constants(slots::PASS, ctx.frame.pass_cb.binding(0));

        for &key in ctx.scene.visible(RenderLayer::Opaque) {
            draw_item(&mut ctx.cmd, ctx.scene, ctx.frame, key, ItemBindings::Material);
        }
        ctx.cmd.end_pass();

        ctx.scene.clear_visible();
        Ok(())
    }
}
