use smallvec::smallvec;

use super::{FrameContext, ItemBindings, RenderNode, draw_item};
use crate::errors::Result;
use crate::gpu::{DepthTarget, GpuDevice, PassDesc};
use crate::renderer::gbuffer::Attachment;
use crate::renderer::pipelines::{PipelineKind, slots};
use crate::renderer::stage::FrameStage;
use crate::scene::render_item::RenderLayer;

/// Draws the sky layer behind the lit scene, sampling the environment cube.
pub struct SkyPass;

impl<D: GpuDevice> RenderNode<D> for SkyPass {
    fn name(&self) -> &'static str {
        "Sky"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Sky
    }

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()> {
        let pass = PassDesc {
            label: "Sky",
            color_targets: smallvec![ctx.gbuffer.texture(Attachment::Bloom)],
            depth_target: Some(DepthTarget { texture: ctx.depth, layer: 0 }),
            viewport: ctx.viewport,
        };
        ctx.cmd.begin_pass(&pass);
        ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::Sky));
        ctx.cmd.bind_constants(slots::PASS, ctx.frame.pass_cb.binding(0));
        ctx.cmd.bind_texture(slots::SKY_CUBE, ctx.scene.texture(ctx.scene.environment().sky_diffuse));

        for &key in ctx.scene.layer(RenderLayer::Sky) {
            draw_item(&mut ctx.cmd, ctx.scene, ctx.frame, key, ItemBindings::ObjectOnly);
        }
        ctx.cmd.end_pass();
        Ok(())
    }
}
