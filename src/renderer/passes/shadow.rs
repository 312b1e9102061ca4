use super::{FrameContext, ItemBindings, RenderNode, draw_item};
use crate::errors::Result;
use crate::gpu::GpuDevice;
use crate::renderer::frame_resource::FrameResource;
use crate::renderer::pipelines::{PipelineKind, slots};
use crate::renderer::shadow::shadow_view_count;
use crate::renderer::stage::FrameStage;
use crate::scene::render_item::RenderLayer;

/// Depth-only rendering of every opaque item into every light's shadow map,
/// one pass per shadow view.
///
/// Culling against the camera does not apply: casters outside the view
/// still throw shadows into it.
pub struct ShadowPass;

impl<D: GpuDevice> RenderNode<D> for ShadowPass {
    fn name(&self) -> &'static str {
        "Shadow Maps"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Shadows
    }

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()> {
        let pipeline = ctx.pipelines.get(PipelineKind::ShadowOpaque);

        for light_index in 0..ctx.scene.lights.len() {
            let light = &mut ctx.scene.lights[light_index];
            let views = shadow_view_count(light.kind()) as u32;
            let cb_index = light.cb_index;
            light.shadow_map.begin_render(ctx.cmd.device());

            for view in 0..views {
                let pass = ctx.scene.lights[light_index].shadow_map.pass_desc(view);
                ctx.cmd.begin_pass(&pass);
                ctx.cmd.set_pipeline(pipeline);
                let index = FrameResource::shadow_view_index(cb_index, view);
                ctx.cmd.bind_constants(slots::SHADOW_VIEW, ctx.frame.shadow_view_cb.binding(index));
                for &key in ctx.scene.layer(RenderLayer::Opaque) {
                    draw_item(&mut ctx.cmd, ctx.scene, ctx.frame, key, ItemBindings::ObjectOnly);
                }
                ctx.cmd.end_pass();
            }

            ctx.scene.lights[light_index].shadow_map.end_render(ctx.cmd.device());
        }
        Ok(())
    }
}
