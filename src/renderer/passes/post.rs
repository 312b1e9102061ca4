use smallvec::smallvec;

use super::{FULLSCREEN_VERTICES, FrameContext, RenderNode};
use crate::errors::Result;
use crate::gpu::{GpuDevice, PassDesc};
use crate::renderer::gbuffer::Attachment;
use crate::renderer::pipelines::{PipelineKind, slots};
use crate::renderer::stage::FrameStage;

/// Depth of field and chromatic aberration from bloom into the back buffer.
/// Returns the G-buffer to `Common` when done.
pub struct PostProcessPass;

impl<D: GpuDevice> RenderNode<D> for PostProcessPass {
    fn name(&self) -> &'static str {
        "Post Process"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::PostProcess
    }

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()> {
        ctx.gbuffer.transition_to_tonemap(ctx.cmd.device());

        let pass = PassDesc {
            label: "Post Process",
            color_targets: smallvec![ctx.back_buffer],
            depth_target: None,
            viewport: ctx.viewport,
        };
        ctx.cmd.begin_pass(&pass);
        ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::PostProcess));
        ctx.cmd.bind_constants(slots::POST_PROCESS, ctx.frame.post_process_cb.binding(0));
        ctx.cmd.bind_texture(slots::BLOOM, ctx.gbuffer.texture(Attachment::Bloom));
        ctx.cmd.bind_texture(slots::ZW, ctx.gbuffer.texture(Attachment::ZW));
        ctx.cmd.bind_texture(slots::NORMAL, ctx.gbuffer.texture(Attachment::Normal));
        ctx.cmd.draw(FULLSCREEN_VERTICES);
        ctx.cmd.end_pass();

        ctx.gbuffer.transition_to_common(ctx.cmd.device());
        Ok(())
    }
}
