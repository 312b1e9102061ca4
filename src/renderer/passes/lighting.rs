use smallvec::smallvec;

use super::{FULLSCREEN_VERTICES, FrameContext, RenderNode};
use crate::errors::Result;
use crate::gpu::{DepthTarget, GpuDevice, PassDesc};
use crate::renderer::gbuffer::Attachment;
use crate::renderer::pipelines::{PipelineKind, slots};
use crate::renderer::stage::FrameStage;
use crate::scene::light::LightType;

/// Shades the G-buffer into the bloom target.
///
/// Directional lights cover the screen with one triangle; point and spot
/// lights rasterize their bounding volume so only covered pixels pay for
/// them. All light contributions blend additively, followed by the
/// image-based ambient term.
pub struct LightingPass;

impl<D: GpuDevice> RenderNode<D> for LightingPass {
    fn name(&self) -> &'static str {
        "Deferred Lighting"
    }

    fn stage(&self) -> FrameStage {
        FrameStage::Lighting
    }

    fn run(&self, ctx: &mut FrameContext<'_, D>) -> Result<()> {
        ctx.gbuffer.transition_to_lighting_pass(ctx.cmd.device());

        let pass = PassDesc {
            label: "Deferred Lighting",
            color_targets: smallvec![ctx.gbuffer.texture(Attachment::Bloom)],
            depth_target: Some(DepthTarget { texture: ctx.depth, layer: 0 }),
            viewport: ctx.viewport,
        };
        ctx.cmd.begin_pass(&pass);
        ctx.cmd.bind_constants(slots::PASS, ctx.frame.pass_cb.binding(0));

        for (i, attachment) in Attachment::SURFACE.into_iter().enumerate() {
            ctx.cmd.bind_texture(slots::GBUFFER_FIRST + i as u32, ctx.gbuffer.texture(attachment));
        }
        let env = ctx.scene.environment();
        ctx.cmd.bind_texture(slots::SKY_DIFFUSE, ctx.scene.texture(env.sky_diffuse));
        ctx.cmd.bind_texture(slots::SKY_IRRADIANCE, ctx.scene.texture(env.sky_irradiance));
        ctx.cmd.bind_texture(slots::BRDF_LUT, ctx.scene.texture(env.brdf));

        let volumes = ctx.scene.light_volumes().geometry;
        for light in ctx.scene.lights() {
            ctx.cmd.bind_constants(slots::LIGHT, ctx.frame.light_cb.binding(light.cb_index()));
            ctx.cmd.bind_texture(slots::SHADOW_MAP, light.shadow_map().texture());

            match (light.kind(), light.volume()) {
                (LightType::Directional, _) => {
                    ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::DeferredLights));
                    ctx.cmd.draw(FULLSCREEN_VERTICES);
                }
                (_, Some(volume)) => {
                    let Some(geometry) = ctx.scene.geometries().get(volumes) else {
                        continue;
                    };
                    ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::LightVolumes));
                    ctx.cmd.set_geometry(geometry.binding());
                    ctx.cmd.draw_indexed(volume.index_count, volume.start_index, volume.base_vertex);
                }
                (kind, None) => log::warn!("{kind:?} light {} has no volume; skipped", light.cb_index()),
            }
        }

        ctx.cmd.set_pipeline(ctx.pipelines.get(PipelineKind::DeferredAmbient));
        ctx.cmd.draw(FULLSCREEN_VERTICES);
        ctx.cmd.end_pass();
        Ok(())
    }
}
