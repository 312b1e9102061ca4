//! Renderer Module
//!
//! [`Renderer`] drives one deferred frame per `update` + `draw` pair:
//!
//! ```text
//! update(t):  frame_index += 1
//!             acquire ring slot (waits for its fence)
//!             object / light / material / pass / post-process constants
//! draw():     back buffer Common → RenderTarget, clears
//!             Shadows → Geometry → Lighting → Sky → PostProcess
//!             back buffer RenderTarget → Common
//!             execute, present, signal(++fence)
//! ```
//!
//! Any error while recording aborts the frame: the G-buffer is returned to
//! `Common` and the error is handed back. GPU timeline failures are terminal.
//!
//! # Lifecycle
//!
//! ```rust,ignore
//! let mut renderer = Renderer::new(device, RendererSettings::default())?;
//! renderer.initialize(&scene)?;
//! renderer.on_resize(1280, 720)?;
//! loop {
//!     renderer.update(timer.frame_time())?;
//!     renderer.draw()?;
//! }
//! renderer.shutdown()?;
//! ```

pub mod frame_resource;
pub mod gbuffer;
pub mod passes;
pub mod pipelines;
pub mod settings;
pub mod shadow;
pub mod stage;
pub mod tracked;
pub mod uniforms;
pub mod update;

use crate::errors::{RenderError, Result};
use crate::gpu::{Barrier, GpuDevice, ResourceState, TextureDesc, TextureDimension, TextureId, TextureUsages, Viewport};
use crate::scene::builder::SceneDescription;
use crate::scene::camera::Camera;
use crate::scene::registry::SceneRegistry;
use crate::utils::time::FrameTime;

use self::frame_resource::{FrameCapacities, FrameResourceRing};
use self::gbuffer::GBuffer;
use self::passes::{
    FrameContext, GeometryPass, LightingPass, PostProcessPass, RenderNode, ShadowPass, SkyPass,
};
use self::pipelines::{DEPTH_FORMAT, PipelineLibrary};
use self::settings::RendererSettings;
use self::stage::{FrameStage, StageTracker};
use self::tracked::TrackedCommands;
use self::update::UpdateStats;

/// Screen-sized targets, created by the first `on_resize`.
struct ScreenTargets {
    gbuffer: GBuffer,
    depth: TextureId,
    width: u32,
    height: u32,
}

impl ScreenTargets {
    fn create_depth(device: &mut impl GpuDevice, width: u32, height: u32) -> Result<TextureId> {
        device.create_texture(&TextureDesc {
            label: "Scene Depth".to_string(),
            width,
            height,
            layers: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::DEPTH_STENCIL,
            initial_state: ResourceState::DepthWrite,
        })
    }
}

/// Deferred renderer over a [`GpuDevice`].
pub struct Renderer<D: GpuDevice> {
    device: D,
    settings: RendererSettings,
    camera: Camera,

    scene: Option<SceneRegistry>,
    pipelines: Option<PipelineLibrary>,
    ring: Option<FrameResourceRing>,
    targets: Option<ScreenTargets>,

    stages: StageTracker,
    frame_index: u64,
    current_fence: u64,
    /// Set by `update`, consumed by `draw`.
    frame_prepared: bool,
    last_update: UpdateStats,
    released: bool,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, settings: RendererSettings) -> Result<Self> {
        settings.validate()?;
        let mut camera = Camera::new();
        let lens = settings.camera;
        camera.set_lens(lens.fov_y, camera.aspect(), lens.near, lens.far);
        camera.update_view_matrix();

        Ok(Self {
            device,
            settings,
            camera,
            scene: None,
            pipelines: None,
            ring: None,
            targets: None,
            stages: StageTracker::default(),
            frame_index: 0,
            current_fence: 0,
            frame_prepared: false,
            last_update: UpdateStats::default(),
            released: false,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Uploads the scene and builds every size-independent GPU object.
    pub fn initialize(&mut self, description: &SceneDescription) -> Result<()> {
        if self.scene.is_some() {
            self.flush()?;
            self.release_scene();
        }

        let mut scene = description.build(&mut self.device, &self.settings)?;

        let surface_format = self.device.surface_format();
        let built = PipelineLibrary::new(&mut self.device, &self.settings.shaders, surface_format).and_then(|pipelines| {
            let ring = FrameResourceRing::new(
                &mut self.device,
                self.settings.frame_resource_count,
                FrameCapacities::from(&self.settings),
                self.settings.fence_timeout(),
            )?;
            Ok((pipelines, ring))
        });
        let (pipelines, ring) = match built {
            Ok(parts) => parts,
            Err(e) => {
                log::error!("Renderer initialization failed: {e}");
                scene.release(&mut self.device);
                return Err(e);
            }
        };

        log::info!(
            "Renderer initialized: {} items, {} lights, {} materials, {} frame resources",
            scene.item_count(),
            scene.lights().len(),
            scene.materials().len(),
            ring.len()
        );
        self.scene = Some(scene);
        self.pipelines = Some(pipelines);
        self.ring = Some(ring);
        Ok(())
    }

    /// Resizes the swap chain and every screen-sized target. Must run before
    /// the first `draw` and after every surface size change.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSurfaceSize { width, height });
        }
        self.flush()?;
        self.device.resize_surface(width, height)?;

        match self.targets.as_mut() {
            Some(targets) => {
                targets.gbuffer.resize(&mut self.device, width, height)?;
                let depth = ScreenTargets::create_depth(&mut self.device, width, height)?;
                self.device.destroy_texture(std::mem::replace(&mut targets.depth, depth));
                targets.width = width;
                targets.height = height;
            }
            None => {
                let gbuffer = GBuffer::new(&mut self.device, width, height)?;
                let depth = match ScreenTargets::create_depth(&mut self.device, width, height) {
                    Ok(depth) => depth,
                    Err(e) => {
                        gbuffer.release(&mut self.device);
                        return Err(e);
                    }
                };
                self.targets = Some(ScreenTargets { gbuffer, depth, width, height });
            }
        }

        let lens = self.settings.camera;
        self.camera.set_lens(lens.fov_y, width as f32 / height as f32, lens.near, lens.far);
        self.camera.update_view_matrix();
        log::debug!("Resized to {width}x{height}");
        Ok(())
    }

    /// Prepares the next frame: waits for its ring slot and writes every
    /// stale constant into it.
    pub fn update(&mut self, time: FrameTime) -> Result<()> {
        let (Some(scene), Some(ring)) = (self.scene.as_mut(), self.ring.as_mut()) else {
            return Err(RenderError::NotReady("update called before initialize"));
        };
        let Some(targets) = self.targets.as_ref() else {
            return Err(RenderError::NotReady("update called before on_resize"));
        };

        self.frame_index += 1;
        let frame = ring.acquire(&mut self.device, self.frame_index)?;

        self.camera.update_view_matrix();
        if self.camera.take_moved() {
            scene.mark_directional_lights_dirty();
        }

        let mut stats = UpdateStats::default();
        let device = &mut self.device;
        update::update_object_constants(
            device,
            frame,
            scene,
            &self.camera,
            self.settings.lod_switch_distance,
            &mut stats,
        );
        update::update_light_constants(device, frame, scene, &self.camera, &mut stats);
        update::update_material_constants(device, frame, scene, &mut stats);
        update::update_main_pass(device, frame, &self.camera, (targets.width, targets.height), time);
        update::update_post_process(device, frame, &self.settings.post_process);

        log::trace!(
            "Frame {}: {} objects, {} lights, {} materials written; {} visible",
            self.frame_index,
            stats.objects_written,
            stats.lights_written,
            stats.materials_written,
            stats.visible
        );
        self.last_update = stats;
        self.frame_prepared = true;
        Ok(())
    }

    /// Records, submits and presents the frame prepared by `update`.
    pub fn draw(&mut self) -> Result<()> {
        if !self.frame_prepared {
            return Err(RenderError::NotReady("draw called without a preceding update"));
        }
        self.frame_prepared = false;

        match self.record_frame() {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!("Frame {} aborted: {e}", self.frame_index);
                if let Some(targets) = self.targets.as_mut() {
                    targets.gbuffer.abort_to_common(&mut self.device);
                }
                self.stages.reset();
                Err(e)
            }
        }
    }

    fn record_frame(&mut self) -> Result<()> {
        let (Some(scene), Some(ring), Some(pipelines), Some(targets)) =
            (self.scene.as_mut(), self.ring.as_mut(), self.pipelines.as_ref(), self.targets.as_mut())
        else {
            return Err(RenderError::NotReady("draw called before initialize and on_resize"));
        };
        let frame = ring.get(self.frame_index);

        self.device.begin_commands(frame.allocator)?;
        let back_buffer = self.device.back_buffer()?;
        self.device
            .resource_barrier(&[Barrier::transition(back_buffer, ResourceState::Common, ResourceState::RenderTarget)]);
        self.device.clear_color(back_buffer, self.settings.clear_color);
        self.device.clear_depth(targets.depth, 1.0);

        let nodes: [&dyn RenderNode<D>; 5] = [&ShadowPass, &GeometryPass, &LightingPass, &SkyPass, &PostProcessPass];
        let mut ctx = FrameContext {
            cmd: TrackedCommands::new(&mut self.device),
            scene,
            frame,
            gbuffer: &mut targets.gbuffer,
            pipelines,
            depth: targets.depth,
            back_buffer,
            viewport: Viewport::full(targets.width, targets.height),
        };
        for node in nodes {
            self.stages.advance(node.stage());
            ctx.cmd.push_debug_group(node.name());
            node.run(&mut ctx)?;
            ctx.cmd.pop_debug_group();
        }
        let skipped = ctx.cmd.skipped_binds();

        self.stages.advance(FrameStage::Present);
        self.device
            .resource_barrier(&[Barrier::transition(back_buffer, ResourceState::RenderTarget, ResourceState::Common)]);
        self.device.execute()?;
        self.device.present()?;

        self.current_fence += 1;
        ring.mark_submitted(self.frame_index, self.current_fence);
        self.device.signal(self.current_fence)?;
        self.stages.advance(FrameStage::Idle);

        log::trace!("Frame {} submitted (fence {}, {skipped} binds elided)", self.frame_index, self.current_fence);
        Ok(())
    }

    /// Blocks until the GPU finished everything submitted so far.
    pub fn flush(&mut self) -> Result<()> {
        if self.current_fence > self.device.completed_value() {
            self.device.wait_for_value(self.current_fence, self.settings.fence_timeout())?;
        }
        Ok(())
    }

    fn release_scene(&mut self) {
        if let Some(mut scene) = self.scene.take() {
            scene.release(&mut self.device);
        }
        if let Some(ring) = self.ring.take() {
            ring.release(&mut self.device);
        }
        self.pipelines = None;
        self.frame_prepared = false;
    }

    /// Waits for the GPU, then destroys every GPU object the renderer owns.
    /// Called by `Drop` when not called explicitly.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.flush()?;
        self.release_scene();
        if let Some(targets) = self.targets.take() {
            targets.gbuffer.release(&mut self.device);
            self.device.destroy_texture(targets.depth);
        }
        self.released = true;
        log::info!("Renderer shut down after {} frames", self.frame_index);
        Ok(())
    }

    // ========================================================================
    // Access
    // ========================================================================

    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    #[must_use]
    pub fn scene(&self) -> Option<&SceneRegistry> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut SceneRegistry> {
        self.scene.as_mut()
    }

    #[must_use]
    pub fn gbuffer(&self) -> Option<&GBuffer> {
        self.targets.as_ref().map(|t| &t.gbuffer)
    }

    #[must_use]
    pub fn frame_resources(&self) -> Option<&FrameResourceRing> {
        self.ring.as_ref()
    }

    /// Frames prepared so far.
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Fence value signaled after the last submitted frame.
    #[must_use]
    pub fn current_fence(&self) -> u64 {
        self.current_fence
    }

    #[must_use]
    pub fn last_update(&self) -> UpdateStats {
        self.last_update
    }

    #[must_use]
    pub fn stage(&self) -> FrameStage {
        self.stages.current()
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Renderer shutdown failed: {e}");
        }
    }
}
