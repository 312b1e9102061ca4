//! Deferred Scene Demo
//!
//! Opens a window and renders the reference scene: a sky box, a textured
//! floor, an 11×11 grid of spheres sweeping roughness and metalness, and
//! three lights (directional, spot, point) with shadows.
//!
//! Controls: W/A/S/D to move, drag with the left mouse button to look.
//!
//! ```text
//! cargo run --example deferred_scene --features demo [settings.json]
//! ```

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use penumbra::primitives::{SphereOptions, create_box, create_quad, create_sphere};
use penumbra::scene::Material;
use penumbra::utils::FrameStats;
use penumbra::{
    EnvironmentDesc, FlyControls, ImageData, Input, ItemDesc, Key, LightDesc, MaterialDesc, MouseButton,
    RenderError, RenderLayer, Renderer, RendererSettings, SceneDescription, Timer, WgpuDevice,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

const TITLE: &str = "Penumbra - Deferred Scene";
const SPHERE_GRID: u32 = 11;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => RendererSettings::load(path)?,
        None => RendererSettings::default(),
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = DemoRunner::new(settings);
    event_loop.run_app(&mut runner)?;
    Ok(())
}

// ============================================================================
// Scene
// ============================================================================

/// Square checker texture, `cells` squares per side.
fn checker(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> ImageData {
    let cell = (size / cells).max(1);
    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = ((x / cell) + (y / cell)) % 2 == 0;
            texels.extend_from_slice(if even { &a } else { &b });
        }
    }
    ImageData { width: size, height: size, layers: 1, texels }
}

/// Sky cube map fading from horizon haze to zenith blue.
fn sky_gradient(size: u32) -> ImageData {
    let horizon = Vec3::new(0.85, 0.88, 0.92);
    let zenith = Vec3::new(0.25, 0.45, 0.80);
    let ground = Vec3::new(0.35, 0.33, 0.30);

    let mut texels = Vec::with_capacity((size * size * 4 * 6) as usize);
    for face in 0..6 {
        for y in 0..size {
            for x in 0..size {
                let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
                let dir = match face {
                    0 => Vec3::new(1.0, -v, -u),
                    1 => Vec3::new(-1.0, -v, u),
                    2 => Vec3::new(u, 1.0, v),
                    3 => Vec3::new(u, -1.0, -v),
                    4 => Vec3::new(u, -v, 1.0),
                    _ => Vec3::new(-u, -v, -1.0),
                }
                .normalize();
                let color = if dir.y >= 0.0 {
                    horizon.lerp(zenith, dir.y.powf(0.6))
                } else {
                    horizon.lerp(ground, (-dir.y).powf(0.4))
                };
                let c = (color * 255.0).round();
                texels.extend_from_slice(&[c.x as u8, c.y as u8, c.z as u8, 255]);
            }
        }
    }
    ImageData { width: size, height: size, layers: 6, texels }
}

/// Split-sum lookup table approximation: red is the Fresnel scale, green
/// the bias, indexed by (N·V, roughness).
fn brdf_table(size: u32) -> ImageData {
    let mut texels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let fresnel = (1.0 - n_dot_v).powi(5);
            let scale = (1.0 - fresnel) * (1.0 - 0.5 * roughness);
            let bias = fresnel * (1.0 - roughness);
            texels.extend_from_slice(&[(scale * 255.0) as u8, (bias * 255.0) as u8, 0, 255]);
        }
    }
    ImageData { width: size, height: size, layers: 1, texels }
}

fn build_scene() -> SceneDescription {
    let mut scene = SceneDescription::new();

    scene
        .add_texture("bricks", checker(128, 8, [168, 92, 72, 255], [122, 64, 52, 255]))
        .add_texture("tiles", checker(128, 16, [200, 200, 196, 255], [90, 90, 96, 255]))
        .add_texture("flat_normal", ImageData::solid([128, 128, 255, 255]))
        .add_texture("sky", sky_gradient(64))
        .add_texture("irradiance", ImageData::solid_cube([110, 120, 140, 255]))
        .add_texture("brdf", brdf_table(32))
        .set_environment(EnvironmentDesc {
            sky_diffuse: "sky".to_string(),
            sky_irradiance: "irradiance".to_string(),
            brdf: "brdf".to_string(),
        });

    scene.add_geometry(
        "shapes",
        vec![
            create_box("box", 1.0, 1.0, 1.0),
            create_sphere("sphere", &SphereOptions::default()),
            create_sphere("coarse_sphere", &SphereOptions { slices: 8, stacks: 8, ..SphereOptions::default() }),
            create_quad("quad", 0.5, 0.0, 0.5, 0.5, 0.0),
        ],
    );

    // Materials
    let mut bricks = Material::new("bricks0");
    bricks.fresnel_r0 = Vec3::splat(0.02);
    bricks.roughness = 0.1;
    scene.add_material(MaterialDesc::new(bricks).diffuse("bricks"));

    let mut floor = Material::new("tiles0");
    floor.fresnel_r0 = Vec3::splat(0.02);
    floor.roughness = 0.3;
    scene.add_material(MaterialDesc::new(floor).diffuse("tiles"));

    let mut statue = Material::new("statue");
    statue.diffuse_albedo = Vec4::new(0.8, 0.75, 0.6, 1.0);
    statue.fresnel_r0 = Vec3::splat(0.05);
    statue.roughness = 0.3;
    scene.add_material(MaterialDesc::new(statue).normal("flat_normal"));

    let mut sky = Material::new("sky");
    sky.fresnel_r0 = Vec3::splat(0.1);
    sky.roughness = 1.0;
    scene.add_material(MaterialDesc::new(sky).diffuse("sky"));

    for i in 0..SPHERE_GRID {
        for j in 0..SPHERE_GRID {
            let mut sphere = Material::new(format!("sphere_{i}_{j}"));
            sphere.fresnel_r0 = Vec3::splat(0.05);
            sphere.roughness = j as f32 / 10.0;
            sphere.metallic = i as f32 / 10.0;
            scene.add_material(MaterialDesc::new(sphere));
        }
    }

    // Render items
    scene
        .add_item(ItemDesc::new("shapes", "box", "sky").scaled(5000.0).in_layer(RenderLayer::Sky))
        .add_item(ItemDesc::new("shapes", "quad", "bricks0").in_layer(RenderLayer::Debug))
        .add_item(ItemDesc::new("shapes", "box", "bricks0").translated(Vec3::new(15.0, 0.0, 0.0)).scaled(8.0))
        .add_item(
            ItemDesc::new("shapes", "box", "tiles0")
                .transformed(
                    Mat4::from_translation(Vec3::new(0.0, -5.0, 10.0)) * Mat4::from_scale(Vec3::new(500.0, 1.0, 500.0)),
                )
                .tex_scaled(10.0),
        )
        .add_item(ItemDesc::new("shapes", "sphere", "statue").translated(Vec3::new(40.0, 5.0, -60.0)).scaled(10.0));

    for position in [Vec3::new(0.0, -5.0, 20.0), Vec3::new(-30.0, -5.0, 40.0), Vec3::new(30.0, -5.0, 0.0)] {
        scene.add_item(
            ItemDesc::new("shapes", "sphere", "statue")
                .translated(position + Vec3::Y * 6.0)
                .scaled(6.0)
                .with_lods(["sphere", "coarse_sphere"]),
        );
    }

    for i in 0..SPHERE_GRID {
        for j in 0..SPHERE_GRID {
            let position = Vec3::new(i as f32 * 7.0 - 80.0, 0.0, j as f32 * 7.0 - 80.0);
            scene.add_item(ItemDesc::new("shapes", "sphere", format!("sphere_{i}_{j}")).translated(position).scaled(3.0));
        }
    }

    // Lights
    scene
        .add_light(LightDesc::directional(Vec3::new(0.57735, -0.57735, 0.57735), Vec3::ONE))
        .add_light(
            LightDesc::spot(Vec3::new(0.0, 50.0, -10.0), Vec3::new(-0.57735, -0.57735, 0.57735), Vec3::splat(10.0))
                .with_falloff(1.0, 150.0)
                .with_spot_power(100.0),
        )
        .add_light(LightDesc::point(Vec3::new(-10.0, 1.0, 0.0), Vec3::splat(2.0)));

    scene
}

// ============================================================================
// Runner
// ============================================================================

fn translate_key(key: PhysicalKey) -> Option<Key> {
    match key {
        PhysicalKey::Code(KeyCode::KeyW) => Some(Key::W),
        PhysicalKey::Code(KeyCode::KeyA) => Some(Key::A),
        PhysicalKey::Code(KeyCode::KeyS) => Some(Key::S),
        PhysicalKey::Code(KeyCode::KeyD) => Some(Key::D),
        _ => None,
    }
}

fn translate_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        winit::event::MouseButton::Middle => Some(MouseButton::Middle),
        _ => None,
    }
}

struct DemoRunner {
    settings: RendererSettings,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer<WgpuDevice>>,
    controls: FlyControls,
    input: Input,
    timer: Timer,
    stats: FrameStats,
}

impl DemoRunner {
    fn new(settings: RendererSettings) -> Self {
        Self {
            controls: FlyControls::from_settings(&settings.camera),
            settings,
            window: None,
            renderer: None,
            input: Input::new(),
            timer: Timer::new(),
            stats: FrameStats::new(),
        }
    }

    fn init_renderer(&self, window: Arc<Window>) -> penumbra::Result<Renderer<WgpuDevice>> {
        let size = window.inner_size();
        let device = WgpuDevice::new(window, size.width, size.height, self.settings.vsync)?;
        let mut renderer = Renderer::new(device, self.settings.clone())?;
        renderer.initialize(&build_scene())?;
        renderer.on_resize(size.width, size.height)?;
        renderer.camera_mut().look_at(Vec3::new(-30.0, 70.0, -20.0), Vec3::new(0.0, 0.0, 20.0), Vec3::Y);
        Ok(renderer)
    }

    fn render_frame(&mut self) -> penumbra::Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        self.timer.tick();
        self.controls.update(renderer.camera_mut(), &self.input, self.timer.dt_seconds());
        renderer.update(self.timer.frame_time())?;
        renderer.draw()?;
        self.input.end_frame();

        if let Some(sample) = self.stats.record(self.timer.dt_seconds())
            && let Some(window) = &self.window
        {
            window.set_title(&format!("{TITLE} | {:.0} fps ({:.2} ms)", sample.fps, sample.frame_ms));
        }
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take()
            && let Err(e) = renderer.shutdown()
        {
            log::error!("Shutdown failed: {e}");
        }
        event_loop.exit();
    }

    fn report(&mut self, event_loop: &ActiveEventLoop, error: &RenderError) {
        if error.is_device_failure() {
            log::error!("Fatal GPU error: {error}");
            self.shutdown(event_loop);
        } else {
            log::warn!("Frame skipped: {error}");
        }
    }
}

impl ApplicationHandler for DemoRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        log::info!("Initializing renderer...");
        match self.init_renderer(window.clone()) {
            Ok(renderer) => {
                let size = window.inner_size();
                self.input.handle_resize(size.width, size.height);
                self.renderer = Some(renderer);
                self.timer = Timer::new();
            }
            Err(e) => {
                log::error!("Fatal renderer error: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::Resized(size) => {
                self.input.handle_resize(size.width, size.height);
                // Minimized
                if size.width == 0 || size.height == 0 {
                    return;
                }
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.on_resize(size.width, size.height)
                {
                    self.report(event_loop, &e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(key) = translate_key(event.physical_key) {
                    self.input.handle_key(key, event.state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = translate_button(button) {
                    self.input.handle_mouse_button(button, state == ElementState::Pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.handle_cursor_move(position.x as f32, position.y as f32);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    self.report(event_loop, &e);
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.renderer.is_some()
            && let Some(window) = &self.window
        {
            window.request_redraw();
        }
    }
}
