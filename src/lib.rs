#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod errors;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod utils;

pub use errors::{RenderError, Result};
pub use gpu::GpuDevice;
pub use gpu::recording::RecordingDevice;
#[cfg(feature = "wgpu-backend")]
pub use gpu::wgpu_backend::WgpuDevice;
pub use renderer::Renderer;
pub use renderer::settings::{CameraSettings, PostProcessSettings, RendererSettings, ShaderSettings};
pub use scene::{
    Camera, EnvironmentDesc, ImageData, ItemDesc, LightDesc, LightType, MaterialDesc, MeshData, RenderLayer,
    SceneDescription, Vertex,
};
pub use scene::primitives;
pub use utils::{FlyControls, FrameTime, Input, Key, MouseButton, Timer};
