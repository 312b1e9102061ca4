//! Utility Module
//!
//! - [`FlyControls`]: keyboard / mouse fly camera controller
//! - [`Input`]: windowing-agnostic input state fed by the application shell
//! - [`FrameStats`]: once-per-second frame rate averaging
//! - [`time`]: frame timer and the [`FrameTime`] snapshot passed to `update`

pub mod fly_control;
pub mod frame_stats;
pub mod input;
pub mod time;

pub use fly_control::FlyControls;
pub use frame_stats::{FrameStats, FrameStatsSample};
pub use input::{Input, Key, MouseButton};
pub use time::{FrameTime, Timer};
