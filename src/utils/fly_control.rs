use crate::renderer::settings::CameraSettings;
use crate::scene::camera::Camera;

use super::input::{Input, Key, MouseButton};

/// First-person controls: W/S walk, A/D strafe, left-drag looks around.
#[derive(Debug, Clone, Copy)]
pub struct FlyControls {
    /// World units per second.
    pub move_speed: f32,
    /// Degrees of rotation per pixel of mouse drag.
    pub look_degrees_per_pixel: f32,
}

impl Default for FlyControls {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default())
    }
}

impl FlyControls {
    #[must_use]
    pub fn from_settings(settings: &CameraSettings) -> Self {
        Self {
            move_speed: settings.move_speed,
            look_degrees_per_pixel: settings.look_degrees_per_pixel,
        }
    }

    /// Applies one frame of input and rebuilds the view matrix.
    pub fn update(&self, camera: &mut Camera, input: &Input, dt: f32) {
        if input.is_button_pressed(MouseButton::Left) && input.cursor_delta != glam::Vec2::ZERO {
            let dx = (self.look_degrees_per_pixel * input.cursor_delta.x).to_radians();
            let dy = (self.look_degrees_per_pixel * input.cursor_delta.y).to_radians();
            camera.pitch(dy);
            camera.rotate_y(dx);
        }

        let step = self.move_speed * dt;
        let axis = |pos: Key, neg: Key| {
            f32::from(u8::from(input.is_key_pressed(pos))) - f32::from(u8::from(input.is_key_pressed(neg)))
        };
        let forward = axis(Key::W, Key::S);
        let sideways = axis(Key::D, Key::A);
        if forward != 0.0 {
            camera.walk(forward * step);
        }
        if sideways != 0.0 {
            camera.strafe(sideways * step);
        }

        camera.update_view_matrix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn w_walks_forward_at_move_speed() {
        let mut camera = Camera::new();
        let mut input = Input::new();
        input.handle_key(Key::W, true);
        FlyControls::default().update(&mut camera, &input, 0.5);
        assert!((camera.position() - Vec3::new(0.0, 0.0, 15.0)).length() < 1e-4);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut camera = Camera::new();
        let mut input = Input::new();
        input.handle_key(Key::A, true);
        input.handle_key(Key::D, true);
        FlyControls::default().update(&mut camera, &input, 1.0);
        assert!(camera.position().length() < 1e-6);
    }

    #[test]
    fn drag_without_button_does_not_rotate() {
        let mut camera = Camera::new();
        let mut input = Input::new();
        input.handle_cursor_move(10.0, 10.0);
        input.handle_cursor_move(110.0, 10.0);
        FlyControls::default().update(&mut camera, &input, 0.0);
        assert!((camera.look() - Vec3::Z).length() < 1e-6);

        input.handle_mouse_button(MouseButton::Left, true);
        FlyControls::default().update(&mut camera, &input, 0.0);
        // 100 px * 0.25 deg = 25 deg around +Y
        let expected = 25.0_f32.to_radians();
        assert!((camera.look().x - expected.sin()).abs() < 1e-4);
    }
}
