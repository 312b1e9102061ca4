use glam::Vec2;
use rustc_hash::FxHashSet;

/// Keys the fly camera reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Windowing-agnostic input state for one frame.
///
/// The shell feeds raw events in; controllers read the accumulated state and
/// the shell calls [`Input::end_frame`] once the frame is done.
#[derive(Default, Debug, Clone)]
pub struct Input {
    /// Cursor position in window pixels
    pub cursor_position: Option<Vec2>,
    /// Cursor movement accumulated this frame
    pub cursor_delta: Vec2,
    pub screen_size: Vec2,
    keys: FxHashSet<Key>,
    mouse_buttons: FxHashSet<MouseButton>,
}

impl Input {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame deltas.
    pub fn end_frame(&mut self) {
        self.cursor_delta = Vec2::ZERO;
    }

    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.screen_size = Vec2::new(width as f32, height as f32);
    }

    pub fn handle_cursor_move(&mut self, x: f32, y: f32) {
        let new_pos = Vec2::new(x, y);
        // The first event only establishes the reference point.
        if let Some(old) = self.cursor_position {
            self.cursor_delta += new_pos - old;
        }
        self.cursor_position = Some(new_pos);
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.mouse_buttons.insert(button);
        } else {
            self.mouse_buttons.remove(&button);
        }
    }

    pub fn handle_key(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.keys.insert(key);
        } else {
            self.keys.remove(&key);
        }
    }

    #[must_use]
    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    #[must_use]
    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.keys.contains(&key)
    }
}
