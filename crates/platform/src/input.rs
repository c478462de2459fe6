//! Keyboard input tracking.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Tracks the current state of keyboard input.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    /// Handle a key press event.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    /// Handle a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Check if a key is currently pressed.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Check if a key was just pressed this frame.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_only_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        assert!(input.is_key_pressed(KeyCode::Escape));
        assert!(input.is_key_just_pressed(KeyCode::Escape));

        input.begin_frame();
        // Held key is still pressed but no longer "just pressed"
        assert!(input.is_key_pressed(KeyCode::Escape));
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_release_clears_pressed() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }
}
