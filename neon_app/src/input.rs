//! Window events folded into per-frame input samples

use glfw::{Action, Key, MouseButton, WindowEvent};
use neon_engine::foundation::math::Vec2;
use neon_engine::input::{normalize_cursor, InputSource, InputState};

/// Accumulates GLFW events between frames
///
/// Cursor positions arrive in screen coordinates, so they are normalized
/// against the window size rather than the framebuffer, which differs on
/// HiDPI displays.
#[derive(Debug, Default)]
pub struct WindowInput {
    cursor: (f64, f64),
    window_size: (u32, u32),
    mouse_events: Vec<bool>,
    held: [bool; 4],
    keys_pressed: Vec<i32>,
}

impl WindowInput {
    pub fn new(window_size: (u32, u32)) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::CursorPos(x, y) => self.cursor = (x, y),
            WindowEvent::Size(width, height) => {
                self.window_size = (width.max(0) as u32, height.max(0) as u32);
            }
            WindowEvent::MouseButton(MouseButton::Button1, action, _) => match action {
                Action::Press => self.mouse_events.push(true),
                Action::Release => self.mouse_events.push(false),
                Action::Repeat => {}
            },
            WindowEvent::Key(key, _, action, _) => {
                if let Some(index) = movement_index(key) {
                    self.held[index] = action != Action::Release;
                }
                if action == Action::Press {
                    self.keys_pressed.push(key as i32);
                }
            }
            _ => {}
        }
    }
}

fn movement_index(key: Key) -> Option<usize> {
    match key {
        Key::W | Key::Up => Some(0),
        Key::S | Key::Down => Some(1),
        Key::A | Key::Left => Some(2),
        Key::D | Key::Right => Some(3),
        _ => None,
    }
}

impl InputSource for WindowInput {
    fn sample(&mut self) -> InputState {
        let [up, down, left, right] = self.held.map(|held| if held { 1.0 } else { 0.0 });
        let (width, height) = self.window_size;
        InputState {
            cursor: normalize_cursor(self.cursor.0, self.cursor.1, width, height, true),
            move_direction: Vec2::new(right - left, up - down),
            mouse_events: std::mem::take(&mut self.mouse_events),
            keys_pressed: std::mem::take(&mut self.keys_pressed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::Modifiers;

    #[test]
    fn test_cursor_normalized_in_screen_coordinates() {
        let mut input = WindowInput::new((1280, 720));

        // A 2x display reports a 2560x1440 framebuffer for the same window
        input.handle_event(&WindowEvent::FramebufferSize(2560, 1440));
        input.handle_event(&WindowEvent::CursorPos(640.0, 360.0));

        assert_eq!(input.sample().cursor, Vec2::zeros());

        input.handle_event(&WindowEvent::Size(640, 360));
        input.handle_event(&WindowEvent::CursorPos(640.0, 0.0));
        assert_eq!(input.sample().cursor, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_click_between_samples_is_kept() {
        let mut input = WindowInput::new((800, 600));

        input.handle_event(&WindowEvent::MouseButton(MouseButton::Button1, Action::Press, Modifiers::empty()));
        input.handle_event(&WindowEvent::MouseButton(MouseButton::Button1, Action::Release, Modifiers::empty()));
        input.handle_event(&WindowEvent::MouseButton(MouseButton::Button2, Action::Press, Modifiers::empty()));

        assert_eq!(input.sample().mouse_events, vec![true, false]);
        assert!(input.sample().mouse_events.is_empty());
    }

    #[test]
    fn test_movement_and_key_presses() {
        let mut input = WindowInput::new((800, 600));

        input.handle_event(&WindowEvent::Key(Key::W, 17, Action::Press, Modifiers::empty()));
        input.handle_event(&WindowEvent::Key(Key::D, 32, Action::Press, Modifiers::empty()));
        input.handle_event(&WindowEvent::Key(Key::D, 32, Action::Release, Modifiers::empty()));

        let state = input.sample();
        assert_eq!(state.move_direction, Vec2::new(0.0, 1.0));
        assert_eq!(state.keys_pressed, vec![Key::W as i32, Key::D as i32]);
        assert!(input.sample().keys_pressed.is_empty());
    }
}
