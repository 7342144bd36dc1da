//! Input forwarding
//!
//! The window layer samples raw input once per frame into an [`InputState`];
//! the pipeline forwards it to the producer before asking for the frame.

use crate::foundation::math::Vec2;
use crate::render::api::producer::FrameProducer;

/// Input sampled for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    /// Cursor position in normalized device range
    pub cursor: Vec2,
    /// Movement direction (e.g. WASD), not necessarily normalized
    pub move_direction: Vec2,
    /// Primary mouse button edges since the last sample, oldest first
    ///
    /// `true` is a press and `false` a release. A click that starts and ends
    /// between two samples shows up as both entries.
    pub mouse_events: Vec<bool>,
    /// Key codes pressed since the last sample
    pub keys_pressed: Vec<i32>,
}

/// Per-frame input provider, implemented by the window layer
pub trait InputSource {
    /// Sample the current input state
    fn sample(&mut self) -> InputState;
}

/// Source that never reports any input
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn sample(&mut self) -> InputState {
        InputState::default()
    }
}

/// Push one frame's input into the producer
///
/// The cursor is clamped to `[-1, 1]`. Mouse edges and key presses are
/// forwarded one call each, in the order the window reported them.
pub fn forward_input<P: FrameProducer + ?Sized>(state: &InputState, producer: &mut P) {
    producer.update_cursor_position(clamp_cursor(state.cursor));
    producer.update_move_direction(state.move_direction);

    for &is_down in &state.mouse_events {
        producer.update_mouse_button(is_down);
    }

    for &key in &state.keys_pressed {
        producer.update_key_pressed(key);
    }
}

/// Clamp both axes into `[-1, 1]`
pub fn clamp_cursor(cursor: Vec2) -> Vec2 {
    Vec2::new(cursor.x.clamp(-1.0, 1.0), cursor.y.clamp(-1.0, 1.0))
}

/// Convert a window-space cursor position in pixels to `[-1, 1]`
///
/// Window coordinates grow downwards; with `flip_y` the result has +Y up.
pub fn normalize_cursor(x: f64, y: f64, width: u32, height: u32, flip_y: bool) -> Vec2 {
    if width == 0 || height == 0 {
        return Vec2::zeros();
    }
    let nx = (x / f64::from(width)) * 2.0 - 1.0;
    let ny = (y / f64::from(height)) * 2.0 - 1.0;
    let ny = if flip_y { -ny } else { ny };
    clamp_cursor(Vec2::new(nx as f32, ny as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::frame_data::{FrameSnapshot, GlobalUniforms};
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct Recorder {
        cursor: Vec<Vec2>,
        mouse: Vec<bool>,
        keys: Vec<i32>,
    }

    impl FrameProducer for Recorder {
        fn render_frame(&mut self, _aspect_ratio: f32) -> FrameSnapshot<'_> {
            FrameSnapshot::empty(GlobalUniforms::default(), [0.0; 3])
        }

        fn update_cursor_position(&mut self, position: Vec2) {
            self.cursor.push(position);
        }

        fn update_move_direction(&mut self, _direction: Vec2) {}

        fn update_mouse_button(&mut self, is_down: bool) {
            self.mouse.push(is_down);
        }

        fn update_key_pressed(&mut self, key_code: i32) {
            self.keys.push(key_code);
        }
    }

    #[test]
    fn test_mouse_edges_forwarded_in_order() {
        let mut producer = Recorder::default();

        // Press and release both landed between two samples
        let quick_click = InputState {
            mouse_events: vec![true, false],
            ..InputState::default()
        };
        forward_input(&quick_click, &mut producer);
        forward_input(&InputState::default(), &mut producer);
        let held = InputState {
            mouse_events: vec![true],
            ..InputState::default()
        };
        forward_input(&held, &mut producer);

        assert_eq!(producer.mouse, vec![true, false, true]);
        assert_eq!(producer.cursor.len(), 3);
    }

    #[test]
    fn test_cursor_clamped_and_keys_forwarded() {
        let mut producer = Recorder::default();
        let state = InputState {
            cursor: Vec2::new(3.0, -0.5),
            keys_pressed: vec![32, 256],
            ..InputState::default()
        };

        forward_input(&state, &mut producer);

        assert_eq!(producer.cursor, vec![Vec2::new(1.0, -0.5)]);
        assert_eq!(producer.keys, vec![32, 256]);
    }

    #[test]
    fn test_normalize_cursor() {
        let center = normalize_cursor(400.0, 300.0, 800, 600, true);
        assert_relative_eq!(center, Vec2::zeros());

        let top_left = normalize_cursor(0.0, 0.0, 800, 600, true);
        assert_relative_eq!(top_left, Vec2::new(-1.0, 1.0));

        let unflipped = normalize_cursor(0.0, 0.0, 800, 600, false);
        assert_relative_eq!(unflipped, Vec2::new(-1.0, -1.0));

        assert_eq!(normalize_cursor(5.0, 5.0, 0, 600, true), Vec2::zeros());
    }
}
