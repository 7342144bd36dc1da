//! Frame data producer interface
//!
//! The game/simulation side of the engine. The pipeline calls into it once per
//! frame from the frame-production thread and never retains the snapshot past
//! the frame's writes.

use crate::audio::AudioCategory;
use crate::foundation::math::Vec2;
use crate::render::api::frame_data::FrameSnapshot;

/// Supplies one complete frame description per call
///
/// Input updates for a frame always arrive before `render_frame` for that
/// frame.
pub trait FrameProducer {
    /// Startup hook, invoked once before the first frame
    fn start(&mut self) {}

    /// Advance the simulation and describe the next frame
    ///
    /// The returned snapshot borrows from the producer; its slices stay valid
    /// until the producer is called again.
    fn render_frame(&mut self, aspect_ratio: f32) -> FrameSnapshot<'_>;

    /// Cursor position in normalized device range, both axes in `[-1, 1]`
    fn update_cursor_position(&mut self, position: Vec2);

    /// Movement direction from the keyboard/gamepad
    fn update_move_direction(&mut self, direction: Vec2);

    /// Primary mouse button changed state
    ///
    /// Only called on press/release edges.
    fn update_mouse_button(&mut self, is_down: bool);

    /// A key was pressed this frame
    fn update_key_pressed(&mut self, key_code: i32);

    /// Playback category of an audio cue id
    fn audio_category(&self, _cue: u32) -> AudioCategory {
        AudioCategory::Effect
    }

    /// Whether the producer wants the loop to stop
    fn should_quit(&self) -> bool {
        false
    }
}
