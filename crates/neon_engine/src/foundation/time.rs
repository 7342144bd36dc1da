//! Frame timing utilities

use std::time::{Duration, Instant};

/// Paces the frame loop to a target frame rate
///
/// The pacer only ever sleeps the remainder of the current interval; a frame
/// that overruns its budget starts the next interval immediately instead of
/// trying to catch up.
#[derive(Debug)]
pub struct FramePacer {
    interval: Option<Duration>,
    frame_start: Instant,
}

impl FramePacer {
    /// Create a pacer for the given target; `None` disables pacing
    pub fn new(target_fps: Option<u32>) -> Self {
        Self {
            interval: Self::interval_for(target_fps),
            frame_start: Instant::now(),
        }
    }

    /// Frame interval for a target rate
    pub fn interval_for(target_fps: Option<u32>) -> Option<Duration> {
        match target_fps {
            Some(fps) if fps > 0 => Some(Duration::from_secs(1) / fps),
            _ => None,
        }
    }

    /// Target interval, if pacing is enabled
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Time left in the current interval at `now`
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.interval
            .map(|interval| interval.saturating_sub(now.saturating_duration_since(self.frame_start)))
            .unwrap_or(Duration::ZERO)
    }

    /// Sleep out the rest of the interval and start the next one
    ///
    /// Returns the time spent sleeping.
    pub fn wait_for_next_frame(&mut self) -> Duration {
        let remaining = self.remaining_at(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.frame_start = Instant::now();
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_for_sixty_fps() {
        let interval = FramePacer::interval_for(Some(60)).unwrap();
        assert_eq!(interval.as_micros(), 16_666);
    }

    #[test]
    fn test_disabled_pacer_never_sleeps() {
        let mut pacer = FramePacer::new(None);
        assert!(pacer.interval().is_none());
        assert_eq!(pacer.wait_for_next_frame(), Duration::ZERO);

        assert!(FramePacer::new(Some(0)).interval().is_none());
    }

    #[test]
    fn test_remaining_shrinks_and_saturates() {
        let pacer = FramePacer::new(Some(10));
        let start = pacer.frame_start;

        assert_eq!(pacer.remaining_at(start), Duration::from_millis(100));
        assert_eq!(pacer.remaining_at(start + Duration::from_millis(40)), Duration::from_millis(60));
        assert_eq!(pacer.remaining_at(start + Duration::from_millis(250)), Duration::ZERO);
    }
}
