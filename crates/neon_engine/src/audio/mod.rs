//! Audio cue forwarding
//!
//! The engine does not mix or play audio. Cue ids returned in a frame snapshot
//! are classified by the producer and handed to an [`AudioSink`] after the
//! frame is submitted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// How a cue is played back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    /// Background track, loops until replaced
    Music,
    /// One-shot sound effect
    Effect,
}

/// A cue to trigger this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioCue {
    /// Producer-defined cue id
    pub id: u32,
    /// Playback category
    pub category: AudioCategory,
}

impl AudioCue {
    /// Create a cue
    pub const fn new(id: u32, category: AudioCategory) -> Self {
        Self { id, category }
    }
}

/// Downstream audio collaborator
pub trait AudioSink {
    /// Trigger a cue
    fn play(&mut self, cue: AudioCue);

    /// Called once after every frame's cues have been forwarded
    fn end_frame(&mut self) {}
}

/// Sink that discards every cue
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn play(&mut self, _cue: AudioCue) {}
}

/// Sink that logs cues and tracks the voices a mixer would need
///
/// Music replaces the current track; effects beyond `max_effect_voices` in a
/// single frame are dropped with a warning.
#[derive(Debug)]
pub struct LoggingAudioSink {
    max_effect_voices: usize,
    current_music: Option<u32>,
    effects_this_frame: usize,
    dropped: u64,
    played: BTreeSet<u32>,
}

impl LoggingAudioSink {
    /// Default per-frame effect voice budget
    pub const DEFAULT_EFFECT_VOICES: usize = 10;

    /// Create a sink with the given per-frame effect budget
    pub fn new(max_effect_voices: usize) -> Self {
        Self {
            max_effect_voices,
            current_music: None,
            effects_this_frame: 0,
            dropped: 0,
            played: BTreeSet::new(),
        }
    }

    /// Track currently looping
    pub fn current_music(&self) -> Option<u32> {
        self.current_music
    }

    /// Effects dropped over budget so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Distinct cue ids played so far
    pub fn played(&self) -> impl Iterator<Item = u32> + '_ {
        self.played.iter().copied()
    }
}

impl Default for LoggingAudioSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EFFECT_VOICES)
    }
}

impl AudioSink for LoggingAudioSink {
    fn play(&mut self, cue: AudioCue) {
        match cue.category {
            AudioCategory::Music => {
                if self.current_music != Some(cue.id) {
                    log::info!("Music track {} started", cue.id);
                    self.current_music = Some(cue.id);
                }
            }
            AudioCategory::Effect => {
                if self.effects_this_frame >= self.max_effect_voices {
                    self.dropped += 1;
                    log::warn!("Dropping effect {}: {} voices busy", cue.id, self.max_effect_voices);
                    return;
                }
                self.effects_this_frame += 1;
                log::debug!("Effect {} triggered", cue.id);
            }
        }
        self.played.insert(cue.id);
    }

    fn end_frame(&mut self) {
        self.effects_this_frame = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_replaces_current_track() {
        let mut sink = LoggingAudioSink::default();
        sink.play(AudioCue::new(1, AudioCategory::Music));
        sink.play(AudioCue::new(2, AudioCategory::Music));

        assert_eq!(sink.current_music(), Some(2));
        assert_eq!(sink.played().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_effect_budget_resets_each_frame() {
        let mut sink = LoggingAudioSink::new(2);
        for id in 0..3 {
            sink.play(AudioCue::new(id, AudioCategory::Effect));
        }
        assert_eq!(sink.dropped(), 1);

        sink.end_frame();
        sink.play(AudioCue::new(7, AudioCategory::Effect));
        assert_eq!(sink.dropped(), 1);
        assert_eq!(sink.current_music(), None);
    }
}
