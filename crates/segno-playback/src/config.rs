//! Playback configuration settings consulted by controller toggles

use serde::{Deserialize, Serialize};

/// In-memory playback settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Expand repeat structures into the played timeline
    pub play_repeats: bool,
    /// Sound the synthesized metronome track
    pub metronome_enabled: bool,
    /// Audition notes while editing
    pub play_notes_when_editing: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            play_repeats: true,
            metronome_enabled: false,
            play_notes_when_editing: true,
        }
    }
}
