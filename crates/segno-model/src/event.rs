//! Performance Events
//!
//! The wire vocabulary between the model and the audio engine: resolved
//! note/rest events on the played (repeat-expanded) millisecond timeline,
//! grouped per timestamp and paired with a track's static setup data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use segno_core::{ArticulationType, DynamicType, Msecs};

use crate::setup::PlaybackSetupData;

// ═══════════════════════════════════════════════════════════════════════════
// LEVELS
// ═══════════════════════════════════════════════════════════════════════════

/// Dynamic level on a fixed scale, 0 (silent) to 10000 (maximum)
pub type DynamicLevel = u16;

/// Dynamic level of an unmarked passage
pub const NATURAL_DYNAMIC_LEVEL: DynamicLevel = 5000;

/// Maximum representable dynamic level
pub const MAX_DYNAMIC_LEVEL: DynamicLevel = 10000;

/// Dynamic level corresponding to a notated dynamic marking
pub fn dynamic_level_from_type(dynamic: DynamicType) -> DynamicLevel {
    match dynamic {
        DynamicType::Ppp => 1250,
        DynamicType::Pp => 2500,
        DynamicType::P => 3750,
        DynamicType::Mp => 4500,
        DynamicType::Natural => NATURAL_DYNAMIC_LEVEL,
        DynamicType::Mf => 5500,
        DynamicType::F => 7000,
        DynamicType::Ff => 8500,
        DynamicType::Fff => 10000,
    }
}

/// Abstract pitch on a uniform semitone scale
pub type PitchLevel = u16;

/// Pitch level step for one semitone
pub const PITCH_LEVEL_STEP: PitchLevel = 50;

/// Pitch level of a MIDI pitch number
#[inline]
pub fn pitch_level_from_midi(midi_pitch: u8) -> PitchLevel {
    midi_pitch as PitchLevel * PITCH_LEVEL_STEP
}

// ═══════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// A resolved sounding note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Onset on the played timeline
    pub timestamp: Msecs,
    /// Sounding duration after articulation shaping
    pub duration: Msecs,
    pub pitch_level: PitchLevel,
    pub dynamic_level: DynamicLevel,
    /// Applied articulations; empty means standard
    pub articulations: SmallVec<[ArticulationType; 2]>,
}

/// A resolved silence, kept so consumers can distinguish "nothing sounds
/// here" from "nothing was rendered here"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestEvent {
    pub timestamp: Msecs,
    pub duration: Msecs,
}

/// One resolved performance event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    Note(NoteEvent),
    Rest(RestEvent),
}

impl PlaybackEvent {
    #[inline]
    pub fn timestamp(&self) -> Msecs {
        match self {
            PlaybackEvent::Note(note) => note.timestamp,
            PlaybackEvent::Rest(rest) => rest.timestamp,
        }
    }
}

/// Events sharing one onset timestamp (a chord renders as several)
pub type PlaybackEventList = Vec<PlaybackEvent>;

/// Per-track event stream, ordered by played-timeline timestamp
pub type PlaybackEventsMap = BTreeMap<Msecs, PlaybackEventList>;

// ═══════════════════════════════════════════════════════════════════════════
// PLAYBACK DATA
// ═══════════════════════════════════════════════════════════════════════════

/// Everything the engine needs for one track: static sound setup plus the
/// resolved event stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackData {
    pub setup: Option<PlaybackSetupData>,
    pub events: PlaybackEventsMap,
}

impl PlaybackData {
    /// Data is usable by the engine only with resolved, valid setup
    pub fn is_valid(&self) -> bool {
        self.setup.as_ref().is_some_and(|setup| setup.is_valid())
    }

    /// Events at one timestamp, if any were rendered there
    pub fn event_list(&self, timestamp: Msecs) -> Option<&PlaybackEventList> {
        self.events.get(&timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_levels_monotonic() {
        let order = [
            DynamicType::Ppp,
            DynamicType::Pp,
            DynamicType::P,
            DynamicType::Mp,
            DynamicType::Natural,
            DynamicType::Mf,
            DynamicType::F,
            DynamicType::Ff,
            DynamicType::Fff,
        ];

        for pair in order.windows(2) {
            assert!(
                dynamic_level_from_type(pair[0]) < dynamic_level_from_type(pair[1]),
                "levels must grow from {:?} to {:?}",
                pair[0],
                pair[1]
            );
        }

        assert_eq!(dynamic_level_from_type(DynamicType::Fff), MAX_DYNAMIC_LEVEL);
    }

    #[test]
    fn test_playback_data_validity() {
        let mut data = PlaybackData::default();
        assert!(!data.is_valid(), "data without setup must be invalid");

        data.setup = Some(crate::SetupDataResolver::metronome());
        assert!(data.is_valid());
    }
}
