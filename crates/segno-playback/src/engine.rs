//! Audio Engine Interface
//!
//! The narrow collaborator surface the controller drives. Every mutating
//! call is fire-and-forget; outcomes and engine-side state changes come
//! back as `EngineEvent`s on the push channel and are handled on the
//! controller's processing pass. Track additions resolve asynchronously
//! through `TrackAddResolved`.

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use segno_core::{Msecs, TrackId, TrackSequenceId};
use segno_model::PlaybackData;

// ═══════════════════════════════════════════════════════════════════════════
// PARAMS
// ═══════════════════════════════════════════════════════════════════════════

/// Engine-assigned identifier for one asynchronous request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Playback transport state of one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Paused,
    Running,
}

/// Per-track audio input configuration (which sound resource plays it)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioInputParams {
    pub resource_id: String,
}

/// Per-track audio output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputParams {
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
}

impl Default for AudioOutputParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            muted: false,
        }
    }
}

/// Combined track parameters exchanged on track creation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioParams {
    pub input: AudioInputParams,
    pub output: AudioOutputParams,
}

/// Engine-supplied rejection for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRejection {
    pub code: i32,
    pub message: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Push notifications from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PositionChanged {
        seq: TrackSequenceId,
        msecs: Msecs,
    },
    StatusChanged {
        seq: TrackSequenceId,
        status: PlaybackStatus,
    },
    /// Asynchronous outcome of `add_track`
    TrackAddResolved {
        request: RequestId,
        seq: TrackSequenceId,
        result: Result<(TrackId, AudioParams), EngineRejection>,
    },
    InputParamsChanged {
        seq: TrackSequenceId,
        track: TrackId,
        params: AudioInputParams,
    },
    OutputParamsChanged {
        seq: TrackSequenceId,
        track: TrackId,
        params: AudioOutputParams,
    },
    MasterOutputParamsChanged {
        params: AudioOutputParams,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// The audio engine as seen by the playback controller
pub trait AudioEngine: Send + Sync {
    // Sequences
    fn add_sequence(&self) -> TrackSequenceId;
    fn remove_sequence(&self, seq: TrackSequenceId);

    // Tracks
    fn add_track(
        &self,
        seq: TrackSequenceId,
        title: &str,
        data: PlaybackData,
        params: AudioParams,
    ) -> RequestId;
    fn remove_track(&self, seq: TrackSequenceId, track: TrackId);
    fn remove_all_tracks(&self, seq: TrackSequenceId);
    fn replace_track_data(&self, seq: TrackSequenceId, track: TrackId, data: PlaybackData);

    // Player
    fn play(&self, seq: TrackSequenceId);
    fn pause(&self, seq: TrackSequenceId);
    fn resume(&self, seq: TrackSequenceId);
    fn stop(&self, seq: TrackSequenceId);
    fn seek(&self, seq: TrackSequenceId, msecs: Msecs);
    fn set_loop(&self, seq: TrackSequenceId, from: Msecs, to: Msecs);
    fn reset_loop(&self, seq: TrackSequenceId);
    fn set_duration(&self, seq: TrackSequenceId, msecs: Msecs);

    // Params
    fn set_input_params(&self, seq: TrackSequenceId, track: TrackId, params: AudioInputParams);
    fn set_output_params(&self, seq: TrackSequenceId, track: TrackId, params: AudioOutputParams);
    fn set_master_output_params(&self, params: AudioOutputParams);

    /// Push event stream; one receiver shared by all subscribers
    fn events(&self) -> Receiver<EngineEvent>;
}
