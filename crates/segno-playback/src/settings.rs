//! Audio Settings Store
//!
//! Persisted per-track input/output parameters plus the master output
//! parameters. Read when tracks are registered with the engine, written
//! back on engine parameter-change notifications, and serialized with
//! the project.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use segno_core::{InstrumentTrackId, SegnoError, SegnoResult};

use crate::engine::{AudioInputParams, AudioOutputParams, AudioParams};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct TrackParams {
    input: AudioInputParams,
    output: AudioOutputParams,
}

/// Per-document audio parameter store
#[derive(Debug, Clone, Default)]
pub struct AudioSettings {
    tracks: HashMap<InstrumentTrackId, TrackParams>,
    master: AudioOutputParams,
}

// Serialized form: map keys are composite ids, so tracks persist as a list
#[derive(Serialize, Deserialize)]
struct AudioSettingsDoc {
    tracks: Vec<(InstrumentTrackId, TrackParams)>,
    master: AudioOutputParams,
}

impl AudioSettings {
    // ─────────────────────────────────────────────────────────────────────────
    // Per-track params
    // ─────────────────────────────────────────────────────────────────────────

    /// Input params for a track; defaults when never set
    pub fn track_input_params(&self, track_id: &InstrumentTrackId) -> AudioInputParams {
        self.tracks
            .get(track_id)
            .map(|params| params.input.clone())
            .unwrap_or_default()
    }

    /// Output params for a track; defaults when never set
    pub fn track_output_params(&self, track_id: &InstrumentTrackId) -> AudioOutputParams {
        self.tracks
            .get(track_id)
            .map(|params| params.output.clone())
            .unwrap_or_default()
    }

    /// Combined params used when registering a track with the engine
    pub fn track_params(&self, track_id: &InstrumentTrackId) -> AudioParams {
        AudioParams {
            input: self.track_input_params(track_id),
            output: self.track_output_params(track_id),
        }
    }

    pub fn set_track_input_params(
        &mut self,
        track_id: InstrumentTrackId,
        params: AudioInputParams,
    ) {
        self.tracks.entry(track_id).or_default().input = params;
    }

    pub fn set_track_output_params(
        &mut self,
        track_id: InstrumentTrackId,
        params: AudioOutputParams,
    ) {
        self.tracks.entry(track_id).or_default().output = params;
    }

    pub fn remove_track_params(&mut self, track_id: &InstrumentTrackId) {
        self.tracks.remove(track_id);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Master params
    // ─────────────────────────────────────────────────────────────────────────

    pub fn master_output_params(&self) -> AudioOutputParams {
        self.master.clone()
    }

    pub fn set_master_output_params(&mut self, params: AudioOutputParams) {
        self.master = params;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> SegnoResult<String> {
        let doc = AudioSettingsDoc {
            tracks: self
                .tracks
                .iter()
                .map(|(id, params)| (id.clone(), params.clone()))
                .collect(),
            master: self.master.clone(),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| SegnoError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> SegnoResult<Self> {
        let doc: AudioSettingsDoc =
            serde_json::from_str(json).map_err(|e| SegnoError::Serialization(e.to_string()))?;
        Ok(Self {
            tracks: doc.tracks.into_iter().collect(),
            master: doc.master,
        })
    }
}
