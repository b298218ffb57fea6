//! Mock Audio Engine
//!
//! In-process `AudioEngine` implementation for tests. Tracks all engine
//! state behind a mutex and makes it inspectable. Track-add requests
//! resolve through the event channel like a real engine, never inline,
//! so callers must run their event-processing pass to observe them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use segno_core::{Msecs, TrackId, TrackSequenceId};
use segno_model::PlaybackData;

use crate::engine::{
    AudioEngine, AudioInputParams, AudioOutputParams, AudioParams, EngineEvent, EngineRejection,
    PlaybackStatus, RequestId,
};

#[derive(Debug, Clone)]
struct TrackEntry {
    id: TrackId,
    title: String,
    data: PlaybackData,
    params: AudioParams,
}

#[derive(Debug, Clone, Default)]
struct SequenceState {
    /// Tracks in registration order
    tracks: Vec<TrackEntry>,
    status: PlaybackStatus,
    position: Msecs,
    loop_range: Option<(Msecs, Msecs)>,
    duration: Msecs,
}

#[derive(Default)]
struct Inner {
    sequences: Vec<(TrackSequenceId, SequenceState)>,
    /// Instrument ids whose track-add requests are rejected
    rejected_instruments: HashSet<String>,
}

/// Inspectable in-process audio engine
pub struct MockAudioEngine {
    inner: Mutex<Inner>,
    next_seq: AtomicU64,
    next_track: AtomicU64,
    next_request: AtomicU64,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
}

impl Default for MockAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioEngine {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            inner: Mutex::new(Inner::default()),
            next_seq: AtomicU64::new(1),
            next_track: AtomicU64::new(1),
            next_request: AtomicU64::new(1),
            events_tx,
            events_rx,
        }
    }

    /// Make future `add_track` requests for an instrument id fail
    pub fn reject_instrument(&self, instrument_id: impl Into<String>) {
        self.inner
            .lock()
            .rejected_instruments
            .insert(instrument_id.into());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn sequence_count(&self) -> usize {
        self.inner.lock().sequences.len()
    }

    /// Track titles in registration order
    pub fn track_titles(&self, seq: TrackSequenceId) -> Vec<String> {
        self.with_sequence(seq, |state| {
            state.tracks.iter().map(|t| t.title.clone()).collect()
        })
        .unwrap_or_default()
    }

    pub fn track_count(&self, seq: TrackSequenceId) -> usize {
        self.with_sequence(seq, |state| state.tracks.len())
            .unwrap_or(0)
    }

    pub fn status(&self, seq: TrackSequenceId) -> PlaybackStatus {
        self.with_sequence(seq, |state| state.status)
            .unwrap_or_default()
    }

    pub fn position(&self, seq: TrackSequenceId) -> Msecs {
        self.with_sequence(seq, |state| state.position).unwrap_or(0)
    }

    pub fn loop_range(&self, seq: TrackSequenceId) -> Option<(Msecs, Msecs)> {
        self.with_sequence(seq, |state| state.loop_range).flatten()
    }

    pub fn duration(&self, seq: TrackSequenceId) -> Msecs {
        self.with_sequence(seq, |state| state.duration).unwrap_or(0)
    }

    pub fn track_data(&self, seq: TrackSequenceId, track: TrackId) -> Option<PlaybackData> {
        self.with_sequence(seq, |state| {
            state
                .tracks
                .iter()
                .find(|t| t.id == track)
                .map(|t| t.data.clone())
        })
        .flatten()
    }

    pub fn output_params(&self, seq: TrackSequenceId, track: TrackId) -> Option<AudioOutputParams> {
        self.with_sequence(seq, |state| {
            state
                .tracks
                .iter()
                .find(|t| t.id == track)
                .map(|t| t.params.output.clone())
        })
        .flatten()
    }

    /// Simulate engine-side position feedback
    pub fn emit_position(&self, seq: TrackSequenceId, msecs: Msecs) {
        if let Some(()) = self.with_sequence_mut(seq, |state| state.position = msecs) {
            let _ = self.events_tx.send(EngineEvent::PositionChanged { seq, msecs });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn with_sequence<T>(
        &self,
        seq: TrackSequenceId,
        f: impl FnOnce(&SequenceState) -> T,
    ) -> Option<T> {
        let inner = self.inner.lock();
        inner
            .sequences
            .iter()
            .find(|(id, _)| *id == seq)
            .map(|(_, state)| f(state))
    }

    fn with_sequence_mut<T>(
        &self,
        seq: TrackSequenceId,
        f: impl FnOnce(&mut SequenceState) -> T,
    ) -> Option<T> {
        let mut inner = self.inner.lock();
        inner
            .sequences
            .iter_mut()
            .find(|(id, _)| *id == seq)
            .map(|(_, state)| f(state))
    }

    fn set_status(&self, seq: TrackSequenceId, status: PlaybackStatus) {
        if let Some(()) = self.with_sequence_mut(seq, |state| state.status = status) {
            let _ = self.events_tx.send(EngineEvent::StatusChanged { seq, status });
        }
    }
}

impl AudioEngine for MockAudioEngine {
    fn add_sequence(&self) -> TrackSequenceId {
        let seq = TrackSequenceId(self.next_seq.fetch_add(1, Ordering::Relaxed));
        self.inner
            .lock()
            .sequences
            .push((seq, SequenceState::default()));
        seq
    }

    fn remove_sequence(&self, seq: TrackSequenceId) {
        self.inner.lock().sequences.retain(|(id, _)| *id != seq);
    }

    fn add_track(
        &self,
        seq: TrackSequenceId,
        title: &str,
        data: PlaybackData,
        params: AudioParams,
    ) -> RequestId {
        let request = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));

        let rejected = data
            .setup
            .as_ref()
            .is_some_and(|setup| self.inner.lock().rejected_instruments.contains(&setup.instrument_id));

        let result = if rejected || !data.is_valid() {
            Err(EngineRejection {
                code: 1,
                message: "unsupported track data".to_string(),
            })
        } else {
            let id = TrackId(self.next_track.fetch_add(1, Ordering::Relaxed));
            let entry = TrackEntry {
                id,
                title: title.to_string(),
                data,
                params: params.clone(),
            };
            match self.with_sequence_mut(seq, |state| state.tracks.push(entry)) {
                Some(()) => Ok((id, params)),
                None => Err(EngineRejection {
                    code: 2,
                    message: "no such sequence".to_string(),
                }),
            }
        };

        let _ = self
            .events_tx
            .send(EngineEvent::TrackAddResolved { request, seq, result });
        request
    }

    fn remove_track(&self, seq: TrackSequenceId, track: TrackId) {
        self.with_sequence_mut(seq, |state| state.tracks.retain(|t| t.id != track));
    }

    fn remove_all_tracks(&self, seq: TrackSequenceId) {
        self.with_sequence_mut(seq, |state| state.tracks.clear());
    }

    fn replace_track_data(&self, seq: TrackSequenceId, track: TrackId, data: PlaybackData) {
        self.with_sequence_mut(seq, |state| {
            if let Some(entry) = state.tracks.iter_mut().find(|t| t.id == track) {
                entry.data = data;
            }
        });
    }

    fn play(&self, seq: TrackSequenceId) {
        self.set_status(seq, PlaybackStatus::Running);
    }

    fn pause(&self, seq: TrackSequenceId) {
        self.set_status(seq, PlaybackStatus::Paused);
    }

    fn resume(&self, seq: TrackSequenceId) {
        self.set_status(seq, PlaybackStatus::Running);
    }

    fn stop(&self, seq: TrackSequenceId) {
        self.with_sequence_mut(seq, |state| state.position = 0);
        self.set_status(seq, PlaybackStatus::Stopped);
    }

    fn seek(&self, seq: TrackSequenceId, msecs: Msecs) {
        self.with_sequence_mut(seq, |state| state.position = msecs);
    }

    fn set_loop(&self, seq: TrackSequenceId, from: Msecs, to: Msecs) {
        self.with_sequence_mut(seq, |state| state.loop_range = Some((from, to)));
    }

    fn reset_loop(&self, seq: TrackSequenceId) {
        self.with_sequence_mut(seq, |state| state.loop_range = None);
    }

    fn set_duration(&self, seq: TrackSequenceId, msecs: Msecs) {
        self.with_sequence_mut(seq, |state| state.duration = msecs);
    }

    fn set_input_params(&self, seq: TrackSequenceId, track: TrackId, params: AudioInputParams) {
        self.with_sequence_mut(seq, |state| {
            if let Some(entry) = state.tracks.iter_mut().find(|t| t.id == track) {
                entry.params.input = params.clone();
            }
        });
        let _ = self
            .events_tx
            .send(EngineEvent::InputParamsChanged { seq, track, params });
    }

    fn set_output_params(&self, seq: TrackSequenceId, track: TrackId, params: AudioOutputParams) {
        self.with_sequence_mut(seq, |state| {
            if let Some(entry) = state.tracks.iter_mut().find(|t| t.id == track) {
                entry.params.output = params.clone();
            }
        });
        let _ = self
            .events_tx
            .send(EngineEvent::OutputParamsChanged { seq, track, params });
    }

    fn set_master_output_params(&self, params: AudioOutputParams) {
        let _ = self
            .events_tx
            .send(EngineEvent::MasterOutputParamsChanged { params });
    }

    fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }
}
