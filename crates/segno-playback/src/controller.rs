//! Playback Controller
//!
//! Owns the transport for the current document:
//! - maps logical instrument tracks onto engine sequence/track ids and
//!   keeps that mapping in step with part/instrument lifecycle,
//! - drives play/pause/stop/seek/rewind and the loop region,
//! - converts between score ticks and engine milliseconds through the
//!   document's tempo map and repeat structure, never linearly,
//! - reflects engine position/status feedback back into observable state.
//!
//! Everything runs on one processing context: user intents call in
//! directly, while model change sets and engine events are drained by
//! `process_events`. In-flight engine requests carry a document
//! generation token; resolutions for a superseded document are discarded.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace, warn};

use segno_core::{
    InstrumentTrackId, InstrumentTrackIdSet, LoopBoundaries, LoopBoundaryType, MeasureBeat, Msecs,
    ScoreHandle, Segment, Tick, TrackId, TrackSequenceId,
};
use segno_model::{PlaybackEventList, PlaybackModel};

use crate::actions::ActionIntent;
use crate::config::PlaybackConfig;
use crate::engine::{
    AudioEngine, AudioParams, EngineEvent, EngineRejection, PlaybackStatus, RequestId,
};
use crate::settings::AudioSettings;

// ═══════════════════════════════════════════════════════════════════════════
// CONTROLLER
// ═══════════════════════════════════════════════════════════════════════════

/// Transport and track-lifecycle controller for one document at a time
pub struct PlaybackController {
    engine: Arc<dyn AudioEngine>,
    engine_rx: Receiver<EngineEvent>,

    model: PlaybackModel,
    model_changes: Receiver<InstrumentTrackIdSet>,

    score: Option<ScoreHandle>,
    settings: AudioSettings,
    config: PlaybackConfig,

    sequence: Option<TrackSequenceId>,
    track_map: HashMap<InstrumentTrackId, TrackId>,
    pending_adds: HashMap<RequestId, (InstrumentTrackId, u64)>,
    /// Bumped on every document rebind; stale engine resolutions carry an
    /// older value and are dropped
    doc_generation: u64,

    /// Position on the played (repeat-expanded) timeline
    current_tick: Tick,
    status: PlaybackStatus,
    need_rewind_before_play: bool,

    loop_boundaries: LoopBoundaries,
    selection: Option<(Tick, Tick)>,

    position_tx: Sender<Tick>,
    position_rx: Receiver<Tick>,
    status_tx: Sender<PlaybackStatus>,
    status_rx: Receiver<PlaybackStatus>,
    action_checked_tx: Sender<ActionIntent>,
    action_checked_rx: Receiver<ActionIntent>,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        settings: AudioSettings,
        config: PlaybackConfig,
    ) -> Self {
        let engine_rx = engine.events();
        let mut model = PlaybackModel::default();
        model.set_play_repeats(config.play_repeats);
        let model_changes = model.track_playback_data_changed();

        let (position_tx, position_rx) = unbounded();
        let (status_tx, status_rx) = unbounded();
        let (action_checked_tx, action_checked_rx) = unbounded();

        Self {
            engine,
            engine_rx,
            model,
            model_changes,
            score: None,
            settings,
            config,
            sequence: None,
            track_map: HashMap::new(),
            pending_adds: HashMap::new(),
            doc_generation: 0,
            current_tick: 0,
            status: PlaybackStatus::Stopped,
            need_rewind_before_play: false,
            loop_boundaries: LoopBoundaries::default(),
            selection: None,
            position_tx,
            position_rx,
            status_tx,
            status_rx,
            action_checked_tx,
            action_checked_rx,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Document binding
    // ─────────────────────────────────────────────────────────────────────────

    /// Bind a new current document (or none). Tears down the previous
    /// engine sequence and builds the new one from the document's parts.
    pub fn set_current_document(&mut self, document: Option<ScoreHandle>) {
        if let Some(seq) = self.sequence.take() {
            debug!("tearing down sequence {seq:?}");
            self.engine.remove_all_tracks(seq);
            self.engine.remove_sequence(seq);
        }
        self.track_map.clear();
        self.pending_adds.clear();
        self.doc_generation += 1;
        self.current_tick = 0;
        self.set_status(PlaybackStatus::Stopped);
        self.need_rewind_before_play = false;
        self.loop_boundaries = LoopBoundaries::default();
        self.selection = None;

        self.score = document;

        let Some(score) = self.score.clone() else {
            self.model.unload();
            return;
        };

        self.model.load(score);
        // The load pass notifies every track; sequence setup below covers
        // them all, so the queued set is consumed without action
        while self.model_changes.try_recv().is_ok() {}

        let seq = self.engine.add_sequence();
        self.sequence = Some(seq);
        self.engine
            .set_master_output_params(self.settings.master_output_params());
        self.setup_sequence_tracks();
        self.engine.set_duration(seq, self.model.total_play_time_msecs());
    }

    /// Register every document track with the engine, in document part
    /// order, metronome last
    fn setup_sequence_tracks(&mut self) {
        let Some(score) = self.score.clone() else {
            return;
        };

        let track_ids: Vec<(InstrumentTrackId, String)> = {
            let guard = score.read();
            guard
                .parts()
                .iter()
                .flat_map(|part| {
                    part.instrument_track_ids()
                        .into_iter()
                        .map(|id| (id, part.name.clone()))
                })
                .collect()
        };

        for (track_id, title) in track_ids {
            self.add_track(track_id, title);
        }
        self.add_track(self.model.metronome_track_id(), "Metronome".to_string());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Request engine registration for one track. Tracks without valid
    /// playback data are dropped silently; the engine's resolution comes
    /// back through `process_events`.
    pub fn add_track(&mut self, track_id: InstrumentTrackId, title: String) {
        let Some(seq) = self.sequence else {
            debug!("add_track without an active sequence, ignoring");
            return;
        };

        let Some(data) = self.model.resolve_track_playback_data(&track_id) else {
            debug!("no playback data for {track_id:?}, dropping track request");
            return;
        };
        if !data.is_valid() {
            debug!("invalid playback data for {track_id:?}, dropping track request");
            return;
        }

        let mut params = self.settings.track_params(&track_id);
        if track_id.is_metronome() {
            params.output.muted = !self.config.metronome_enabled;
        } else if let Some(score) = &self.score {
            let hidden = score
                .read()
                .part(track_id.part_id)
                .is_some_and(|part| !part.is_visible);
            if hidden {
                params.output.muted = true;
            }
        }

        let request = self.engine.add_track(seq, &title, data, params);
        self.pending_adds
            .insert(request, (track_id, self.doc_generation));
    }

    pub fn remove_track(&mut self, track_id: &InstrumentTrackId) {
        let Some(track) = self.track_map.remove(track_id) else {
            return;
        };
        if let Some(seq) = self.sequence {
            self.engine.remove_track(seq, track);
        }
    }

    /// Reconcile the track map against the document's live tracks,
    /// removing engine tracks whose source is gone. Two-phase: collect,
    /// then apply.
    pub fn remove_non_existing_tracks(&mut self) {
        let Some(score) = self.score.clone() else {
            return;
        };
        let live: InstrumentTrackIdSet = score.read().instrument_track_ids().into_iter().collect();

        let stale: Vec<InstrumentTrackId> = self
            .track_map
            .keys()
            .filter(|id| !id.is_metronome() && !live.contains(*id))
            .cloned()
            .collect();

        for track_id in stale {
            debug!("removing non-existing track {track_id:?}");
            self.remove_track(&track_id);
        }
    }

    /// Mute or unmute a track without removing it
    pub fn set_track_activity(&mut self, track_id: &InstrumentTrackId, active: bool) {
        let Some(seq) = self.sequence else {
            return;
        };
        let Some(&track) = self.track_map.get(track_id) else {
            return;
        };

        let mut params = self.settings.track_output_params(track_id);
        params.muted = !active;
        self.engine.set_output_params(seq, track, params.clone());
        self.settings.set_track_output_params(track_id.clone(), params);
    }

    /// Engine track id for an instrument track, if registered
    pub fn engine_track_of(&self, track_id: &InstrumentTrackId) -> Option<TrackId> {
        self.track_map.get(track_id).copied()
    }

    /// Instrument tracks currently registered with the engine
    pub fn tracked_instruments(&self) -> Vec<InstrumentTrackId> {
        self.track_map.keys().cloned().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    pub fn toggle_play(&mut self) {
        match self.status {
            PlaybackStatus::Running => self.pause(),
            PlaybackStatus::Paused => self.resume(),
            PlaybackStatus::Stopped => self.play(),
        }
    }

    pub fn play(&mut self) {
        let Some(seq) = self.sequence else {
            debug!("play without an active sequence, ignoring");
            return;
        };
        if self.status == PlaybackStatus::Running {
            return;
        }
        if self.status == PlaybackStatus::Paused {
            self.resume();
            return;
        }

        if self.need_rewind_before_play {
            self.need_rewind_before_play = false;
            let msecs = self.model.played_tick_to_msecs(self.current_tick);
            self.engine.seek(seq, msecs);
        }
        self.engine.play(seq);
        self.set_status(PlaybackStatus::Running);
    }

    pub fn pause(&mut self) {
        let Some(seq) = self.sequence else {
            return;
        };
        self.engine.pause(seq);
        self.set_status(PlaybackStatus::Paused);
    }

    pub fn resume(&mut self) {
        let Some(seq) = self.sequence else {
            return;
        };
        self.engine.resume(seq);
        self.set_status(PlaybackStatus::Running);
    }

    pub fn stop(&mut self) {
        let Some(seq) = self.sequence else {
            return;
        };
        self.engine.stop(seq);
        self.set_status(PlaybackStatus::Stopped);
        // The next play restarts from the retained position
        self.need_rewind_before_play = true;
    }

    /// Seek while running, stop otherwise. Without an explicit offset the
    /// target is the loop start when a loop is active, else the beginning.
    pub fn rewind(&mut self, offset: Option<Msecs>) {
        let target = offset.unwrap_or_else(|| {
            if self.is_playback_looped() {
                self.loop_boundaries
                    .range()
                    .map(|(from, _)| self.score_tick_to_msecs(from))
                    .unwrap_or(0)
            } else {
                0
            }
        });

        if self.status != PlaybackStatus::Running {
            self.stop();
        }
        self.seek_msecs(target);
    }

    /// Seek to a raw score tick (first played occurrence under repeats)
    pub fn seek_tick(&mut self, tick: Tick) {
        let utick = self.model.repeat_list().tick_to_utick(tick);
        self.seek_msecs(self.model.played_tick_to_msecs(utick));
    }

    pub fn seek_msecs(&mut self, msecs: Msecs) {
        let Some(seq) = self.sequence else {
            return;
        };
        self.engine.seek(seq, msecs);
        self.current_tick = self.model.msecs_to_played_tick(msecs);
        self.need_rewind_before_play = false;
        let _ = self.position_tx.send(self.current_tick);
    }

    /// Seek to an element's position and, when editing audition is on,
    /// trigger its events for immediate playback
    pub fn play_element(&mut self, track_id: &InstrumentTrackId, segment: &Segment) {
        self.seek_tick(segment.tick);
        if self.config.play_notes_when_editing {
            self.model.trigger_events_for_item(track_id, segment);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop control
    // ─────────────────────────────────────────────────────────────────────────

    /// Hide an active loop; otherwise activate one from the selection,
    /// the stored boundaries, or the whole score, in that order
    pub fn toggle_loop_playback(&mut self) {
        if self.is_loop_visible() {
            self.hide_loop();
            return;
        }

        if let Some((from, to)) = self.selection {
            self.loop_boundaries.loop_in_tick = Some(from);
            self.loop_boundaries.loop_out_tick = Some(to);
        } else if self.loop_boundaries.range().is_none() {
            let end = self.score_end_tick();
            self.loop_boundaries.loop_in_tick = Some(0);
            self.loop_boundaries.loop_out_tick = Some(end);
        }
        self.show_loop();
    }

    /// Place one loop boundary at the current playback position
    pub fn add_loop_boundary(&mut self, boundary: LoopBoundaryType) {
        let tick = self.current_score_tick();
        self.loop_boundaries.set_boundary(boundary, tick);
        if self.loop_boundaries.range().is_some() {
            self.show_loop();
        }
    }

    pub fn set_loop(&mut self, boundaries: LoopBoundaries) {
        self.loop_boundaries = boundaries;
        if self.loop_boundaries.range().is_some() {
            self.show_loop();
        } else {
            self.hide_loop();
        }
    }

    pub fn show_loop(&mut self) {
        let Some((from, to)) = self.loop_boundaries.range() else {
            return;
        };
        self.loop_boundaries.visible = true;
        if let Some(seq) = self.sequence {
            self.engine
                .set_loop(seq, self.score_tick_to_msecs(from), self.score_tick_to_msecs(to));
        }
        self.notify_action_checked(ActionIntent::ToggleLoop);
    }

    /// Deactivate the loop; the boundaries stay stored
    pub fn hide_loop(&mut self) {
        self.loop_boundaries.visible = false;
        if let Some(seq) = self.sequence {
            self.engine.reset_loop(seq);
        }
        self.notify_action_checked(ActionIntent::ToggleLoop);
    }

    #[inline]
    pub fn is_loop_visible(&self) -> bool {
        self.loop_boundaries.visible
    }

    #[inline]
    pub fn is_playback_looped(&self) -> bool {
        self.loop_boundaries.visible && self.loop_boundaries.range().is_some()
    }

    pub fn loop_boundaries(&self) -> &LoopBoundaries {
        &self.loop_boundaries
    }

    /// Current score selection, consulted by loop toggling
    pub fn set_selection(&mut self, selection: Option<(Tick, Tick)>) {
        self.selection = selection;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Actions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn handle_action(&mut self, intent: ActionIntent) {
        match intent {
            ActionIntent::TogglePlay => self.toggle_play(),
            ActionIntent::Stop => self.stop(),
            ActionIntent::Rewind => self.rewind(None),
            ActionIntent::ToggleLoop => self.toggle_loop_playback(),
            ActionIntent::LoopIn => self.add_loop_boundary(LoopBoundaryType::LoopIn),
            ActionIntent::LoopOut => self.add_loop_boundary(LoopBoundaryType::LoopOut),
            ActionIntent::TogglePlayRepeats => self.toggle_play_repeats(),
            ActionIntent::ToggleMetronome => self.toggle_metronome(),
        }
    }

    /// Checked state of toggle-style intents for UI synchronization
    pub fn action_checked(&self, intent: ActionIntent) -> bool {
        match intent {
            ActionIntent::TogglePlay => self.is_playing(),
            ActionIntent::ToggleLoop => self.is_playback_looped(),
            ActionIntent::TogglePlayRepeats => self.config.play_repeats,
            ActionIntent::ToggleMetronome => self.config.metronome_enabled,
            _ => false,
        }
    }

    fn toggle_play_repeats(&mut self) {
        self.config.play_repeats = !self.config.play_repeats;
        self.model.set_play_repeats(self.config.play_repeats);
        if let Some(seq) = self.sequence {
            self.engine.set_duration(seq, self.model.total_play_time_msecs());
        }
        self.notify_action_checked(ActionIntent::TogglePlayRepeats);
    }

    fn toggle_metronome(&mut self) {
        self.config.metronome_enabled = !self.config.metronome_enabled;
        let metronome = self.model.metronome_track_id();
        self.set_track_activity(&metronome, self.config.metronome_enabled);
        self.notify_action_checked(ActionIntent::ToggleMetronome);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event processing
    // ─────────────────────────────────────────────────────────────────────────

    /// One pass of the single processing context: document changes first,
    /// then changed-track fan-out, then engine feedback
    pub fn process_events(&mut self) {
        self.model.process_changes();

        let mut tracks_changed = false;
        while let Ok(changed) = self.model_changes.try_recv() {
            tracks_changed = true;
            for track_id in changed {
                self.sync_changed_track(track_id);
            }
        }
        if tracks_changed {
            self.remove_non_existing_tracks();
            if let Some(seq) = self.sequence {
                self.engine.set_duration(seq, self.model.total_play_time_msecs());
            }
        }

        while let Ok(event) = self.engine_rx.try_recv() {
            self.handle_engine_event(event);
        }
    }

    /// Audition events produced by `play_element`, for host preview
    pub fn audition_events(&self) -> Receiver<(InstrumentTrackId, PlaybackEventList)> {
        self.model.audition_events()
    }

    fn sync_changed_track(&mut self, track_id: InstrumentTrackId) {
        let Some(seq) = self.sequence else {
            return;
        };
        // A pending registration will deliver the fresh data on resolution
        if self.pending_adds.values().any(|(id, _)| *id == track_id) {
            return;
        }

        match self.track_map.get(&track_id).copied() {
            Some(track) => match self.model.resolve_track_playback_data(&track_id) {
                Some(data) if data.is_valid() => {
                    trace!("pushing updated data for {track_id:?}");
                    self.engine.replace_track_data(seq, track, data);
                }
                _ => self.remove_track(&track_id),
            },
            None => {
                let title = self.track_title(&track_id);
                self.add_track(track_id, title);
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::PositionChanged { seq, msecs } if Some(seq) == self.sequence => {
                self.current_tick = self.model.msecs_to_played_tick(msecs);
                let _ = self.position_tx.send(self.current_tick);
            }
            EngineEvent::StatusChanged { seq, status } if Some(seq) == self.sequence => {
                self.set_status(status);
            }
            EngineEvent::TrackAddResolved { request, seq, result } => {
                self.on_track_add_resolved(request, seq, result);
            }
            EngineEvent::InputParamsChanged { seq, track, params }
                if Some(seq) == self.sequence =>
            {
                if let Some(track_id) = self.instrument_track_of(track) {
                    self.settings.set_track_input_params(track_id, params);
                }
            }
            EngineEvent::OutputParamsChanged { seq, track, params }
                if Some(seq) == self.sequence =>
            {
                if let Some(track_id) = self.instrument_track_of(track) {
                    self.settings.set_track_output_params(track_id, params);
                }
            }
            EngineEvent::MasterOutputParamsChanged { params } => {
                self.settings.set_master_output_params(params);
            }
            _ => {}
        }
    }

    fn on_track_add_resolved(
        &mut self,
        request: RequestId,
        seq: TrackSequenceId,
        result: Result<(TrackId, AudioParams), EngineRejection>,
    ) {
        let Some((track_id, generation)) = self.pending_adds.remove(&request) else {
            return;
        };

        if generation != self.doc_generation || Some(seq) != self.sequence {
            debug!("discarding stale track registration for {track_id:?}");
            return;
        }

        match result {
            Ok((track, params)) => {
                trace!("track {track_id:?} registered as {track:?}");
                self.track_map.insert(track_id.clone(), track);
                self.settings.set_track_input_params(track_id.clone(), params.input);
                self.settings.set_track_output_params(track_id, params.output);
            }
            Err(rejection) => {
                warn!(
                    "engine rejected track {track_id:?}: code {} ({})",
                    rejection.code, rejection.message
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Position on the played (repeat-expanded) timeline
    #[inline]
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Position collapsed to the raw score timeline
    pub fn current_score_tick(&self) -> Tick {
        self.model.repeat_list().utick_to_tick(self.current_tick)
    }

    pub fn total_play_time(&self) -> Msecs {
        self.model.total_play_time_msecs()
    }

    pub fn current_tempo(&self) -> f64 {
        let tick = self.current_score_tick();
        self.score
            .as_ref()
            .map(|score| score.read().tempo_map().tempo_at(tick))
            .unwrap_or(120.0)
    }

    pub fn current_beat(&self) -> MeasureBeat {
        let tick = self.current_score_tick();
        self.score
            .as_ref()
            .map(|score| score.read().tempo_map().position_at(tick))
            .unwrap_or_default()
    }

    pub fn beat_to_msecs(&self, measure_index: u32, beat_index: u32) -> Msecs {
        let Some(score) = &self.score else {
            return 0;
        };
        let tick = score.read().tempo_map().beat_to_tick(measure_index, beat_index);
        self.score_tick_to_msecs(tick)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Running
    }

    #[inline]
    pub fn playback_status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn current_sequence(&self) -> Option<TrackSequenceId> {
        self.sequence
    }

    pub fn config(&self) -> PlaybackConfig {
        self.config
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn model(&self) -> &PlaybackModel {
        &self.model
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────────────────

    /// Current position as a played tick, published on every seek and on
    /// engine position feedback
    pub fn position_changed(&self) -> Receiver<Tick> {
        self.position_rx.clone()
    }

    pub fn playback_status_changed(&self) -> Receiver<PlaybackStatus> {
        self.status_rx.clone()
    }

    pub fn action_checked_changed(&self) -> Receiver<ActionIntent> {
        self.action_checked_rx.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        let _ = self.status_tx.send(status);
        self.notify_action_checked(ActionIntent::TogglePlay);
    }

    fn notify_action_checked(&self, intent: ActionIntent) {
        let _ = self.action_checked_tx.send(intent);
    }

    fn score_tick_to_msecs(&self, tick: Tick) -> Msecs {
        let utick = self.model.repeat_list().tick_to_utick(tick);
        self.model.played_tick_to_msecs(utick)
    }

    fn score_end_tick(&self) -> Tick {
        self.score
            .as_ref()
            .map(|score| score.read().last_tick())
            .unwrap_or(0)
    }

    fn instrument_track_of(&self, track: TrackId) -> Option<InstrumentTrackId> {
        self.track_map
            .iter()
            .find(|(_, id)| **id == track)
            .map(|(track_id, _)| track_id.clone())
    }

    fn track_title(&self, track_id: &InstrumentTrackId) -> String {
        if track_id.is_metronome() {
            return "Metronome".to_string();
        }
        self.score
            .as_ref()
            .and_then(|score| score.read().part(track_id.part_id).map(|p| p.name.clone()))
            .unwrap_or_else(|| track_id.instrument_id.clone())
    }
}
