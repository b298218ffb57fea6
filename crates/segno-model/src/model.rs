//! Playback Model
//!
//! Owns the score-to-performance resolution pipeline:
//! - keeps per-track `PlaybackData` (setup + events) and `PlaybackContext`
//!   caches for the loaded document,
//! - listens to score change ranges and recomputes only what a change
//!   invalidates,
//! - maintains the repeat-expanded played timeline and the synthesized
//!   metronome track,
//! - fans out changed-track sets so the controller can push fresh events
//!   to the audio engine.
//!
//! All processing happens on the caller's thread inside `process_changes`;
//! the model itself spawns nothing.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, trace};

use segno_core::{
    ChangeRange, InstrumentTrackId, InstrumentTrackIdSet, Msecs, RepeatList, Score, ScoreElement,
    ScoreHandle, Segment, Tick,
};

use crate::context::PlaybackContext;
use crate::event::{NATURAL_DYNAMIC_LEVEL, PlaybackData, PlaybackEventList, PlaybackEventsMap};
use crate::renderer::{EventsRenderer, RenderingParams};
use crate::setup::{ArticulationProfilesRepository, DefaultProfilesRepository, SetupDataResolver};

// ═══════════════════════════════════════════════════════════════════════════
// PLAYBACK MODEL
// ═══════════════════════════════════════════════════════════════════════════

/// Incremental score → performance-event resolver
pub struct PlaybackModel {
    score: Option<ScoreHandle>,
    changes_rx: Option<Receiver<ChangeRange>>,

    expand_repeats: bool,
    repeat_list: RepeatList,

    profiles: Arc<dyn ArticulationProfilesRepository>,
    data: HashMap<InstrumentTrackId, PlaybackData>,
    contexts: HashMap<InstrumentTrackId, PlaybackContext>,

    changed_tx: Sender<InstrumentTrackIdSet>,
    changed_rx: Receiver<InstrumentTrackIdSet>,
    audition_tx: Sender<(InstrumentTrackId, PlaybackEventList)>,
    audition_rx: Receiver<(InstrumentTrackId, PlaybackEventList)>,
}

impl Default for PlaybackModel {
    fn default() -> Self {
        Self::new(Arc::new(DefaultProfilesRepository::new()))
    }
}

impl PlaybackModel {
    pub fn new(profiles: Arc<dyn ArticulationProfilesRepository>) -> Self {
        let (changed_tx, changed_rx) = unbounded();
        let (audition_tx, audition_rx) = unbounded();
        Self {
            score: None,
            changes_rx: None,
            expand_repeats: true,
            repeat_list: RepeatList::default(),
            profiles,
            data: HashMap::new(),
            contexts: HashMap::new(),
            changed_tx,
            changed_rx,
            audition_tx,
            audition_rx,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a document and perform one full resolution pass
    pub fn load(&mut self, score: ScoreHandle) {
        {
            let guard = score.read();
            self.changes_rx = Some(guard.change_ranges());
        }
        // Ranges emitted before load describe state we are about to render
        if let Some(rx) = &self.changes_rx {
            while rx.try_recv().is_ok() {}
        }
        self.score = Some(score);
        self.reload();
    }

    /// Detach from the current document and drop every cache
    pub fn unload(&mut self) {
        self.score = None;
        self.changes_rx = None;
        self.data.clear();
        self.contexts.clear();
        self.repeat_list = RepeatList::default();
    }

    /// Discard every cache and re-resolve the whole document
    pub fn reload(&mut self) {
        let Some(score) = self.score.clone() else {
            return;
        };
        let score = score.read();

        debug!(
            "reloading playback model: {} tracks, {} ticks",
            score.track_count(),
            score.last_tick()
        );

        self.data.clear();
        self.contexts.clear();
        self.repeat_list = Self::build_repeat_list(&score, self.expand_repeats);

        let changed = self.rebuild_all(&score);
        self.notify_changed(changed);
    }

    #[inline]
    pub fn is_play_repeats_enabled(&self) -> bool {
        self.expand_repeats
    }

    /// Toggle repeat expansion. Rebuilds the played timeline and every
    /// cached event stream.
    pub fn set_play_repeats(&mut self, enabled: bool) {
        if self.expand_repeats == enabled {
            return;
        }
        self.expand_repeats = enabled;
        self.reload();
    }

    /// The reserved metronome track id
    pub fn metronome_track_id(&self) -> InstrumentTrackId {
        InstrumentTrackId::metronome()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Data access
    // ─────────────────────────────────────────────────────────────────────────

    /// Playback data for a track, materializing it on first request.
    /// Returns `None` for unknown tracks and tracks whose setup cannot be
    /// resolved.
    pub fn resolve_track_playback_data(
        &mut self,
        track_id: &InstrumentTrackId,
    ) -> Option<PlaybackData> {
        if let Some(data) = self.data.get(track_id) {
            return Some(data.clone());
        }

        let score = self.score.clone()?;
        let score = score.read();
        let repeat_list = self.repeat_list.clone();
        if !self.rebuild_track(&score, &repeat_list, track_id) {
            return None;
        }
        self.data.get(track_id).cloned()
    }

    /// Convenience overload keyed by part and instrument
    pub fn resolve_playback_data(
        &mut self,
        part_id: segno_core::PartId,
        instrument_id: &str,
    ) -> Option<PlaybackData> {
        self.resolve_track_playback_data(&InstrumentTrackId::new(part_id, instrument_id))
    }

    /// Track ids with currently resolved playback data
    pub fn resolved_track_ids(&self) -> Vec<InstrumentTrackId> {
        self.data.keys().cloned().collect()
    }

    /// Changed-track notifications, one set per update pass
    pub fn track_playback_data_changed(&self) -> Receiver<InstrumentTrackIdSet> {
        self.changed_rx.clone()
    }

    /// Audition events produced by `trigger_events_for_item`
    pub fn audition_events(&self) -> Receiver<(InstrumentTrackId, PlaybackEventList)> {
        self.audition_rx.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Played timeline
    // ─────────────────────────────────────────────────────────────────────────

    pub fn repeat_list(&self) -> &RepeatList {
        &self.repeat_list
    }

    /// Length of the played timeline in milliseconds
    pub fn total_play_time_msecs(&self) -> Msecs {
        let Some(score) = &self.score else {
            return 0;
        };
        let score = score.read();
        self.repeat_list
            .utick_to_msecs(score.tempo_map(), self.repeat_list.total_utick())
    }

    /// Convert a played (repeat-expanded) tick to milliseconds
    pub fn played_tick_to_msecs(&self, utick: Tick) -> Msecs {
        let Some(score) = &self.score else {
            return 0;
        };
        let score = score.read();
        self.repeat_list.utick_to_msecs(score.tempo_map(), utick)
    }

    /// Convert milliseconds of played audio to a played tick
    pub fn msecs_to_played_tick(&self, msecs: Msecs) -> Tick {
        let Some(score) = &self.score else {
            return 0;
        };
        let score = score.read();
        self.repeat_list.msecs_to_utick(score.tempo_map(), msecs)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audition
    // ─────────────────────────────────────────────────────────────────────────

    /// Render a single element through the normal pipeline and emit it on
    /// the audition channel. Caches are not touched.
    pub fn trigger_events_for_item(&self, track_id: &InstrumentTrackId, segment: &Segment) {
        let Some(score) = &self.score else {
            return;
        };
        let score = score.read();

        let Some(instrument) = score.instrument_of(track_id) else {
            return;
        };
        let Some(setup) = SetupDataResolver::resolve(instrument) else {
            return;
        };
        let profile = self.profiles.profile_for_family(&setup.family);

        let context = self.contexts.get(track_id);
        let dynamic_level = context
            .map(|c| c.appliable_dynamic_level(segment.tick))
            .unwrap_or(NATURAL_DYNAMIC_LEVEL);
        let persistent_articulation =
            context.and_then(|c| c.persistent_articulation(segment.tick));

        let chord_articulations = score
            .track_index_of(track_id)
            .map(|index| EventsRenderer::chord_articulations_at(&score, segment.tick, index))
            .unwrap_or_default();

        let utick_offset = self.repeat_list.tick_to_utick(segment.tick) - segment.tick;
        let params = RenderingParams {
            tempo_map: score.tempo_map(),
            repeat_list: &self.repeat_list,
            utick_offset,
            dynamic_level,
            persistent_articulation,
            chord_articulations: &chord_articulations,
            profile: &profile,
        };

        let mut events = PlaybackEventsMap::new();
        EventsRenderer::render(segment, &params, &mut events);

        let list: PlaybackEventList = events.into_values().flatten().collect();
        if !list.is_empty() {
            let _ = self.audition_tx.send((track_id.clone(), list));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Drain queued change ranges and update the caches incrementally.
    /// One changed-track notification is emitted per call that changed
    /// anything.
    pub fn process_changes(&mut self) {
        let Some(score) = self.score.clone() else {
            return;
        };
        let Some(rx) = self.changes_rx.clone() else {
            return;
        };

        let mut ranges = Vec::new();
        while let Ok(range) = rx.try_recv() {
            ranges.push(range);
        }
        if ranges.is_empty() {
            return;
        }

        let score = score.read();
        let mut changed = InstrumentTrackIdSet::new();

        // Timing-shared edits (tempo map, repeat structure, part layout)
        // arrive as full-document ranges and force a timeline rebuild.
        let rebuilt_list = Self::build_repeat_list(&score, self.expand_repeats);
        let timeline_changed = rebuilt_list.segments() != self.repeat_list.segments();

        if timeline_changed || ranges.iter().any(|r| Self::is_full_range(&score, r)) {
            trace!("full-document change, rebuilding all tracks");
            let previous: Vec<InstrumentTrackId> = self.data.keys().cloned().collect();
            self.data.clear();
            self.contexts.clear();
            self.repeat_list = rebuilt_list;
            changed = self.rebuild_all(&score);
            // Tracks that did not come back are reported too
            for track_id in previous {
                if !self.data.contains_key(&track_id) {
                    changed.insert(track_id);
                }
            }
        } else {
            let repeat_list = self.repeat_list.clone();
            for range in ranges {
                self.apply_change(&score, &repeat_list, &range, &mut changed);
            }
        }

        self.clear_expired_tracks(&score, &mut changed);
        self.notify_changed(changed);
    }

    fn is_full_range(score: &Score, range: &ChangeRange) -> bool {
        range.tick_from <= 0
            && range.tick_to >= score.last_tick()
            && range.track_from == 0
            && range.track_to + 1 >= score.track_count()
    }

    /// Incremental update for one local change range
    fn apply_change(
        &mut self,
        score: &Score,
        repeat_list: &RepeatList,
        range: &ChangeRange,
        changed: &mut InstrumentTrackIdSet,
    ) {
        trace!(
            "applying change: ticks [{}, {}), tracks [{}, {}]",
            range.tick_from, range.tick_to, range.track_from, range.track_to
        );

        let track_to = range.track_to.min(score.track_count().saturating_sub(1));
        for track_index in range.track_from..=track_to {
            let Some(track_id) = score.track_id_at(track_index) else {
                continue;
            };
            self.update_track_range(
                score,
                repeat_list,
                &track_id,
                range.tick_from,
                range.tick_to,
            );
            changed.insert(track_id);
        }

        // Content edits move beat content the metronome marks, so it is
        // always re-rendered for the range
        let metronome = self.metronome_track_id();
        self.update_track_range(score, repeat_list, &metronome, range.tick_from, range.tick_to);
        changed.insert(metronome);
    }

    /// Invalidate and re-render one track's events for a raw tick range
    fn update_track_range(
        &mut self,
        score: &Score,
        repeat_list: &RepeatList,
        track_id: &InstrumentTrackId,
        tick_from: Tick,
        tick_to: Tick,
    ) {
        if !self.data.contains_key(track_id) {
            // Never resolved (or previously unresolvable): try a full build
            self.rebuild_track(score, repeat_list, track_id);
            return;
        }

        if track_id.is_metronome() {
            let Some(data) = self.data.get_mut(track_id) else {
                return;
            };
            Self::invalidate_events(score, repeat_list, &mut data.events, tick_from, tick_to);
            for segment in repeat_list.segments() {
                let lo = tick_from.max(segment.start_tick);
                let hi = tick_to.min(segment.end_tick);
                if lo < hi {
                    EventsRenderer::render_metronome(
                        score.tempo_map(),
                        repeat_list,
                        segment.utick_offset,
                        lo,
                        hi,
                        NATURAL_DYNAMIC_LEVEL,
                        &mut data.events,
                    );
                }
            }
            return;
        }

        let Some(track_index) = score.track_index_of(track_id) else {
            // Expired; cleanup happens after the pass
            return;
        };

        // Instrument configuration may have changed with the content
        let Some(setup) = score
            .instrument_of(track_id)
            .and_then(SetupDataResolver::resolve)
        else {
            self.data.remove(track_id);
            self.contexts.remove(track_id);
            return;
        };
        let profile = self.profiles.profile_for_family(&setup.family);

        let context_changed = {
            let context = self.contexts.entry(track_id.clone()).or_default();
            let previous_tail = context.tail(tick_from);
            context.invalidate_from(tick_from);
            context.update_from_range(score, tick_from, score.last_tick(), track_index);
            context.tail(tick_from) != previous_tail
        };
        // A marking edit shifts parameters for every later note on the
        // track, so the stale window reaches the end of the score
        let tick_to = if context_changed {
            tick_to.max(score.last_tick())
        } else {
            tick_to
        };

        let (Some(context), Some(data)) =
            (self.contexts.get(track_id), self.data.get_mut(track_id))
        else {
            return;
        };
        data.setup = Some(setup);
        Self::invalidate_events(score, repeat_list, &mut data.events, tick_from, tick_to);

        for repeat_segment in repeat_list.segments() {
            let lo = tick_from.max(repeat_segment.start_tick);
            let hi = tick_to.min(repeat_segment.end_tick);
            if lo >= hi {
                continue;
            }
            for segment in score.segments_in_range(lo, hi, track_index) {
                if !matches!(
                    segment.element,
                    ScoreElement::Chord { .. } | ScoreElement::Rest
                ) {
                    continue;
                }
                let chord_articulations =
                    EventsRenderer::chord_articulations_at(score, segment.tick, track_index);
                let params = RenderingParams {
                    tempo_map: score.tempo_map(),
                    repeat_list,
                    utick_offset: repeat_segment.utick_offset,
                    dynamic_level: context.appliable_dynamic_level(segment.tick),
                    persistent_articulation: context.persistent_articulation(segment.tick),
                    chord_articulations: &chord_articulations,
                    profile: &profile,
                };
                EventsRenderer::render(segment, &params, &mut data.events);
            }
        }
    }

    /// Drop events whose source ticks fall in `[tick_from, tick_to)`,
    /// per repeat pass
    fn invalidate_events(
        score: &Score,
        repeat_list: &RepeatList,
        events: &mut PlaybackEventsMap,
        tick_from: Tick,
        tick_to: Tick,
    ) {
        let mut msec_ranges = Vec::new();
        for segment in repeat_list.segments() {
            let lo = tick_from.max(segment.start_tick);
            let hi = tick_to.min(segment.end_tick);
            if lo < hi {
                msec_ranges.push((
                    repeat_list.utick_to_msecs(score.tempo_map(), lo + segment.utick_offset),
                    repeat_list.utick_to_msecs(score.tempo_map(), hi + segment.utick_offset),
                ));
            }
        }

        events.retain(|&timestamp, _| {
            !msec_ranges
                .iter()
                .any(|&(from, to)| timestamp >= from && timestamp < to)
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Full builds
    // ─────────────────────────────────────────────────────────────────────────

    fn build_repeat_list(score: &Score, expand: bool) -> RepeatList {
        RepeatList::build(score.repeat_spans(), score.last_tick(), expand)
    }

    /// Rebuild every document track plus the metronome
    fn rebuild_all(&mut self, score: &Score) -> InstrumentTrackIdSet {
        let repeat_list = self.repeat_list.clone();
        let mut changed = InstrumentTrackIdSet::new();

        for track_id in score.instrument_track_ids() {
            if self.rebuild_track(score, &repeat_list, &track_id) {
                changed.insert(track_id);
            }
        }

        let metronome = self.metronome_track_id();
        self.rebuild_track(score, &repeat_list, &metronome);
        changed.insert(metronome);

        changed
    }

    /// Full setup + context + events build for one track. Returns false
    /// when the track does not exist or its setup is unresolvable.
    fn rebuild_track(
        &mut self,
        score: &Score,
        repeat_list: &RepeatList,
        track_id: &InstrumentTrackId,
    ) -> bool {
        if track_id.is_metronome() {
            let mut data = PlaybackData {
                setup: Some(SetupDataResolver::metronome()),
                events: PlaybackEventsMap::new(),
            };
            for segment in repeat_list.segments() {
                EventsRenderer::render_metronome(
                    score.tempo_map(),
                    repeat_list,
                    segment.utick_offset,
                    segment.start_tick,
                    segment.end_tick,
                    NATURAL_DYNAMIC_LEVEL,
                    &mut data.events,
                );
            }
            self.data.insert(track_id.clone(), data);
            return true;
        }

        let Some(track_index) = score.track_index_of(track_id) else {
            return false;
        };
        let Some(setup) = score
            .instrument_of(track_id)
            .and_then(SetupDataResolver::resolve)
        else {
            debug!("setup unresolvable, omitting track {track_id:?}");
            self.data.remove(track_id);
            self.contexts.remove(track_id);
            return false;
        };
        let profile = self.profiles.profile_for_family(&setup.family);

        let mut context = PlaybackContext::default();
        context.update_from_range(score, 0, score.last_tick(), track_index);

        let mut data = PlaybackData {
            setup: Some(setup),
            events: PlaybackEventsMap::new(),
        };

        for repeat_segment in repeat_list.segments() {
            for segment in
                score.segments_in_range(repeat_segment.start_tick, repeat_segment.end_tick, track_index)
            {
                if !matches!(
                    segment.element,
                    ScoreElement::Chord { .. } | ScoreElement::Rest
                ) {
                    continue;
                }
                let chord_articulations =
                    EventsRenderer::chord_articulations_at(score, segment.tick, track_index);
                let params = RenderingParams {
                    tempo_map: score.tempo_map(),
                    repeat_list,
                    utick_offset: repeat_segment.utick_offset,
                    dynamic_level: context.appliable_dynamic_level(segment.tick),
                    persistent_articulation: context.persistent_articulation(segment.tick),
                    chord_articulations: &chord_articulations,
                    profile: &profile,
                };
                EventsRenderer::render(segment, &params, &mut data.events);
            }
        }

        self.contexts.insert(track_id.clone(), context);
        self.data.insert(track_id.clone(), data);
        true
    }

    /// Remove caches for tracks no longer present in the document
    fn clear_expired_tracks(&mut self, score: &Score, changed: &mut InstrumentTrackIdSet) {
        let expired: Vec<InstrumentTrackId> = self
            .data
            .keys()
            .filter(|id| !id.is_metronome() && score.track_index_of(id).is_none())
            .cloned()
            .collect();

        for track_id in expired {
            debug!("clearing expired track {track_id:?}");
            self.data.remove(&track_id);
            self.contexts.remove(&track_id);
            changed.insert(track_id);
        }
    }

    fn notify_changed(&self, changed: InstrumentTrackIdSet) {
        if !changed.is_empty() {
            let _ = self.changed_tx.send(changed);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
