//! Score Document Model
//!
//! The in-memory, editable score the playback stack renders from.
//! Provides:
//! - Parts and instruments (one document track per part/instrument pair)
//! - Timed segments carrying chords, rests, dynamic and articulation marks
//! - The document's tempo map and repeat structure
//! - A change-range notification channel `(tick_from, tick_to,
//!   track_from, track_to)` emitted on every mutation
//!
//! Consumers hold the document behind a `ScoreHandle` and treat it as the
//! single source of truth for musical content and time conversion.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::repeats::RepeatSpan;
use crate::tempo::{TempoMap, Tick, TimeSignature};
use crate::track::{InstrumentTrackId, PartId};

/// Shared, lockable document handle
pub type ScoreHandle = Arc<RwLock<Score>>;

// Part id allocator; 0 is the metronome sentinel
static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

// ═══════════════════════════════════════════════════════════════════════════
// MUSICAL VOCABULARY
// ═══════════════════════════════════════════════════════════════════════════

/// Dynamic marking as notated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DynamicType {
    Ppp,
    Pp,
    P,
    Mp,
    Natural,
    Mf,
    F,
    Ff,
    Fff,
}

/// Articulation vocabulary shared between the score and the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArticulationType {
    /// No articulation applied
    Standard,
    Staccato,
    Tenuto,
    Accent,
    Marcato,
    /// Persistent until cancelled
    Legato,
    /// Persistent until cancelled
    Pizzicato,
    Tremolo,
}

impl ArticulationType {
    /// Persistent articulations stay in effect for subsequent notes until
    /// replaced; the rest apply to a single chord.
    #[inline]
    pub fn is_persistent(&self) -> bool {
        matches!(self, ArticulationType::Legato | ArticulationType::Pizzicato)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PARTS & INSTRUMENTS
// ═══════════════════════════════════════════════════════════════════════════

/// One playable instrument inside a part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    /// Instrument family, the articulation-profile lookup key
    pub family: String,
}

impl Instrument {
    pub fn new(id: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: family.into(),
        }
    }
}

/// A part of the score (one staff group, possibly multiple instruments)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub name: String,
    pub is_visible: bool,
    pub instruments: Vec<Instrument>,
}

impl Part {
    pub fn new(name: impl Into<String>, instruments: Vec<Instrument>) -> Self {
        Self {
            id: PartId(NEXT_PART_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            is_visible: true,
            instruments,
        }
    }

    /// Track ids for every instrument of this part, in document order
    pub fn instrument_track_ids(&self) -> Vec<InstrumentTrackId> {
        self.instruments
            .iter()
            .map(|instrument| InstrumentTrackId::new(self.id, instrument.id.clone()))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SEGMENTS
// ═══════════════════════════════════════════════════════════════════════════

/// A single notated note within a chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch number
    pub pitch: u8,
    /// Onset offset relative to the owning segment
    pub offset_ticks: Tick,
    /// Sounding duration; 0 means "use the segment duration"
    pub duration_ticks: Tick,
}

impl Note {
    pub fn new(pitch: u8) -> Self {
        Self {
            pitch,
            offset_ticks: 0,
            duration_ticks: 0,
        }
    }
}

/// Musical payload of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoreElement {
    Chord { notes: Vec<Note> },
    Rest,
    Dynamic(DynamicType),
    Articulation(ArticulationType),
}

/// A timed element on one document track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub tick: Tick,
    pub duration_ticks: Tick,
    /// Document track index (part/instrument pair, in document order)
    pub track_index: usize,
    pub element: ScoreElement,
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANGE NOTIFICATIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Half-open tick range and inclusive track range touched by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRange {
    pub tick_from: Tick,
    pub tick_to: Tick,
    pub track_from: usize,
    pub track_to: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// SCORE
// ═══════════════════════════════════════════════════════════════════════════

/// The score document
pub struct Score {
    parts: Vec<Part>,
    /// Segments ordered by tick
    segments: Vec<Segment>,
    tempo_map: TempoMap,
    repeat_spans: Vec<RepeatSpan>,
    change_tx: Sender<ChangeRange>,
    change_rx: Receiver<ChangeRange>,
}

impl Default for Score {
    fn default() -> Self {
        Self::new()
    }
}

impl Score {
    pub fn new() -> Self {
        let (change_tx, change_rx) = unbounded();
        Self {
            parts: Vec::new(),
            segments: Vec::new(),
            tempo_map: TempoMap::new(),
            repeat_spans: Vec::new(),
            change_tx,
            change_rx,
        }
    }

    /// Subscribe to mutation ranges. Ranges are consumed competitively;
    /// the playback model is the intended single subscriber.
    pub fn change_ranges(&self) -> Receiver<ChangeRange> {
        self.change_rx.clone()
    }

    fn emit(&self, range: ChangeRange) {
        let _ = self.change_tx.send(range);
    }

    fn emit_full(&self) {
        self.emit(ChangeRange {
            tick_from: 0,
            tick_to: self.last_tick(),
            track_from: 0,
            track_to: self.track_count().saturating_sub(1),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Parts
    // ─────────────────────────────────────────────────────────────────────────

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, part_id: PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == part_id)
    }

    pub fn part_exists(&self, part_id: PartId) -> bool {
        self.part(part_id).is_some()
    }

    pub fn add_part(&mut self, part: Part) -> PartId {
        let id = part.id;
        self.parts.push(part);
        self.emit_full();
        id
    }

    /// Remove a part and all segments on its tracks. Later track indices
    /// shift down, so the whole document is reported changed.
    pub fn remove_part(&mut self, part_id: PartId) {
        let Some(position) = self.parts.iter().position(|p| p.id == part_id) else {
            return;
        };
        debug!("removing part {:?} ({})", part_id, self.parts[position].name);

        let first_track: usize = self.parts[..position]
            .iter()
            .map(|p| p.instruments.len())
            .sum();
        let removed_tracks = self.parts[position].instruments.len();

        self.parts.remove(position);
        self.segments.retain_mut(|segment| {
            if segment.track_index >= first_track + removed_tracks {
                segment.track_index -= removed_tracks;
                true
            } else {
                segment.track_index < first_track
            }
        });

        self.emit_full();
    }

    pub fn set_part_visible(&mut self, part_id: PartId, visible: bool) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.id == part_id) {
            part.is_visible = visible;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track index mapping
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of document tracks (the metronome sentinel is not one)
    pub fn track_count(&self) -> usize {
        self.parts.iter().map(|p| p.instruments.len()).sum()
    }

    /// Document track index of an instrument track id
    pub fn track_index_of(&self, track_id: &InstrumentTrackId) -> Option<usize> {
        let mut index = 0;
        for part in &self.parts {
            for instrument in &part.instruments {
                if part.id == track_id.part_id && instrument.id == track_id.instrument_id {
                    return Some(index);
                }
                index += 1;
            }
        }
        None
    }

    /// Instrument track id at a document track index
    pub fn track_id_at(&self, track_index: usize) -> Option<InstrumentTrackId> {
        let mut index = 0;
        for part in &self.parts {
            for instrument in &part.instruments {
                if index == track_index {
                    return Some(InstrumentTrackId::new(part.id, instrument.id.clone()));
                }
                index += 1;
            }
        }
        None
    }

    /// Instrument behind a track id
    pub fn instrument_of(&self, track_id: &InstrumentTrackId) -> Option<&Instrument> {
        self.part(track_id.part_id)?
            .instruments
            .iter()
            .find(|i| i.id == track_id.instrument_id)
    }

    /// All instrument track ids in document order
    pub fn instrument_track_ids(&self) -> Vec<InstrumentTrackId> {
        self.parts
            .iter()
            .flat_map(|p| p.instrument_track_ids())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Segments
    // ─────────────────────────────────────────────────────────────────────────

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments with `tick` in `[tick_from, tick_to)` on one track
    pub fn segments_in_range(
        &self,
        tick_from: Tick,
        tick_to: Tick,
        track_index: usize,
    ) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |s| {
            s.track_index == track_index && s.tick >= tick_from && s.tick < tick_to
        })
    }

    pub fn add_segment(&mut self, segment: Segment) {
        let range = ChangeRange {
            tick_from: segment.tick,
            tick_to: segment.tick + segment.duration_ticks.max(1),
            track_from: segment.track_index,
            track_to: segment.track_index,
        };

        let insert_at = self
            .segments
            .partition_point(|s| s.tick <= segment.tick);
        self.segments.insert(insert_at, segment);

        self.emit(range);
    }

    /// Remove all segments starting within `[tick_from, tick_to)` on one track
    pub fn remove_segments_in_range(&mut self, tick_from: Tick, tick_to: Tick, track_index: usize) {
        self.segments.retain(|s| {
            !(s.track_index == track_index && s.tick >= tick_from && s.tick < tick_to)
        });

        self.emit(ChangeRange {
            tick_from,
            tick_to,
            track_from: track_index,
            track_to: track_index,
        });
    }

    /// One past the last sounding tick, rounded up to a whole measure
    pub fn last_tick(&self) -> Tick {
        let content_end = self
            .segments
            .iter()
            .map(|s| s.tick + s.duration_ticks)
            .max()
            .unwrap_or(0);

        let measure = self
            .tempo_map
            .time_signature_at(content_end)
            .ticks_per_measure();
        ((content_end + measure - 1) / measure).max(1) * measure
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timing
    // ─────────────────────────────────────────────────────────────────────────

    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }

    /// Tempo edits shift every later event on every track
    pub fn set_tempo(&mut self, tick: Tick, bpm: f64) {
        self.tempo_map.set_tempo(tick, bpm);
        self.emit_full();
    }

    pub fn set_time_signature(&mut self, tick: Tick, time_sig: TimeSignature) {
        self.tempo_map.set_time_signature(tick, time_sig);
        self.emit_full();
    }

    pub fn repeat_spans(&self) -> &[RepeatSpan] {
        &self.repeat_spans
    }

    pub fn set_repeat_spans(&mut self, spans: Vec<RepeatSpan>) {
        self.repeat_spans = spans;
        self.emit_full();
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn two_part_score() -> Score {
        let mut score = Score::new();
        score.add_part(Part::new("Piano", vec![Instrument::new("piano", "keyboards")]));
        score.add_part(Part::new(
            "Strings",
            vec![
                Instrument::new("violin", "strings"),
                Instrument::new("cello", "strings"),
            ],
        ));
        score
    }

    #[test]
    fn test_track_index_mapping() {
        let score = two_part_score();
        assert_eq!(score.track_count(), 3);

        let ids = score.instrument_track_ids();
        assert_eq!(ids.len(), 3);
        assert_eq!(score.track_index_of(&ids[0]), Some(0));
        assert_eq!(score.track_index_of(&ids[2]), Some(2));
        assert_eq!(score.track_id_at(1), Some(ids[1].clone()));
    }

    #[test]
    fn test_remove_part_shifts_tracks() {
        let mut score = two_part_score();
        let piano_part = score.parts()[0].id;

        score.add_segment(Segment {
            tick: 0,
            duration_ticks: 480,
            track_index: 1, // violin
            element: ScoreElement::Rest,
        });

        score.remove_part(piano_part);

        assert_eq!(score.track_count(), 2);
        assert_eq!(score.segments()[0].track_index, 0);
    }

    #[test]
    fn test_change_ranges_emitted() {
        let mut score = Score::new();
        score.add_part(Part::new("Piano", vec![Instrument::new("piano", "keyboards")]));
        let changes = score.change_ranges();
        // Drain the add_part notification
        while changes.try_recv().is_ok() {}

        score.add_segment(Segment {
            tick: 960,
            duration_ticks: 480,
            track_index: 0,
            element: ScoreElement::Rest,
        });

        let range = changes.try_recv().unwrap();
        assert_eq!(range.tick_from, 960);
        assert_eq!(range.tick_to, 1440);
        assert_eq!(range.track_from, 0);
        assert_eq!(range.track_to, 0);
    }

    #[test]
    fn test_last_tick_rounds_to_measure() {
        let mut score = two_part_score();
        score.add_segment(Segment {
            tick: 0,
            duration_ticks: 500,
            track_index: 0,
            element: ScoreElement::Rest,
        });

        // 4/4 measure is 1920 ticks
        assert_eq!(score.last_tick(), 1920);
    }
}
