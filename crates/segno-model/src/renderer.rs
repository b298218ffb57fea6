//! Events Renderer
//!
//! Pure score-to-event rendering. Every function maps score content plus
//! contextual parameters to performance events on the played timeline;
//! no state is kept between calls. Timestamps are produced per repeat
//! pass, so a note inside a repeated span renders once per occurrence.

use smallvec::SmallVec;

use segno_core::{
    ArticulationType, BeatType, Msecs, RepeatList, Score, ScoreElement, Segment, TempoMap, Tick,
};

use crate::event::{
    DynamicLevel, MAX_DYNAMIC_LEVEL, NoteEvent, PlaybackEvent, PlaybackEventsMap, RestEvent,
    pitch_level_from_midi,
};
use crate::setup::ArticulationsProfile;

/// Metronome click pitches (MIDI): B4 on downbeats, A4 elsewhere
const METRONOME_DOWNBEAT_PITCH: u8 = 71;
const METRONOME_BEAT_PITCH: u8 = 69;

// ═══════════════════════════════════════════════════════════════════════════
// RENDERING PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════

/// Contextual inputs for rendering one pass of a tick range
pub struct RenderingParams<'a> {
    pub tempo_map: &'a TempoMap,
    pub repeat_list: &'a RepeatList,
    /// Expanded-timeline offset of the repeat pass being rendered
    pub utick_offset: Tick,
    /// Dynamic level in effect at the rendered element
    pub dynamic_level: DynamicLevel,
    /// Persistent articulation in effect, if any
    pub persistent_articulation: Option<ArticulationType>,
    /// Chord-scoped articulations attached to the rendered element
    pub chord_articulations: &'a [ArticulationType],
    pub profile: &'a ArticulationsProfile,
}

impl RenderingParams<'_> {
    fn timestamp_of(&self, tick: Tick) -> Msecs {
        self.repeat_list
            .utick_to_msecs(self.tempo_map, tick + self.utick_offset)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RENDERER
// ═══════════════════════════════════════════════════════════════════════════

/// Stateless score-element renderer
pub struct EventsRenderer;

impl EventsRenderer {
    /// Render one segment into the event map. Chords yield one note event
    /// per playable note, rests yield a rest event; marking segments and
    /// empty chords contribute nothing.
    pub fn render(segment: &Segment, params: &RenderingParams<'_>, into: &mut PlaybackEventsMap) {
        match &segment.element {
            ScoreElement::Chord { notes } => {
                for note in notes {
                    let Some(event) = Self::render_note(segment, note, params) else {
                        continue;
                    };
                    into.entry(event.timestamp)
                        .or_default()
                        .push(PlaybackEvent::Note(event));
                }
            }
            ScoreElement::Rest => {
                let timestamp = params.timestamp_of(segment.tick);
                let duration =
                    params.timestamp_of(segment.tick + segment.duration_ticks) - timestamp;
                into.entry(timestamp)
                    .or_default()
                    .push(PlaybackEvent::Rest(RestEvent {
                        timestamp,
                        duration,
                    }));
            }
            // Dynamics and articulation marks are consumed by the context
            ScoreElement::Dynamic(_) | ScoreElement::Articulation(_) => {}
        }
    }

    fn render_note(
        segment: &Segment,
        note: &segno_core::Note,
        params: &RenderingParams<'_>,
    ) -> Option<NoteEvent> {
        let duration_ticks = if note.duration_ticks > 0 {
            note.duration_ticks
        } else {
            segment.duration_ticks
        };
        if duration_ticks <= 0 {
            return None;
        }

        let onset_tick = segment.tick + note.offset_ticks;
        let timestamp = params.timestamp_of(onset_tick);
        let nominal_duration = params.timestamp_of(onset_tick + duration_ticks) - timestamp;

        let mut articulations: SmallVec<[ArticulationType; 2]> = SmallVec::new();
        if let Some(persistent) = params.persistent_articulation {
            articulations.push(persistent);
        }
        for articulation in params.chord_articulations {
            if !articulations.contains(articulation) {
                articulations.push(*articulation);
            }
        }

        let mut duration_factor = 1.0_f64;
        let mut dynamic_offset = 0_i32;
        for articulation in &articulations {
            let pattern = params.profile.pattern(*articulation);
            duration_factor *= pattern.duration_factor;
            dynamic_offset += pattern.dynamic_offset;
        }

        let duration = ((nominal_duration as f64) * duration_factor).round() as Msecs;
        let dynamic_level = (params.dynamic_level as i32 + dynamic_offset)
            .clamp(0, MAX_DYNAMIC_LEVEL as i32) as DynamicLevel;

        Some(NoteEvent {
            timestamp,
            duration: duration.max(0),
            pitch_level: pitch_level_from_midi(note.pitch),
            dynamic_level,
            articulations,
        })
    }

    /// Chord-scoped (non-persistent) articulations attached at a segment's
    /// position on its track
    pub fn chord_articulations_at(
        score: &Score,
        tick: Tick,
        track_index: usize,
    ) -> Vec<ArticulationType> {
        score
            .segments_in_range(tick, tick + 1, track_index)
            .filter_map(|segment| match &segment.element {
                ScoreElement::Articulation(articulation)
                    if !articulation.is_persistent()
                        && *articulation != ArticulationType::Standard =>
                {
                    Some(*articulation)
                }
                _ => None,
            })
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metronome
    // ─────────────────────────────────────────────────────────────────────────

    /// Render metronome clicks for raw ticks `[tick_from, tick_to)` of one
    /// repeat pass. One event per beat boundary; downbeats click higher;
    /// positions between beats produce nothing.
    pub fn render_metronome(
        tempo_map: &TempoMap,
        repeat_list: &RepeatList,
        utick_offset: Tick,
        tick_from: Tick,
        tick_to: Tick,
        dynamic_level: DynamicLevel,
        into: &mut PlaybackEventsMap,
    ) {
        let mut tick = tick_from.max(0);

        // Align onto the next beat boundary
        let ticks_per_beat = tempo_map.time_signature_at(tick).ticks_per_beat();
        if tick % ticks_per_beat != 0 {
            tick += ticks_per_beat - tick % ticks_per_beat;
        }

        while tick < tick_to {
            let beat_type = tempo_map.beat_type_at(tick);
            let ticks_per_beat = tempo_map.time_signature_at(tick).ticks_per_beat();

            if beat_type != BeatType::SubBeat {
                let pitch = match beat_type {
                    BeatType::Downbeat => METRONOME_DOWNBEAT_PITCH,
                    _ => METRONOME_BEAT_PITCH,
                };

                let timestamp = repeat_list.utick_to_msecs(tempo_map, tick + utick_offset);
                let duration = repeat_list
                    .utick_to_msecs(tempo_map, tick + ticks_per_beat + utick_offset)
                    - timestamp;

                into.entry(timestamp)
                    .or_default()
                    .push(PlaybackEvent::Note(NoteEvent {
                        timestamp,
                        duration,
                        pitch_level: pitch_level_from_midi(pitch),
                        dynamic_level,
                        articulations: SmallVec::new(),
                    }));
            }

            tick += ticks_per_beat;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════
