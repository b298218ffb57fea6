//! Playback Context
//!
//! Per-track accumulation of dynamics and persistent articulations.
//! Markings apply from their tick forward, so rendering a note needs the
//! most recent marking at or before it. The context is rebuilt forward
//! only: invalidating from a tick drops everything at or after it, and
//! the owner re-scans the score from there.

use std::collections::BTreeMap;

use segno_core::{ArticulationType, Score, ScoreElement, Tick};

use crate::event::{DynamicLevel, NATURAL_DYNAMIC_LEVEL, dynamic_level_from_type};

/// Forward-accumulated dynamic/articulation state for one track
#[derive(Debug, Clone, Default)]
pub struct PlaybackContext {
    /// Dynamic level changes by tick
    dynamics: BTreeMap<Tick, DynamicLevel>,
    /// Persistent articulation changes by tick; `Standard` cancels
    persistent: BTreeMap<Tick, ArticulationType>,
}

impl PlaybackContext {
    /// Dynamic level in effect at a tick
    pub fn appliable_dynamic_level(&self, tick: Tick) -> DynamicLevel {
        self.dynamics
            .range(..=tick)
            .next_back()
            .map(|(_, &level)| level)
            .unwrap_or(NATURAL_DYNAMIC_LEVEL)
    }

    /// Persistent articulation in effect at a tick, if any
    pub fn persistent_articulation(&self, tick: Tick) -> Option<ArticulationType> {
        self.persistent
            .range(..=tick)
            .next_back()
            .map(|(_, &articulation)| articulation)
            .filter(|articulation| *articulation != ArticulationType::Standard)
    }

    /// Accumulate markings from score segments in `[tick_from, tick_to)`
    /// on one document track
    pub fn update_from_range(
        &mut self,
        score: &Score,
        tick_from: Tick,
        tick_to: Tick,
        track_index: usize,
    ) {
        for segment in score.segments_in_range(tick_from, tick_to, track_index) {
            match &segment.element {
                ScoreElement::Dynamic(dynamic) => {
                    self.dynamics
                        .insert(segment.tick, dynamic_level_from_type(*dynamic));
                }
                ScoreElement::Articulation(articulation) if articulation.is_persistent() => {
                    self.persistent.insert(segment.tick, *articulation);
                }
                ScoreElement::Articulation(ArticulationType::Standard) => {
                    // Explicit cancellation of a persistent articulation
                    self.persistent.insert(segment.tick, ArticulationType::Standard);
                }
                _ => {}
            }
        }
    }

    /// Drop all accumulated state at or after `tick`
    pub fn invalidate_from(&mut self, tick: Tick) {
        self.dynamics.split_off(&tick);
        self.persistent.split_off(&tick);
    }

    /// Snapshot of accumulated state at or after `tick`, for detecting
    /// whether a rebuild actually changed anything
    pub fn tail(
        &self,
        tick: Tick,
    ) -> (BTreeMap<Tick, DynamicLevel>, BTreeMap<Tick, ArticulationType>) {
        (
            self.dynamics
                .range(tick..)
                .map(|(&t, &level)| (t, level))
                .collect(),
            self.persistent
                .range(tick..)
                .map(|(&t, &articulation)| (t, articulation))
                .collect(),
        )
    }

    pub fn clear(&mut self) {
        self.dynamics.clear();
        self.persistent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segno_core::{DynamicType, Instrument, Part, Segment};

    fn score_with_markings() -> Score {
        let mut score = Score::new();
        score.add_part(Part::new("Piano", vec![Instrument::new("piano", "keyboards")]));

        score.add_segment(Segment {
            tick: 480,
            duration_ticks: 0,
            track_index: 0,
            element: ScoreElement::Dynamic(DynamicType::F),
        });
        score.add_segment(Segment {
            tick: 960,
            duration_ticks: 0,
            track_index: 0,
            element: ScoreElement::Articulation(ArticulationType::Legato),
        });
        score.add_segment(Segment {
            tick: 1920,
            duration_ticks: 0,
            track_index: 0,
            element: ScoreElement::Articulation(ArticulationType::Standard),
        });
        score
    }

    #[test]
    fn test_dynamics_apply_forward() {
        let score = score_with_markings();
        let mut context = PlaybackContext::default();
        context.update_from_range(&score, 0, 4000, 0);

        assert_eq!(context.appliable_dynamic_level(0), NATURAL_DYNAMIC_LEVEL);
        assert_eq!(
            context.appliable_dynamic_level(480),
            dynamic_level_from_type(DynamicType::F)
        );
        assert_eq!(
            context.appliable_dynamic_level(3000),
            dynamic_level_from_type(DynamicType::F)
        );
    }

    #[test]
    fn test_persistent_articulation_cancelled_by_standard() {
        let score = score_with_markings();
        let mut context = PlaybackContext::default();
        context.update_from_range(&score, 0, 4000, 0);

        assert_eq!(context.persistent_articulation(480), None);
        assert_eq!(
            context.persistent_articulation(1000),
            Some(ArticulationType::Legato)
        );
        assert_eq!(context.persistent_articulation(1920), None);
    }

    #[test]
    fn test_invalidate_then_rebuild() {
        let score = score_with_markings();
        let mut context = PlaybackContext::default();
        context.update_from_range(&score, 0, 4000, 0);

        context.invalidate_from(900);
        assert_eq!(context.persistent_articulation(1000), None);
        assert_eq!(
            context.appliable_dynamic_level(1000),
            dynamic_level_from_type(DynamicType::F),
            "state before the invalidation point must survive"
        );

        context.update_from_range(&score, 900, 4000, 0);
        assert_eq!(
            context.persistent_articulation(1000),
            Some(ArticulationType::Legato)
        );
    }
}
