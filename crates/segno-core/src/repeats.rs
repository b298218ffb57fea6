//! Repeat Expansion
//!
//! A score with repeat barlines is played on an expanded timeline: each
//! repeated span appears once per pass. Raw score positions ("tick") and
//! expanded positions ("utick") are related through a `RepeatList` of
//! contiguous played segments. With repeat expansion disabled the list
//! degenerates to a single identity segment.

use serde::{Deserialize, Serialize};

use crate::tempo::{Msecs, TempoMap, Tick};

// ═══════════════════════════════════════════════════════════════════════════════
// REPEAT STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

/// A repeated span of the raw score, as notated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatSpan {
    /// First tick of the repeated section
    pub start_tick: Tick,
    /// One past the last tick of the repeated section
    pub end_tick: Tick,
    /// Total number of passes (2 for a plain repeat barline)
    pub times: u32,
}

/// One contiguous stretch of the played (expanded) timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatSegment {
    /// Raw score tick where the segment starts
    pub start_tick: Tick,
    /// Raw score tick where the segment ends (exclusive)
    pub end_tick: Tick,
    /// Offset such that `utick = tick + utick_offset` within this segment
    pub utick_offset: Tick,
}

impl RepeatSegment {
    #[inline]
    pub fn contains(&self, tick: Tick) -> bool {
        tick >= self.start_tick && tick < self.end_tick
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPEAT LIST
// ═══════════════════════════════════════════════════════════════════════════════

/// Played-order segment list mapping raw ticks to expanded ("played") ticks
#[derive(Debug, Clone, Default)]
pub struct RepeatList {
    segments: Vec<RepeatSegment>,
    total_utick: Tick,
}

impl RepeatList {
    /// Build the played timeline for a score of length `score_end` ticks.
    ///
    /// Spans must be sorted by start tick and non-overlapping; spans
    /// reaching past the score end are clamped. When `expand` is false the
    /// repeat structure is ignored entirely.
    pub fn build(spans: &[RepeatSpan], score_end: Tick, expand: bool) -> Self {
        let score_end = score_end.max(0);

        if !expand || spans.is_empty() {
            return Self {
                segments: vec![RepeatSegment {
                    start_tick: 0,
                    end_tick: score_end,
                    utick_offset: 0,
                }],
                total_utick: score_end,
            };
        }

        let mut segments = Vec::new();
        let mut cursor: Tick = 0;
        let mut next_utick: Tick = 0;

        let mut push = |segments: &mut Vec<RepeatSegment>, start: Tick, end: Tick| {
            if end <= start {
                return;
            }
            segments.push(RepeatSegment {
                start_tick: start,
                end_tick: end,
                utick_offset: next_utick - start,
            });
            next_utick += end - start;
        };

        for span in spans {
            let start = span.start_tick.max(cursor);
            let end = span.end_tick.min(score_end);
            if end <= start {
                continue;
            }

            // Unrepeated gap before the span
            push(&mut segments, cursor, start);

            for _ in 0..span.times.max(1) {
                push(&mut segments, start, end);
            }

            cursor = end;
        }

        // Trailing unrepeated stretch
        push(&mut segments, cursor, score_end);

        let total_utick = segments
            .last()
            .map(|s| s.end_tick + s.utick_offset)
            .unwrap_or(0);

        Self {
            segments,
            total_utick,
        }
    }

    /// Played segments in playback order
    #[inline]
    pub fn segments(&self) -> &[RepeatSegment] {
        &self.segments
    }

    /// Length of the expanded timeline in ticks
    #[inline]
    pub fn total_utick(&self) -> Tick {
        self.total_utick
    }

    /// Map a raw score tick to its first played occurrence
    pub fn tick_to_utick(&self, tick: Tick) -> Tick {
        for segment in &self.segments {
            if segment.contains(tick) {
                return tick + segment.utick_offset;
            }
        }

        // Past the end of the last segment: extrapolate from it
        self.segments
            .last()
            .map(|s| tick + s.utick_offset)
            .unwrap_or(tick)
    }

    /// Collapse a played tick back to its raw score tick
    pub fn utick_to_tick(&self, utick: Tick) -> Tick {
        for segment in &self.segments {
            let ustart = segment.start_tick + segment.utick_offset;
            let uend = segment.end_tick + segment.utick_offset;
            if utick >= ustart && utick < uend {
                return utick - segment.utick_offset;
            }
        }

        self.segments
            .last()
            .map(|s| utick - s.utick_offset)
            .unwrap_or(utick)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Played time: expanded ticks <-> milliseconds
    //
    // The tempo map speaks raw score ticks; on the expanded timeline each
    // pass of a repeated span replays the raw tempo of that span, so the
    // conversion walks segments and converts per-segment in the raw domain.
    // ─────────────────────────────────────────────────────────────────────────

    /// Convert an expanded-timeline tick to milliseconds of played audio
    pub fn utick_to_msecs(&self, tempo_map: &TempoMap, utick: Tick) -> Msecs {
        let mut elapsed: Msecs = 0;

        for segment in &self.segments {
            let uend = segment.end_tick + segment.utick_offset;
            let seg_msecs = tempo_map.ticks_to_msecs(segment.end_tick)
                - tempo_map.ticks_to_msecs(segment.start_tick);

            if utick < uend {
                let into = tempo_map.ticks_to_msecs((utick - segment.utick_offset).max(0))
                    - tempo_map.ticks_to_msecs(segment.start_tick);
                return elapsed + into.clamp(0, seg_msecs);
            }

            elapsed += seg_msecs;
        }

        elapsed
    }

    /// Convert milliseconds of played audio back to an expanded-timeline tick
    pub fn msecs_to_utick(&self, tempo_map: &TempoMap, msecs: Msecs) -> Tick {
        let mut elapsed: Msecs = 0;

        for segment in &self.segments {
            let seg_msecs = tempo_map.ticks_to_msecs(segment.end_tick)
                - tempo_map.ticks_to_msecs(segment.start_tick);

            if msecs < elapsed + seg_msecs {
                let into = msecs - elapsed;
                let raw = tempo_map
                    .msecs_to_ticks(tempo_map.ticks_to_msecs(segment.start_tick) + into);
                return raw + segment.utick_offset;
            }

            elapsed += seg_msecs;
        }

        self.total_utick
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_without_expansion() {
        let spans = [RepeatSpan {
            start_tick: 0,
            end_tick: 400,
            times: 2,
        }];
        let list = RepeatList::build(&spans, 1000, false);

        assert_eq!(list.segments().len(), 1);
        assert_eq!(list.total_utick(), 1000);
        assert_eq!(list.tick_to_utick(700), 700);
        assert_eq!(list.utick_to_tick(700), 700);
    }

    #[test]
    fn test_single_repeat_expansion() {
        // |: 0..400 :| 400..1000
        let spans = [RepeatSpan {
            start_tick: 0,
            end_tick: 400,
            times: 2,
        }];
        let list = RepeatList::build(&spans, 1000, true);

        assert_eq!(list.segments().len(), 3);
        assert_eq!(list.total_utick(), 1400);

        // First pass is identity, material after the repeat is shifted
        assert_eq!(list.tick_to_utick(100), 100);
        assert_eq!(list.tick_to_utick(500), 900);

        // Second pass collapses back into the span
        assert_eq!(list.utick_to_tick(500), 100);
        assert_eq!(list.utick_to_tick(900), 500);
    }

    #[test]
    fn test_mid_score_repeat() {
        // 0..400 |: 400..800 :| 800..1200
        let spans = [RepeatSpan {
            start_tick: 400,
            end_tick: 800,
            times: 2,
        }];
        let list = RepeatList::build(&spans, 1200, true);

        assert_eq!(list.segments().len(), 4);
        assert_eq!(list.total_utick(), 1600);
        assert_eq!(list.tick_to_utick(900), 1300);
        assert_eq!(list.utick_to_tick(1000), 600);
    }

    #[test]
    fn test_played_time_replays_span_tempo() {
        // |: 0..480 :| at 120 BPM, then 60 BPM from tick 480
        let mut tempo_map = TempoMap::new();
        tempo_map.set_tempo(480, 60.0);

        let spans = [RepeatSpan {
            start_tick: 0,
            end_tick: 480,
            times: 2,
        }];
        let list = RepeatList::build(&spans, 960, true);

        // Each pass of the span is 500 ms, the tail quarter is 1000 ms
        assert_eq!(list.utick_to_msecs(&tempo_map, 480), 500);
        assert_eq!(list.utick_to_msecs(&tempo_map, 960), 1000);
        assert_eq!(list.utick_to_msecs(&tempo_map, 1440), 2000);

        // Second pass converts back into the span's raw tempo
        assert_eq!(list.msecs_to_utick(&tempo_map, 750), 720);
        assert_eq!(list.utick_to_tick(list.msecs_to_utick(&tempo_map, 750)), 240);
    }

    #[test]
    fn test_span_clamped_to_score_end() {
        let spans = [RepeatSpan {
            start_tick: 0,
            end_tick: 5000,
            times: 2,
        }];
        let list = RepeatList::build(&spans, 1000, true);

        assert_eq!(list.total_utick(), 2000);
    }
}
