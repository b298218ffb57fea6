//! Tempo and Time Signature System
//!
//! Score time lives in ticks (PPQ-based, tempo-independent); audio time
//! lives in milliseconds. Provides:
//! - Tempo map with tempo changes
//! - Time signature changes
//! - Ticks ↔ milliseconds conversion (piecewise over tempo segments)
//! - Measure/beat position math for UI consumption
//! - Beat classification for the metronome (downbeat / beat / sub-beat)

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// TIME DOMAINS
// ═══════════════════════════════════════════════════════════════════════════════

/// Score position in ticks (integer musical time, tempo-independent)
pub type Tick = i64;

/// Audio position in milliseconds
pub type Msecs = i64;

/// Pulses per quarter note
pub const PPQ: u32 = 480;

/// Minimum tempo
pub const MIN_TEMPO: f64 = 20.0;

/// Maximum tempo
pub const MAX_TEMPO: f64 = 400.0;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (beats per measure)
    pub numerator: u8,
    /// Denominator (note value that gets one beat)
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    /// Zero fields are treated as 1 so tick math stays well-defined
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: numerator.max(1),
            denominator: denominator.max(1),
        }
    }

    /// Ticks per beat at this time signature
    pub fn ticks_per_beat(&self) -> Tick {
        PPQ as Tick * 4 / self.denominator as Tick
    }

    /// Ticks per measure at this time signature
    pub fn ticks_per_measure(&self) -> Tick {
        self.ticks_per_beat() * self.numerator as Tick
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tempo change event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TempoEvent {
    /// Position in ticks
    pub tick: Tick,
    /// Tempo in BPM (quarter notes per minute)
    pub bpm: f64,
}

impl TempoEvent {
    pub fn new(tick: Tick, bpm: f64) -> Self {
        Self {
            tick,
            bpm: bpm.clamp(MIN_TEMPO, MAX_TEMPO),
        }
    }
}

/// Time signature change event. Expected to sit on a measure boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeSignatureEvent {
    /// Position in ticks
    pub tick: Tick,
    /// New time signature
    pub time_signature: TimeSignature,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BEAT CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Classification of a tick position within its measure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatType {
    /// First beat of a measure
    Downbeat,
    /// Any other beat boundary
    Beat,
    /// Not on a beat boundary
    SubBeat,
}

/// Measure/beat position for UI display (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasureBeat {
    pub measure_index: u32,
    pub beat_index: u32,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Tempo and time signature map with tick ↔ millisecond conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    /// Tempo events (sorted by tick)
    tempo_events: Vec<TempoEvent>,
    /// Time signature events (sorted by tick)
    time_sig_events: Vec<TimeSignatureEvent>,
    /// Cached: milliseconds elapsed at each tempo event tick
    #[serde(skip)]
    msecs_at_event: Vec<f64>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoMap {
    pub fn new() -> Self {
        let mut map = Self {
            tempo_events: vec![TempoEvent::new(0, 120.0)],
            time_sig_events: vec![TimeSignatureEvent {
                tick: 0,
                time_signature: TimeSignature::default(),
            }],
            msecs_at_event: Vec::new(),
        };
        map.rebuild_cache();
        map
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tempo Management
    // ─────────────────────────────────────────────────────────────────────────────

    /// Get tempo (BPM) at tick
    pub fn tempo_at(&self, tick: Tick) -> f64 {
        let idx = self
            .tempo_events
            .iter()
            .rposition(|e| e.tick <= tick)
            .unwrap_or(0);
        self.tempo_events[idx].bpm
    }

    /// Set tempo at tick
    pub fn set_tempo(&mut self, tick: Tick, bpm: f64) {
        let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);

        if let Some(event) = self.tempo_events.iter_mut().find(|e| e.tick == tick) {
            event.bpm = bpm;
        } else {
            self.tempo_events.push(TempoEvent::new(tick, bpm));
            self.tempo_events.sort_by_key(|e| e.tick);
        }

        self.rebuild_cache();
    }

    /// Remove tempo event at tick. The initial event at tick 0 always remains.
    pub fn remove_tempo_event(&mut self, tick: Tick) {
        if tick > 0 {
            self.tempo_events.retain(|e| e.tick != tick);
            self.rebuild_cache();
        }
    }

    /// Get all tempo events
    pub fn tempo_events(&self) -> &[TempoEvent] {
        &self.tempo_events
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Time Signature Management
    // ─────────────────────────────────────────────────────────────────────────────

    /// Get time signature at tick
    pub fn time_signature_at(&self, tick: Tick) -> TimeSignature {
        self.time_sig_events
            .iter()
            .rev()
            .find(|e| e.tick <= tick)
            .map(|e| e.time_signature)
            .unwrap_or_default()
    }

    /// Set time signature at tick
    pub fn set_time_signature(&mut self, tick: Tick, time_sig: TimeSignature) {
        if let Some(event) = self.time_sig_events.iter_mut().find(|e| e.tick == tick) {
            event.time_signature = time_sig;
        } else {
            self.time_sig_events.push(TimeSignatureEvent {
                tick,
                time_signature: time_sig,
            });
            self.time_sig_events.sort_by_key(|e| e.tick);
        }
    }

    /// Get all time signature events
    pub fn time_signature_events(&self) -> &[TimeSignatureEvent] {
        &self.time_sig_events
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversion: Ticks <-> Milliseconds
    // ─────────────────────────────────────────────────────────────────────────────

    /// Milliseconds per tick at the given tempo
    #[inline]
    fn msecs_per_tick(bpm: f64) -> f64 {
        60_000.0 / (bpm * PPQ as f64)
    }

    fn rebuild_cache(&mut self) {
        self.msecs_at_event.clear();
        self.msecs_at_event.reserve(self.tempo_events.len());

        let mut msecs = 0.0;
        for i in 0..self.tempo_events.len() {
            self.msecs_at_event.push(msecs);

            if let Some(next) = self.tempo_events.get(i + 1) {
                let event = &self.tempo_events[i];
                let segment_ticks = (next.tick - event.tick) as f64;
                msecs += segment_ticks * Self::msecs_per_tick(event.bpm);
            }
        }
    }

    /// Convert a tick position to milliseconds
    pub fn ticks_to_msecs(&self, tick: Tick) -> Msecs {
        let tick = tick.max(0);

        let idx = self
            .tempo_events
            .iter()
            .rposition(|e| e.tick <= tick)
            .unwrap_or(0);

        let event = &self.tempo_events[idx];
        let base = self.msecs_at_event.get(idx).copied().unwrap_or(0.0);
        let delta = (tick - event.tick) as f64 * Self::msecs_per_tick(event.bpm);

        (base + delta).round() as Msecs
    }

    /// Convert a millisecond position back to ticks (inverse mapping)
    pub fn msecs_to_ticks(&self, msecs: Msecs) -> Tick {
        let msecs = msecs.max(0) as f64;

        let idx = self
            .msecs_at_event
            .iter()
            .rposition(|&m| m <= msecs)
            .unwrap_or(0);

        let event = &self.tempo_events[idx];
        let base = self.msecs_at_event[idx];
        let delta_ticks = (msecs - base) / Self::msecs_per_tick(event.bpm);

        event.tick + delta_ticks.round() as Tick
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversion: Ticks <-> Measure/Beat
    // ─────────────────────────────────────────────────────────────────────────────

    /// Classify a tick position within its measure
    pub fn beat_type_at(&self, tick: Tick) -> BeatType {
        let (sig, sig_tick) = self.time_sig_segment_at(tick);
        let offset = tick - sig_tick;

        if offset % sig.ticks_per_beat() != 0 {
            return BeatType::SubBeat;
        }

        if offset % sig.ticks_per_measure() == 0 {
            BeatType::Downbeat
        } else {
            BeatType::Beat
        }
    }

    /// Convert a tick position to a measure/beat position
    pub fn position_at(&self, tick: Tick) -> MeasureBeat {
        let tick = tick.max(0);
        let mut measures: i64 = 0;

        for i in 0..self.time_sig_events.len() {
            let event = &self.time_sig_events[i];
            let sig = event.time_signature;
            let next_tick = self
                .time_sig_events
                .get(i + 1)
                .map(|e| e.tick)
                .unwrap_or(Tick::MAX);

            if tick < next_tick {
                let offset = tick - event.tick;
                let measure_in_seg = offset / sig.ticks_per_measure();
                let beat = (offset % sig.ticks_per_measure()) / sig.ticks_per_beat();
                return MeasureBeat {
                    measure_index: (measures + measure_in_seg) as u32,
                    beat_index: beat as u32,
                };
            }

            measures += (next_tick - event.tick) / sig.ticks_per_measure();
        }

        MeasureBeat::default()
    }

    /// Convert a measure/beat position to a tick position
    pub fn beat_to_tick(&self, measure_index: u32, beat_index: u32) -> Tick {
        let mut measures: i64 = 0;

        for i in 0..self.time_sig_events.len() {
            let event = &self.time_sig_events[i];
            let sig = event.time_signature;
            let next_tick = self
                .time_sig_events
                .get(i + 1)
                .map(|e| e.tick)
                .unwrap_or(Tick::MAX);

            let measures_in_seg = if next_tick == Tick::MAX {
                i64::MAX
            } else {
                (next_tick - event.tick) / sig.ticks_per_measure()
            };

            // The open-ended last segment reports i64::MAX measures
            if (measure_index as i64) < measures.saturating_add(measures_in_seg) {
                let local = measure_index as i64 - measures;
                return event.tick
                    + local * sig.ticks_per_measure()
                    + beat_index as i64 * sig.ticks_per_beat();
            }

            measures = measures.saturating_add(measures_in_seg);
        }

        0
    }

    fn time_sig_segment_at(&self, tick: Tick) -> (TimeSignature, Tick) {
        self.time_sig_events
            .iter()
            .rev()
            .find(|e| e.tick <= tick)
            .map(|e| (e.time_signature, e.tick))
            .unwrap_or((TimeSignature::default(), 0))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_signature_ticks() {
        let ts = TimeSignature::new(4, 4);
        assert_eq!(ts.ticks_per_beat(), PPQ as Tick);
        assert_eq!(ts.ticks_per_measure(), 4 * PPQ as Tick);

        let ts_68 = TimeSignature::new(6, 8);
        assert_eq!(ts_68.ticks_per_beat(), PPQ as Tick / 2);
        assert_eq!(ts_68.ticks_per_measure(), 3 * PPQ as Tick);
    }

    #[test]
    fn test_default_tempo_conversion() {
        let map = TempoMap::new();

        // 120 BPM: one quarter note (480 ticks) = 500 ms
        assert_eq!(map.ticks_to_msecs(PPQ as Tick), 500);
        assert_eq!(map.ticks_to_msecs(4 * PPQ as Tick), 2000);
        assert_eq!(map.msecs_to_ticks(500), PPQ as Tick);
    }

    #[test]
    fn test_tempo_change_conversion() {
        let mut map = TempoMap::new();
        map.set_tempo(4 * PPQ as Tick, 60.0); // half speed from measure 2

        // Measure 1 at 120 BPM = 2000 ms, then quarters take 1000 ms
        assert_eq!(map.ticks_to_msecs(4 * PPQ as Tick), 2000);
        assert_eq!(map.ticks_to_msecs(5 * PPQ as Tick), 3000);
        assert_eq!(map.msecs_to_ticks(3000), 5 * PPQ as Tick);
    }

    #[test]
    fn test_round_trip_within_one_tick() {
        let mut map = TempoMap::new();
        map.set_tempo(3 * PPQ as Tick, 97.3);
        map.set_tempo(9 * PPQ as Tick, 180.0);

        for tick in (0..20 * PPQ as Tick).step_by(37) {
            let round = map.msecs_to_ticks(map.ticks_to_msecs(tick));
            assert!(
                (round - tick).abs() <= 1,
                "round trip drifted: {} -> {}",
                tick,
                round
            );
        }
    }

    #[test]
    fn test_beat_type_classification() {
        let map = TempoMap::new(); // 4/4

        assert_eq!(map.beat_type_at(0), BeatType::Downbeat);
        assert_eq!(map.beat_type_at(PPQ as Tick), BeatType::Beat);
        assert_eq!(map.beat_type_at(4 * PPQ as Tick), BeatType::Downbeat);
        assert_eq!(map.beat_type_at(PPQ as Tick / 2), BeatType::SubBeat);
    }

    #[test]
    fn test_measure_beat_positions() {
        let mut map = TempoMap::new();
        // 3/4 from measure 2 (tick 1920)
        map.set_time_signature(4 * PPQ as Tick, TimeSignature::new(3, 4));

        assert_eq!(
            map.position_at(0),
            MeasureBeat {
                measure_index: 0,
                beat_index: 0
            }
        );
        assert_eq!(
            map.position_at(5 * PPQ as Tick),
            MeasureBeat {
                measure_index: 1,
                beat_index: 1
            }
        );
        // Second 3/4 measure starts 3 beats after tick 1920
        assert_eq!(
            map.position_at(7 * PPQ as Tick),
            MeasureBeat {
                measure_index: 2,
                beat_index: 0
            }
        );

        assert_eq!(map.beat_to_tick(1, 1), 5 * PPQ as Tick);
        assert_eq!(map.beat_to_tick(2, 0), 7 * PPQ as Tick);
    }

    #[test]
    fn test_beat_to_tick_far_past_last_meter_change() {
        let mut map = TempoMap::new();
        map.set_time_signature(4 * PPQ as Tick, TimeSignature::new(3, 4));

        // Deep in the open-ended last segment: measure 1 is 4/4,
        // the remaining 99 measures are 3/4
        let tick = map.beat_to_tick(100, 2);
        assert_eq!(tick, 4 * PPQ as Tick + 99 * 3 * PPQ as Tick + 2 * PPQ as Tick);
        assert_eq!(
            map.position_at(tick),
            MeasureBeat {
                measure_index: 100,
                beat_index: 2
            }
        );
    }

    #[test]
    fn test_degenerate_time_signature_clamped() {
        let ts = TimeSignature::new(0, 0);
        assert_eq!(ts.numerator, 1);
        assert_eq!(ts.denominator, 1);
        assert_eq!(ts.ticks_per_beat(), 4 * PPQ as Tick);
        assert_eq!(ts.ticks_per_measure(), 4 * PPQ as Tick);
    }
}
