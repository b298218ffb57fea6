//! Track Identifiers
//!
//! Two id families live here:
//! - `InstrumentTrackId`: document-side composite key (part + instrument)
//!   identifying one logical playback track, with a reserved metronome
//!   sentinel.
//! - `TrackSequenceId` / `TrackId`: opaque ids assigned by the audio
//!   engine. The controller maps between the two families for the active
//!   sequence only.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// DOCUMENT-SIDE IDS
// ═══════════════════════════════════════════════════════════════════════════

/// Unique part identifier within a document. Id 0 is reserved for the
/// metronome sentinel; real parts are allocated from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartId(pub u64);

impl PartId {
    pub const METRONOME: PartId = PartId(0);
}

/// Identifies one logical playback track: one instrument within one part
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentTrackId {
    pub part_id: PartId,
    pub instrument_id: String,
}

pub const METRONOME_INSTRUMENT_ID: &str = "metronome";

impl InstrumentTrackId {
    pub fn new(part_id: PartId, instrument_id: impl Into<String>) -> Self {
        Self {
            part_id,
            instrument_id: instrument_id.into(),
        }
    }

    /// The reserved sentinel track for the metronome
    pub fn metronome() -> Self {
        Self::new(PartId::METRONOME, METRONOME_INSTRUMENT_ID)
    }

    #[inline]
    pub fn is_metronome(&self) -> bool {
        self.part_id == PartId::METRONOME && self.instrument_id == METRONOME_INSTRUMENT_ID
    }

    /// A track id is valid when it names an instrument and is either a
    /// real part or the metronome sentinel
    pub fn is_valid(&self) -> bool {
        !self.instrument_id.is_empty() && (self.part_id != PartId::METRONOME || self.is_metronome())
    }
}

/// Set of instrument track ids, the unit of change notifications
pub type InstrumentTrackIdSet = HashSet<InstrumentTrackId>;

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE-SIDE IDS
// ═══════════════════════════════════════════════════════════════════════════

/// Audio-engine-assigned sequence identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackSequenceId(pub u64);

/// Audio-engine-assigned track identifier, scoped to one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metronome_sentinel() {
        let metronome = InstrumentTrackId::metronome();
        assert!(metronome.is_metronome());
        assert!(metronome.is_valid());

        let piano = InstrumentTrackId::new(PartId(1), "piano");
        assert!(!piano.is_metronome());
        assert!(piano.is_valid());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(!InstrumentTrackId::new(PartId(1), "").is_valid());
        assert!(!InstrumentTrackId::new(PartId::METRONOME, "piano").is_valid());
    }
}
