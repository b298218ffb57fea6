//! Playback Setup Data & Articulation Profiles
//!
//! Static per-track configuration: which sound a track speaks with, and
//! how articulations shape rendered events for that instrument family.
//! Profiles are looked up through a repository trait so hosts can ship
//! their own sound libraries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use segno_core::{ArticulationType, Instrument, METRONOME_INSTRUMENT_ID};

// ═══════════════════════════════════════════════════════════════════════════
// SETUP DATA
// ═══════════════════════════════════════════════════════════════════════════

/// Broad sound category derived from the instrument family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCategory {
    Keyboards,
    Strings,
    Winds,
    Voices,
    Percussion,
}

/// Static per-track sound descriptor, the setup half of `PlaybackData`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSetupData {
    pub instrument_id: String,
    pub family: String,
    pub category: SoundCategory,
}

impl PlaybackSetupData {
    /// Validity requires a resolvable, non-empty sound descriptor
    pub fn is_valid(&self) -> bool {
        !self.instrument_id.is_empty() && !self.family.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ARTICULATION PROFILES
// ═══════════════════════════════════════════════════════════════════════════

/// How one articulation shapes a rendered note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArticulationPattern {
    /// Scales the nominal sounding duration
    pub duration_factor: f64,
    /// Added to the nominal dynamic level
    pub dynamic_offset: i32,
}

impl Default for ArticulationPattern {
    fn default() -> Self {
        Self {
            duration_factor: 1.0,
            dynamic_offset: 0,
        }
    }
}

/// Rendering patterns for the articulations an instrument family supports
#[derive(Debug, Clone, Default)]
pub struct ArticulationsProfile {
    patterns: HashMap<ArticulationType, ArticulationPattern>,
}

impl ArticulationsProfile {
    pub fn with_pattern(
        mut self,
        articulation: ArticulationType,
        pattern: ArticulationPattern,
    ) -> Self {
        self.patterns.insert(articulation, pattern);
        self
    }

    pub fn supports(&self, articulation: ArticulationType) -> bool {
        self.patterns.contains_key(&articulation)
    }

    /// Pattern for an articulation; unsupported ones render as standard
    pub fn pattern(&self, articulation: ArticulationType) -> ArticulationPattern {
        self.patterns
            .get(&articulation)
            .copied()
            .unwrap_or_default()
    }
}

/// Lookup of articulation rendering profiles by instrument family
pub trait ArticulationProfilesRepository: Send + Sync {
    fn profile_for_family(&self, family: &str) -> Arc<ArticulationsProfile>;
}

/// Built-in repository with one common profile per known family and a
/// neutral fallback
pub struct DefaultProfilesRepository {
    profiles: HashMap<String, Arc<ArticulationsProfile>>,
    fallback: Arc<ArticulationsProfile>,
}

impl Default for DefaultProfilesRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultProfilesRepository {
    pub fn new() -> Self {
        let common = ArticulationsProfile::default()
            .with_pattern(
                ArticulationType::Staccato,
                ArticulationPattern {
                    duration_factor: 0.5,
                    dynamic_offset: 0,
                },
            )
            .with_pattern(
                ArticulationType::Tenuto,
                ArticulationPattern {
                    duration_factor: 1.0,
                    dynamic_offset: 0,
                },
            )
            .with_pattern(
                ArticulationType::Accent,
                ArticulationPattern {
                    duration_factor: 1.0,
                    dynamic_offset: 1000,
                },
            )
            .with_pattern(
                ArticulationType::Marcato,
                ArticulationPattern {
                    duration_factor: 0.8,
                    dynamic_offset: 1500,
                },
            )
            .with_pattern(
                ArticulationType::Legato,
                ArticulationPattern {
                    duration_factor: 1.0,
                    dynamic_offset: 0,
                },
            );

        let strings = common.clone().with_pattern(
            ArticulationType::Pizzicato,
            ArticulationPattern {
                duration_factor: 0.4,
                dynamic_offset: 0,
            },
        );

        let mut profiles = HashMap::new();
        profiles.insert("keyboards".to_string(), Arc::new(common.clone()));
        profiles.insert("strings".to_string(), Arc::new(strings));

        Self {
            profiles,
            fallback: Arc::new(common),
        }
    }
}

impl ArticulationProfilesRepository for DefaultProfilesRepository {
    fn profile_for_family(&self, family: &str) -> Arc<ArticulationsProfile> {
        self.profiles
            .get(family)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════

/// Derives static setup data from score instrument data
pub struct SetupDataResolver;

impl SetupDataResolver {
    /// Resolve an instrument's sound descriptor. An instrument with no
    /// usable id or family yields `None` and its track is omitted from
    /// playback entirely.
    pub fn resolve(instrument: &Instrument) -> Option<PlaybackSetupData> {
        if instrument.id.is_empty() || instrument.family.is_empty() {
            return None;
        }

        Some(PlaybackSetupData {
            instrument_id: instrument.id.clone(),
            family: instrument.family.clone(),
            category: Self::category_of(&instrument.family),
        })
    }

    /// Setup data for the synthesized metronome track
    pub fn metronome() -> PlaybackSetupData {
        PlaybackSetupData {
            instrument_id: METRONOME_INSTRUMENT_ID.to_string(),
            family: "percussion".to_string(),
            category: SoundCategory::Percussion,
        }
    }

    fn category_of(family: &str) -> SoundCategory {
        match family {
            "keyboards" => SoundCategory::Keyboards,
            "strings" => SoundCategory::Strings,
            "winds" | "brass" => SoundCategory::Winds,
            "voices" => SoundCategory::Voices,
            _ => SoundCategory::Percussion,
        }
    }
}
