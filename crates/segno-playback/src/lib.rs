//! segno-playback: Transport and audio-engine sequencing
//!
//! The controller half of the playback stack:
//! - `AudioEngine`: the narrow engine collaborator interface, with a
//!   fully inspectable `MockAudioEngine` for tests
//! - `AudioSettings`: persisted per-track and master audio parameters
//! - `ActionIntent`: closed enumeration of inbound playback intents
//! - `PlaybackController`: transport state machine, track lifecycle,
//!   loop control, and tick ↔ millisecond position mapping

mod actions;
mod config;
mod controller;
mod engine;
mod mock;
mod settings;

pub use actions::*;
pub use config::*;
pub use controller::*;
pub use engine::*;
pub use mock::*;
pub use settings::*;
