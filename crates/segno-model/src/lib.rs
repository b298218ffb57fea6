//! segno-model: Score-to-performance rendering
//!
//! Turns score content into per-track performance event streams and keeps
//! them consistent under document edits:
//! - `EventsRenderer`: pure segment → event rendering (incl. metronome)
//! - `PlaybackContext`: forward-accumulated dynamics/articulation state
//! - `SetupDataResolver`: static per-track sound configuration
//! - `PlaybackModel`: incremental orchestration, caching, change fan-out

mod context;
mod event;
mod model;
mod renderer;
mod setup;

pub use context::*;
pub use event::*;
pub use model::*;
pub use renderer::*;
pub use setup::*;
