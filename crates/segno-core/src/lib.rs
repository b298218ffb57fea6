//! segno-core: Shared types and time utilities for Segno
//!
//! This crate provides the foundational types used across the Segno
//! playback stack: score time (ticks) and audio time (milliseconds),
//! the tempo map that converts between them, repeat expansion, loop
//! boundaries, track identifiers, and the in-memory score document.

mod error;
mod loop_boundaries;
mod repeats;
mod score;
mod tempo;
mod track;

pub use error::*;
pub use loop_boundaries::*;
pub use repeats::*;
pub use score::*;
pub use tempo::*;
pub use track::*;
