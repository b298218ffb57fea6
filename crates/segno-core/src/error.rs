//! Error types for Segno

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum SegnoError {
    #[error("No score document is bound")]
    NoDocument,

    #[error("No active audio sequence")]
    NoSequence,

    #[error("Invalid instrument track: {0}")]
    InvalidTrack(String),

    #[error("Audio engine rejected the request, code [{code}]: {message}")]
    Engine { code: i32, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type SegnoResult<T> = Result<T, SegnoError>;
