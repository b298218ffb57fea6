//! Action Intents
//!
//! Closed enumeration of inbound playback intents. The controller maps
//! each intent onto a handler at compile time in `handle_action`, and
//! answers checked-state queries per intent for toggle-style UI.

use serde::{Deserialize, Serialize};

/// Inbound playback intent from the action/UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionIntent {
    TogglePlay,
    Stop,
    Rewind,
    ToggleLoop,
    LoopIn,
    LoopOut,
    TogglePlayRepeats,
    ToggleMetronome,
}

impl ActionIntent {
    /// Every intent, for UI state synchronization sweeps
    pub const ALL: [ActionIntent; 8] = [
        ActionIntent::TogglePlay,
        ActionIntent::Stop,
        ActionIntent::Rewind,
        ActionIntent::ToggleLoop,
        ActionIntent::LoopIn,
        ActionIntent::LoopOut,
        ActionIntent::TogglePlayRepeats,
        ActionIntent::ToggleMetronome,
    ];
}
