//! Loop Boundaries
//!
//! A document-scoped pair of tick positions marking a repeating playback
//! region, plus a visibility flag. Boundaries survive hiding the loop; a
//! loop with no boundary selection at all is "null".

use serde::{Deserialize, Serialize};

use crate::tempo::Tick;

/// Which loop boundary an action targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopBoundaryType {
    LoopIn,
    LoopOut,
}

/// Loop region selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoopBoundaries {
    pub loop_in_tick: Option<Tick>,
    pub loop_out_tick: Option<Tick>,
    pub visible: bool,
}

impl LoopBoundaries {
    /// True when no boundary selection exists
    #[inline]
    pub fn is_null(&self) -> bool {
        self.loop_in_tick.is_none() && self.loop_out_tick.is_none()
    }

    /// Set one boundary, keeping the other
    pub fn set_boundary(&mut self, boundary: LoopBoundaryType, tick: Tick) {
        match boundary {
            LoopBoundaryType::LoopIn => self.loop_in_tick = Some(tick),
            LoopBoundaryType::LoopOut => self.loop_out_tick = Some(tick),
        }
    }

    /// Resolved (in, out) range, if both boundaries are set and ordered
    pub fn range(&self) -> Option<(Tick, Tick)> {
        match (self.loop_in_tick, self.loop_out_tick) {
            (Some(from), Some(to)) if from < to => Some((from, to)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_range() {
        let mut boundaries = LoopBoundaries::default();
        assert!(boundaries.is_null());
        assert_eq!(boundaries.range(), None);

        boundaries.set_boundary(LoopBoundaryType::LoopIn, 480);
        assert!(!boundaries.is_null());
        assert_eq!(boundaries.range(), None);

        boundaries.set_boundary(LoopBoundaryType::LoopOut, 1920);
        assert_eq!(boundaries.range(), Some((480, 1920)));
    }

    #[test]
    fn test_unordered_range_is_rejected() {
        let mut boundaries = LoopBoundaries::default();
        boundaries.set_boundary(LoopBoundaryType::LoopIn, 1920);
        boundaries.set_boundary(LoopBoundaryType::LoopOut, 480);
        assert_eq!(boundaries.range(), None);
    }
}
