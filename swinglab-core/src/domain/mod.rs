//! Domain types shared across the pipeline: bars, directions, scales, ids.

pub mod bar;
pub mod ids;

pub use bar::Bar;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a leg or swing.
///
/// A bull leg runs from a low origin up to a high pivot; a bear leg from a
/// high origin down to a low pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bull,
    Bear,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bull => Direction::Bear,
            Direction::Bear => Direction::Bull,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bull => f.write_str("bull"),
            Direction::Bear => f.write_str("bear"),
        }
    }
}

/// Qualitative size bucket for swings.
///
/// Scales parameterize lifecycle tolerances: S/M swings invalidate strictly
/// and can complete, L/XL swings tolerate pivot probes and never complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scale {
    S,
    M,
    L,
    XL,
}

impl Scale {
    /// The next larger scale, or None at the top of the hierarchy.
    pub fn parent(self) -> Option<Scale> {
        match self {
            Scale::S => Some(Scale::M),
            Scale::M => Some(Scale::L),
            Scale::L => Some(Scale::XL),
            Scale::XL => None,
        }
    }

    /// Big swings (L/XL) get tolerant invalidation and never complete.
    pub fn is_big(self) -> bool {
        matches!(self, Scale::L | Scale::XL)
    }

    pub const ALL: [Scale; 4] = [Scale::S, Scale::M, Scale::L, Scale::XL];
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::S => f.write_str("S"),
            Scale::M => f.write_str("M"),
            Scale::L => f.write_str("L"),
            Scale::XL => f.write_str("XL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposite() {
        assert_eq!(Direction::Bull.opposite(), Direction::Bear);
        assert_eq!(Direction::Bear.opposite(), Direction::Bull);
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Bull).unwrap(), "\"bull\"");
    }

    #[test]
    fn scale_hierarchy_walk() {
        assert_eq!(Scale::S.parent(), Some(Scale::M));
        assert_eq!(Scale::L.parent(), Some(Scale::XL));
        assert_eq!(Scale::XL.parent(), None);
    }

    #[test]
    fn big_scales() {
        assert!(!Scale::S.is_big());
        assert!(!Scale::M.is_big());
        assert!(Scale::L.is_big());
        assert!(Scale::XL.is_big());
    }
}
