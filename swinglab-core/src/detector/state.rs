//! Detector state — the serializable snapshot between bars.
//!
//! Everything the per-bar pipeline mutates lives here, so pause/resume is a
//! snapshot/restore of this one struct. A detector restored from a snapshot
//! and fed the next bar produces exactly what an uninterrupted detector
//! would.

use crate::detector::leg::{Leg, PendingOrigin};
use crate::detector::population::ImpulsePopulation;
use crate::detector::swing::SwingNode;
use crate::domain::{Bar, Direction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from detector input handling and state restore.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid bar {index}: {reason}")]
    InvalidBar { index: u64, reason: String },

    #[error("invalid state snapshot: {0}")]
    InvalidState(String),
}

/// A pair of per-direction slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByDirection<T> {
    pub bull: T,
    pub bear: T,
}

impl<T> ByDirection<T> {
    pub fn get(&self, direction: Direction) -> &T {
        match direction {
            Direction::Bull => &self.bull,
            Direction::Bear => &self.bear,
        }
    }

    pub fn get_mut(&mut self, direction: Direction) -> &mut T {
        match direction {
            Direction::Bull => &mut self.bull,
            Direction::Bear => &mut self.bear,
        }
    }

    pub fn set(&mut self, direction: Direction, value: T) {
        *self.get_mut(direction) = value;
    }
}

/// Serializable state for pause/resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorState {
    /// Most recent bar index processed.
    pub last_bar_index: Option<u64>,
    /// Previous bar, for type classification.
    pub prev_bar: Option<Bar>,
    /// Currently tracked legs; bull and bear coexist.
    pub active_legs: Vec<Leg>,
    /// Swings formed from legs, in formation order.
    pub active_swings: Vec<SwingNode>,
    /// At most one candidate origin per direction.
    pub pending_origins: ByDirection<Option<PendingOrigin>>,
    /// Bar index where each direction's current turn started.
    pub last_turn_bar: ByDirection<Option<u64>>,
    /// Most recent directional bar type seen.
    pub prev_bar_type: Option<Direction>,
    /// Sorted impulse values of all formed legs, for percentile lookup.
    pub formed_leg_impulses: ImpulsePopulation,
    /// Whether any leg of each direction has ever been created. Legs created
    /// before the opposite direction bootstraps are exempt from turn-ratio
    /// pruning.
    pub has_created_bull_leg: bool,
    pub has_created_bear_leg: bool,
}

impl DetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_leg(&self, leg_id: &str) -> Option<&Leg> {
        self.active_legs.iter().find(|l| l.leg_id == leg_id)
    }

    pub fn find_leg_mut(&mut self, leg_id: &str) -> Option<&mut Leg> {
        self.active_legs.iter_mut().find(|l| l.leg_id == leg_id)
    }

    pub fn has_bootstrapped(&self, direction: Direction) -> bool {
        match direction {
            Direction::Bull => self.has_created_bull_leg,
            Direction::Bear => self.has_created_bear_leg,
        }
    }

    pub fn mark_bootstrapped(&mut self, direction: Direction) {
        match direction {
            Direction::Bull => self.has_created_bull_leg = true,
            Direction::Bear => self.has_created_bear_leg = true,
        }
    }

    /// Serialize to the snapshot JSON form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("detector state serializes")
    }

    /// Restore from snapshot JSON, validating structural invariants. A
    /// failed restore constructs nothing.
    pub fn from_json(json: &str) -> Result<Self, DetectorError> {
        let state: DetectorState =
            serde_json::from_str(json).map_err(|e| DetectorError::InvalidState(e.to_string()))?;
        state.check_integrity()?;
        Ok(state)
    }

    /// Structural invariants a snapshot must satisfy.
    pub fn check_integrity(&self) -> Result<(), DetectorError> {
        for leg in &self.active_legs {
            if leg.origin_index > leg.pivot_index {
                return Err(DetectorError::InvalidState(format!(
                    "leg {} has origin_index {} after pivot_index {}",
                    leg.leg_id, leg.origin_index, leg.pivot_index
                )));
            }
            if let Some(breach) = leg.max_origin_breach {
                if breach <= Decimal::ZERO {
                    return Err(DetectorError::InvalidState(format!(
                        "leg {} has non-positive origin breach {breach}",
                        leg.leg_id
                    )));
                }
            }
            if let Some(breach) = leg.max_pivot_breach {
                if breach <= Decimal::ZERO {
                    return Err(DetectorError::InvalidState(format!(
                        "leg {} has non-positive pivot breach {breach}",
                        leg.leg_id
                    )));
                }
            }
        }
        if !self.formed_leg_impulses.is_sorted() {
            return Err(DetectorError::InvalidState(
                "formed_leg_impulses is not sorted".into(),
            ));
        }
        self.check_parent_links()
    }

    /// Walk every parent chain with a visited set: self-parents and cycles
    /// in restored input must not hang the detector.
    fn check_parent_links(&self) -> Result<(), DetectorError> {
        use std::collections::HashSet;
        for leg in &self.active_legs {
            let mut visited: HashSet<&str> = HashSet::new();
            let mut current = leg;
            while let Some(parent_id) = current.parent_leg_id.as_deref() {
                if !visited.insert(current.leg_id.as_str()) {
                    return Err(DetectorError::InvalidState(format!(
                        "parent cycle through leg {}",
                        leg.leg_id
                    )));
                }
                if parent_id == current.leg_id {
                    return Err(DetectorError::InvalidState(format!(
                        "leg {} is its own parent",
                        current.leg_id
                    )));
                }
                match self.find_leg(parent_id) {
                    Some(parent) => current = parent,
                    None => break, // dangling parent ids are tolerated
                }
            }
        }
        Ok(())
    }
}
