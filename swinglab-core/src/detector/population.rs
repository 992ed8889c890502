//! Sorted population of formed-leg impulses for percentile ranking.
//!
//! The population only grows (one insert per formed swing) and is queried on
//! every bar for each live leg, so both operations are binary searches.
//! Re-sorting per bar is explicitly off the table.

use serde::{Deserialize, Serialize};

/// Non-decreasing collection of impulse values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImpulsePopulation {
    values: Vec<f64>,
}

impl ImpulsePopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Insert while keeping the values sorted. O(log n) search plus the
    /// vector shift.
    pub fn insert(&mut self, value: f64) {
        let pos = self.values.partition_point(|&v| v < value);
        self.values.insert(pos, value);
    }

    /// Percentile rank (0-100) of `value` against the population: the share
    /// of recorded values strictly below it. None on an empty population.
    pub fn percentile(&self, value: f64) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let below = self.values.partition_point(|&v| v < value);
        Some(below as f64 / self.values.len() as f64 * 100.0)
    }

    /// True when the values are in non-decreasing order. Used by invariant
    /// checks and state-restore validation.
    pub fn is_sorted(&self) -> bool {
        self.values.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}
