//! Detector configuration — every tunable of the structural layer.
//!
//! A config is validated once at construction; a constructed value is
//! guaranteed internally consistent, so the per-bar pipeline never has to
//! re-check thresholds.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from config validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("formation_fib must be in (0, 1), got {0}")]
    FormationFibOutOfRange(Decimal),

    #[error("completion_threshold must be > 1, got {0}")]
    CompletionThresholdTooLow(Decimal),

    #[error("{name} must be non-negative, got {value}")]
    NegativeThreshold { name: &'static str, value: Decimal },

    #[error("{name} must be in (0, 1), got {value}")]
    BreachThresholdOutOfRange { name: &'static str, value: Decimal },
}

/// Survivor selection inside a proximity cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityPruneStrategy {
    /// Keep the earliest origin; ties broken by larger range.
    Oldest,
    /// Keep the largest counter-trend score; fall back to range, then age.
    CounterTrend,
}

/// Configuration for the leg detector and swing lifecycle rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Retracement fraction at which a leg forms into a swing (inclusive).
    pub formation_fib: Decimal,
    /// Recorded tuning: breach fraction considered structural for pivots.
    pub pivot_breach_threshold: Decimal,
    /// Recorded tuning: breach fraction considered structural for engulfment.
    pub engulfed_breach_threshold: Decimal,

    /// Remove legs whose origin and pivot have both been breached.
    pub enable_engulfed_prune: bool,
    /// Remove counter-legs anchored at refuted inner pivots.
    pub enable_inner_structure_prune: bool,
    /// Contained origins smaller than this fraction of the parent are pruned
    /// (0 disables).
    pub subtree_prune_threshold: Decimal,
    pub proximity_prune_strategy: ProximityPruneStrategy,
    /// Origin-proximity clustering: max relative range gap (0 disables).
    pub origin_range_prune_threshold: Decimal,
    /// Origin-proximity clustering: max relative age gap (0 disables).
    pub origin_time_prune_threshold: Decimal,
    /// Legs with counter_trend_ratio below this are pruned (0 disables).
    pub min_counter_trend_ratio: f64,
    /// Counter-legs at a new origin below this fraction of the new leg's
    /// range are pruned (0 disables).
    pub min_turn_threshold: Decimal,
    /// Creation-time branch ratio domination: R0 >= min_branch_ratio * R1
    /// (0 disables).
    pub min_branch_ratio: f64,
    /// Origin-breached child legs are pruned past this multiple of their
    /// range beyond the origin.
    pub stale_extension_threshold: Decimal,

    /// Ratio at which a small-scale reference completes (inclusive).
    pub completion_threshold: Decimal,
    /// Wick tolerance past the defended pivot for big (L/XL) references.
    pub big_wick_tolerance: Decimal,
    /// Close tolerance past the defended pivot for big (L/XL) references.
    pub big_close_tolerance: Decimal,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            formation_fib: dec!(0.287),
            pivot_breach_threshold: dec!(0.10),
            engulfed_breach_threshold: dec!(0.20),
            enable_engulfed_prune: true,
            enable_inner_structure_prune: true,
            subtree_prune_threshold: Decimal::ZERO,
            proximity_prune_strategy: ProximityPruneStrategy::Oldest,
            origin_range_prune_threshold: Decimal::ZERO,
            origin_time_prune_threshold: Decimal::ZERO,
            min_counter_trend_ratio: 0.0,
            min_turn_threshold: Decimal::ZERO,
            min_branch_ratio: 0.0,
            stale_extension_threshold: dec!(3.0),
            completion_threshold: dec!(2.0),
            big_wick_tolerance: dec!(0.15),
            big_close_tolerance: dec!(0.10),
        }
    }
}

impl DetectorConfig {
    /// Validate all thresholds. Call once before handing the config to a
    /// detector; a failed validation leaves nothing constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.formation_fib <= Decimal::ZERO || self.formation_fib >= Decimal::ONE {
            return Err(ConfigError::FormationFibOutOfRange(self.formation_fib));
        }
        if self.completion_threshold <= Decimal::ONE {
            return Err(ConfigError::CompletionThresholdTooLow(self.completion_threshold));
        }
        for (name, value) in [
            ("pivot_breach_threshold", self.pivot_breach_threshold),
            ("engulfed_breach_threshold", self.engulfed_breach_threshold),
        ] {
            if value <= Decimal::ZERO || value >= Decimal::ONE {
                return Err(ConfigError::BreachThresholdOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("subtree_prune_threshold", self.subtree_prune_threshold),
            ("origin_range_prune_threshold", self.origin_range_prune_threshold),
            ("origin_time_prune_threshold", self.origin_time_prune_threshold),
            ("min_turn_threshold", self.min_turn_threshold),
            ("stale_extension_threshold", self.stale_extension_threshold),
            ("big_wick_tolerance", self.big_wick_tolerance),
            ("big_close_tolerance", self.big_close_tolerance),
        ] {
            if value < Decimal::ZERO {
                return Err(ConfigError::NegativeThreshold { name, value });
            }
        }
        for (name, value) in [
            ("min_counter_trend_ratio", self.min_counter_trend_ratio),
            ("min_branch_ratio", self.min_branch_ratio),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeThreshold {
                    name,
                    value: Decimal::try_from(value).unwrap_or(Decimal::MIN),
                });
            }
        }
        Ok(())
    }

    /// Override the formation threshold.
    pub fn with_formation_fib(mut self, fib: Decimal) -> Self {
        self.formation_fib = fib;
        self
    }

    /// Enable origin-proximity pruning with the given thresholds.
    pub fn with_origin_prune(mut self, range_threshold: Decimal, time_threshold: Decimal) -> Self {
        self.origin_range_prune_threshold = range_threshold;
        self.origin_time_prune_threshold = time_threshold;
        self
    }

    /// Enable min counter-trend-ratio pruning.
    pub fn with_min_counter_trend(mut self, ratio: f64) -> Self {
        self.min_counter_trend_ratio = ratio;
        self
    }

    /// Enable turn-ratio pruning.
    pub fn with_min_turn_threshold(mut self, threshold: Decimal) -> Self {
        self.min_turn_threshold = threshold;
        self
    }

    /// Enable branch-ratio origin domination.
    pub fn with_min_branch_ratio(mut self, ratio: f64) -> Self {
        self.min_branch_ratio = ratio;
        self
    }
}
