//! Discretization log schema — the contract between the discretizer and
//! everything downstream.
//!
//! The schema is parseable, ordered, and carries side-channels for
//! effort/shock measurement and cross-scale analysis. The guiding rule:
//! log everything, filter later — the discretizer embeds no assumptions
//! about what matters.

use crate::domain::{Direction, Scale};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Version of the discretizer implementation recorded in every log.
pub const DISCRETIZER_VERSION: &str = "1.0";

/// Version of the swing detector whose output feeds the discretizer.
pub const SWING_DETECTOR_VERSION: &str = "v2.3";

/// Version tag of the default level set.
pub const LEVEL_SET_VERSION: &str = "v1.0";

/// Errors from discretization.
#[derive(Debug, Error)]
pub enum DiscretizeError {
    #[error("invalid discretizer config: {0}")]
    InvalidConfig(String),

    #[error("inconsistent swings: {0}")]
    InconsistentSwings(String),

    #[error("invalid bars: {0}")]
    InvalidBars(String),
}

/// How a level crossing is detected. `OpenCloseCross` and `WickTouch` are
/// reserved values that currently behave as `CloseCross`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossingSemantics {
    CloseCross,
    OpenCloseCross,
    WickTouch,
}

/// Runtime configuration for discretization, recorded verbatim in the
/// output log. Two logs are comparable iff their level_set and
/// level_set_version match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizerConfig {
    pub level_set: Vec<Decimal>,
    pub level_set_version: String,
    pub crossing_semantics: CrossingSemantics,
    /// Crossing tolerance as a fraction of the swing size.
    pub crossing_tolerance_pct: Decimal,
    /// Ratio below which a swing is invalidated, per scale.
    pub invalidation_thresholds: BTreeMap<Scale, Decimal>,
    /// Ring-buffer capacity per scale for the range median.
    pub rolling_window_sizes: BTreeMap<Scale, usize>,
    /// Gap threshold as a fraction of the previous close.
    pub gap_threshold_pct: Decimal,
    pub swing_detector_version: String,
    pub discretizer_version: String,
}

impl Default for DiscretizerConfig {
    fn default() -> Self {
        Self {
            level_set: vec![
                dec!(-0.15),
                dec!(-0.10),
                dec!(0.0),
                dec!(0.236),
                dec!(0.382),
                dec!(0.5),
                dec!(0.618),
                dec!(0.786),
                dec!(1.0),
                dec!(1.236),
                dec!(1.382),
                dec!(1.5),
                dec!(1.618),
                dec!(1.786),
                dec!(2.0),
                dec!(2.236),
            ],
            level_set_version: LEVEL_SET_VERSION.to_string(),
            crossing_semantics: CrossingSemantics::CloseCross,
            crossing_tolerance_pct: dec!(0.001),
            invalidation_thresholds: BTreeMap::from([
                (Scale::S, dec!(-0.10)),
                (Scale::M, dec!(-0.10)),
                (Scale::L, dec!(-0.15)),
                (Scale::XL, dec!(-0.15)),
            ]),
            rolling_window_sizes: BTreeMap::from([
                (Scale::S, 20),
                (Scale::M, 50),
                (Scale::L, 100),
                (Scale::XL, 200),
            ]),
            gap_threshold_pct: dec!(0.005),
            swing_detector_version: SWING_DETECTOR_VERSION.to_string(),
            discretizer_version: DISCRETIZER_VERSION.to_string(),
        }
    }
}

impl DiscretizerConfig {
    /// Validate once before a run. The level set must be non-empty and
    /// strictly increasing; thresholds must be non-negative fractions.
    pub fn validate(&self) -> Result<(), DiscretizeError> {
        if self.level_set.is_empty() {
            return Err(DiscretizeError::InvalidConfig("empty level_set".into()));
        }
        if !self.level_set.windows(2).all(|w| w[0] < w[1]) {
            return Err(DiscretizeError::InvalidConfig(
                "level_set must be strictly increasing".into(),
            ));
        }
        if self.crossing_tolerance_pct < Decimal::ZERO {
            return Err(DiscretizeError::InvalidConfig(
                "crossing_tolerance_pct must be non-negative".into(),
            ));
        }
        if self.gap_threshold_pct < Decimal::ZERO {
            return Err(DiscretizeError::InvalidConfig(
                "gap_threshold_pct must be non-negative".into(),
            ));
        }
        for scale in Scale::ALL {
            if !self.invalidation_thresholds.contains_key(&scale) {
                return Err(DiscretizeError::InvalidConfig(format!(
                    "missing invalidation threshold for scale {scale}"
                )));
            }
            match self.rolling_window_sizes.get(&scale) {
                Some(size) if *size > 0 => {}
                _ => {
                    return Err(DiscretizeError::InvalidConfig(format!(
                        "rolling window size for scale {scale} must be positive"
                    )))
                }
            }
        }
        Ok(())
    }
}

/// Types of discretization events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LevelCross,
    LevelTest,
    Completion,
    Invalidation,
    SwingFormed,
    SwingTerminated,
}

/// Effort side-channel: how hard price worked inside the band it just left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortAnnotation {
    /// Bars spent in the outgoing band.
    pub dwell_bars: u64,
    /// Approach-retreat wick probes past the band boundary that closed back
    /// inside.
    pub test_count: u32,
    /// Deepest such excursion past the boundary, in ratio units.
    pub max_probe_r: Option<Decimal>,
}

/// Shock side-channel: how violent this bar was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShockAnnotation {
    /// Levels crossed on this bar.
    pub levels_jumped: usize,
    /// Bar range over the rolling median range for the swing's scale.
    pub range_multiple: Decimal,
    /// Gap size over the median range, when the bar gapped.
    pub gap_multiple: Option<Decimal>,
    pub is_gap: bool,
}

/// Parent side-channel: the nearest larger-scale swing that is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentContext {
    pub scale: Scale,
    pub swing_id: String,
    pub band: String,
    pub direction: Direction,
    pub ratio: Decimal,
}

/// One event in the log. `data` carries the event-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizationEvent {
    pub bar: u64,
    /// ISO-8601 timestamp of the bar.
    pub timestamp: String,
    pub swing_id: String,
    pub event_type: EventType,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<EffortAnnotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shock: Option<ShockAnnotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<ParentContext>,
}

/// Lifecycle status of a swing entry in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingEntryStatus {
    Active,
    Completed,
    Invalidated,
}

/// A swing as recorded in the log: oriented anchors plus lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingEntry {
    pub swing_id: String,
    pub scale: Scale,
    pub direction: Direction,
    /// Defended pivot price (ratio 0).
    pub anchor0: Decimal,
    /// Origin extremum price (ratio 1).
    pub anchor1: Decimal,
    pub anchor0_bar: u64,
    pub anchor1_bar: u64,
    pub formed_at_bar: u64,
    pub status: SwingEntryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at_bar: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

/// Run-level metadata recorded with every log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizationMeta {
    pub instrument: String,
    pub source_resolution: String,
    pub date_range_start: String,
    pub date_range_end: String,
    pub created_at: String,
    pub config: DiscretizerConfig,
}

/// The complete discretization output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscretizationLog {
    pub meta: DiscretizationMeta,
    pub swings: Vec<SwingEntry>,
    pub events: Vec<DiscretizationEvent>,
}

/// Structural validation of a log. Returns collected problems; empty means
/// valid.
pub fn validate_log(log: &DiscretizationLog) -> Vec<String> {
    let mut errors = Vec::new();

    if !log.events.windows(2).all(|w| w[0].bar <= w[1].bar) {
        errors.push("events are not sorted by bar".to_string());
    }
    for event in &log.events {
        if !log.swings.iter().any(|s| s.swing_id == event.swing_id) {
            errors.push(format!(
                "event at bar {} references unknown swing {}",
                event.bar, event.swing_id
            ));
        }
    }
    if let Err(e) = log.meta.config.validate() {
        errors.push(e.to_string());
    }
    errors
}

/// Field-by-field config differences, for comparability warnings.
pub fn compare_configs(a: &DiscretizerConfig, b: &DiscretizerConfig) -> Vec<String> {
    let mut diffs = Vec::new();
    if a.level_set_version != b.level_set_version {
        diffs.push(format!(
            "level_set_version differs: {} vs {}",
            a.level_set_version, b.level_set_version
        ));
    }
    if a.level_set != b.level_set {
        diffs.push(format!(
            "level_set differs: {} levels vs {} levels",
            a.level_set.len(),
            b.level_set.len()
        ));
    }
    if a.crossing_semantics != b.crossing_semantics {
        diffs.push(format!(
            "crossing_semantics differs: {:?} vs {:?}",
            a.crossing_semantics, b.crossing_semantics
        ));
    }
    if a.crossing_tolerance_pct != b.crossing_tolerance_pct {
        diffs.push(format!(
            "crossing_tolerance_pct differs: {} vs {}",
            a.crossing_tolerance_pct, b.crossing_tolerance_pct
        ));
    }
    if a.invalidation_thresholds != b.invalidation_thresholds {
        diffs.push("invalidation_thresholds differ".to_string());
    }
    if a.rolling_window_sizes != b.rolling_window_sizes {
        diffs.push("rolling_window_sizes differ".to_string());
    }
    if a.gap_threshold_pct != b.gap_threshold_pct {
        diffs.push(format!(
            "gap_threshold_pct differs: {} vs {}",
            a.gap_threshold_pct, b.gap_threshold_pct
        ));
    }
    if a.swing_detector_version != b.swing_detector_version {
        diffs.push(format!(
            "swing_detector_version differs: {} vs {}",
            a.swing_detector_version, b.swing_detector_version
        ));
    }
    if a.discretizer_version != b.discretizer_version {
        diffs.push(format!(
            "discretizer_version differs: {} vs {}",
            a.discretizer_version, b.discretizer_version
        ));
    }
    diffs
}

/// Comparability check: level set identity is what makes two logs speak
/// the same language.
pub fn configs_comparable(a: &DiscretizerConfig, b: &DiscretizerConfig) -> bool {
    a.level_set_version == b.level_set_version && a.level_set == b.level_set
}
