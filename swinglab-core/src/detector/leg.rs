//! Leg and PendingOrigin — the working units of the structural layer.
//!
//! Terminology:
//! - Origin: where the move started (fixed once the leg exists)
//! - Pivot: the current defended extreme (extends as the leg grows)
//!
//! Bull leg: origin at LOW -> pivot at HIGH. Bear leg: origin at HIGH ->
//! pivot at LOW.

use crate::domain::{ids, Direction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which price component produced a pending origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginSource {
    High,
    Low,
    PivotExtension,
    Open,
    Close,
}

/// A potential origin for a new leg awaiting temporal confirmation.
///
/// For bull legs this tracks LOWs, for bear legs HIGHs. At most one is
/// retained per direction; a more extreme candidate replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrigin {
    pub price: Decimal,
    pub bar_index: u64,
    pub direction: Direction,
    pub source: OriginSource,
}

/// Lifecycle status of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegStatus {
    Active,
    Stale,
    Pruned,
    Invalidated,
}

/// A directional price movement with known temporal ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Deterministic id derived from (direction, origin_price, origin_index).
    pub leg_id: String,
    pub direction: Direction,
    pub origin_price: Decimal,
    pub origin_index: u64,
    pub pivot_price: Decimal,
    pub pivot_index: u64,
    /// Fraction of the range price has covered from origin toward pivot.
    pub retracement_pct: Decimal,
    /// Whether the formation threshold has been reached.
    pub formed: bool,
    /// Set once the leg forms into a swing.
    pub swing_id: Option<String>,
    pub parent_leg_id: Option<String>,
    pub status: LegStatus,
    pub bar_count: u64,
    pub last_modified_bar: u64,
    pub price_at_creation: Decimal,
    /// Maximum breach beyond the origin; None until the first breach, then
    /// monotonically non-decreasing.
    pub max_origin_breach: Option<Decimal>,
    /// Maximum breach beyond the pivot (tracked for formed legs only).
    pub max_pivot_breach: Option<Decimal>,

    /// Points per bar over the leg's span.
    pub impulse: f64,
    /// Percentile rank (0-100) of impulse against the formed population.
    pub impulsiveness: Option<f64>,
    /// 0-100 sigmoid-mapped skew of per-bar contributions (n >= 3).
    pub spikiness: Option<f64>,
    pub moment_n: u64,
    pub moment_sum_x: f64,
    pub moment_sum_x2: f64,
    pub moment_sum_x3: f64,

    /// Counter-trend range at the origin, captured once at creation. None
    /// before the opposite direction has bootstrapped.
    pub origin_counter_trend_range: Option<f64>,
    /// Running counter-trend range used by turn-ratio pruning.
    pub max_counter_leg_range: Option<f64>,
    /// Filled during the min-CTR pruning pass.
    pub counter_trend_ratio: Option<f64>,

    /// Deepest point of the origin -> pivot -> child-origin segment.
    pub segment_deepest_price: Option<Decimal>,
    pub segment_deepest_index: Option<u64>,
    pub impulse_to_deepest: Option<f64>,
    pub impulse_back: Option<f64>,
}

impl Leg {
    /// Create a fresh active leg. The id is derived from the origin.
    pub fn new(
        direction: Direction,
        origin_price: Decimal,
        origin_index: u64,
        pivot_price: Decimal,
        pivot_index: u64,
    ) -> Self {
        Self {
            leg_id: ids::leg_id(direction, origin_price, origin_index),
            direction,
            origin_price,
            origin_index,
            pivot_price,
            pivot_index,
            retracement_pct: Decimal::ZERO,
            formed: false,
            swing_id: None,
            parent_leg_id: None,
            status: LegStatus::Active,
            bar_count: 0,
            last_modified_bar: pivot_index,
            price_at_creation: Decimal::ZERO,
            max_origin_breach: None,
            max_pivot_breach: None,
            impulse: 0.0,
            impulsiveness: None,
            spikiness: None,
            moment_n: 0,
            moment_sum_x: 0.0,
            moment_sum_x2: 0.0,
            moment_sum_x3: 0.0,
            origin_counter_trend_range: None,
            max_counter_leg_range: None,
            counter_trend_ratio: None,
            segment_deepest_price: None,
            segment_deepest_index: None,
            impulse_to_deepest: None,
            impulse_back: None,
        }
    }

    /// Absolute range of the leg.
    pub fn range(&self) -> Decimal {
        (self.origin_price - self.pivot_price).abs()
    }

    /// True if price has ever breached the origin.
    pub fn origin_breached(&self) -> bool {
        self.max_origin_breach.is_some()
    }

    /// True if price has ever breached the pivot.
    pub fn pivot_breached(&self) -> bool {
        self.max_pivot_breach.is_some()
    }

    /// A live leg is active with an unbreached origin.
    pub fn is_live(&self) -> bool {
        self.status == LegStatus::Active && !self.origin_breached()
    }

    /// Move the pivot to a new extreme and recompute the impulse.
    pub fn update_pivot(&mut self, price: Decimal, bar_index: u64) {
        self.pivot_price = price;
        self.pivot_index = bar_index;
        self.impulse = impulse(self.range(), self.origin_index, self.pivot_index);
    }

    /// Counter-trend pressure at the origin relative to this leg's range.
    /// None means the leg predates the opposite direction's bootstrap and is
    /// exempt from turn-ratio pruning.
    pub fn turn_ratio(&self) -> Option<f64> {
        let max = self.max_counter_leg_range?;
        let range = self.range().to_f64().unwrap_or(0.0);
        if range == 0.0 {
            return Some(0.0);
        }
        Some(max / range)
    }

    /// Net segment impulse: primary move intensity minus counter-move
    /// intensity. None until a child has anchored the segment.
    pub fn net_segment_impulse(&self) -> Option<f64> {
        Some(self.impulse_to_deepest? - self.impulse_back?)
    }
}

/// Impulse score (points per bar) for a span of bars.
pub fn impulse(range: Decimal, origin_index: u64, pivot_index: u64) -> f64 {
    let bars = pivot_index.abs_diff(origin_index);
    if bars == 0 {
        return 0.0;
    }
    range.to_f64().unwrap_or(0.0) / bars as f64
}

/// Spikiness (0-100) from running moments using Fisher's skewness, mapped
/// through a sigmoid. Defined only once n >= 3; ~50 is neutral, high values
/// mean outlier bars drove the move.
pub fn spikiness(n: u64, sum_x: f64, sum_x2: f64, sum_x3: f64) -> Option<f64> {
    if n < 3 {
        return None;
    }
    let n = n as f64;
    let mean = sum_x / n;
    let variance = sum_x2 / n - mean * mean;
    if variance < 1e-10 {
        return Some(50.0);
    }
    let std_dev = variance.sqrt();
    // E[(X - mean)^3] = E[X^3] - 3*mean*E[X^2] + 2*mean^3
    let third_moment = sum_x3 / n - 3.0 * mean * (sum_x2 / n) + 2.0 * mean.powi(3);
    let skewness = third_moment / std_dev.powi(3);
    Some(100.0 / (1.0 + (-skewness).exp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bull_leg() -> Leg {
        Leg::new(Direction::Bull, dec!(100.00), 10, dec!(110.00), 15)
    }

    #[test]
    fn leg_id_is_deterministic() {
        let a = bull_leg();
        let mut b = bull_leg();
        b.update_pivot(dec!(120.00), 20);
        // Same origin properties mean same id regardless of the pivot.
        assert_eq!(a.leg_id, b.leg_id);
        assert_eq!(a.leg_id, "leg_bull_100.00_10");
    }

    #[test]
    fn range_is_absolute() {
        let bull = bull_leg();
        assert_eq!(bull.range(), dec!(10.00));
        let bear = Leg::new(Direction::Bear, dec!(110.00), 10, dec!(100.00), 15);
        assert_eq!(bear.range(), dec!(10.00));
    }

    #[test]
    fn pivot_update_recomputes_impulse() {
        let mut leg = bull_leg();
        leg.update_pivot(dec!(120), 20);
        assert_eq!(leg.pivot_price, dec!(120));
        assert!((leg.impulse - 2.0).abs() < 1e-12); // 20 points / 10 bars
    }

    #[test]
    fn live_requires_unbreached_origin() {
        let mut leg = bull_leg();
        assert!(leg.is_live());
        leg.max_origin_breach = Some(dec!(1.5));
        assert!(!leg.is_live());
    }

    #[test]
    fn turn_ratio_exempt_before_bootstrap() {
        let leg = bull_leg();
        assert_eq!(leg.turn_ratio(), None);
    }

    #[test]
    fn turn_ratio_zero_when_no_counter_leg() {
        let mut leg = bull_leg();
        leg.max_counter_leg_range = Some(0.0);
        assert_eq!(leg.turn_ratio(), Some(0.0));
    }

    #[test]
    fn turn_ratio_relative_to_own_range() {
        let mut leg = bull_leg();
        leg.max_counter_leg_range = Some(25.0);
        assert_eq!(leg.turn_ratio(), Some(2.5));
    }

    #[test]
    fn impulse_zero_span_guard() {
        assert_eq!(impulse(dec!(10), 5, 5), 0.0);
    }

    #[test]
    fn spikiness_needs_three_samples() {
        assert_eq!(spikiness(2, 1.0, 1.0, 1.0), None);
    }

    #[test]
    fn spikiness_neutral_for_identical_contributions() {
        // Three identical contributions: zero variance, neutral 50.
        let x = 2.0_f64;
        assert_eq!(spikiness(3, 3.0 * x, 3.0 * x * x, 3.0 * x * x * x), Some(50.0));
    }

    #[test]
    fn spikiness_rises_with_positive_skew() {
        // Two small contributions and one spike.
        let xs = [0.1, 0.1, 5.0];
        let sum: f64 = xs.iter().sum();
        let sum2: f64 = xs.iter().map(|x| x * x).sum();
        let sum3: f64 = xs.iter().map(|x| x * x * x).sum();
        let s = spikiness(3, sum, sum2, sum3).unwrap();
        assert!(s > 50.0, "spike-driven move should score above neutral, got {s}");
    }
}
