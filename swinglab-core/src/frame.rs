//! ReferenceFrame — oriented coordinate system for bull/bear swings.
//!
//! A frame maps absolute prices into a direction-independent ratio axis:
//! - ratio 0 is the defended pivot (anchor0)
//! - ratio 1 is the origin extremum (anchor1)
//! - ratio 2 is the completion target
//! - negative ratios are stop-run territory beyond the defended pivot
//!
//! For a bull swing anchor0 is the low and anchor1 the high; for a bear
//! swing they are reversed. All structural predicates downstream (formation,
//! violation, completion, level crossings) are written against ratios, which
//! removes direction-specific branching everywhere but here.

use crate::domain::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing a reference frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("anchor0 and anchor1 must differ (zero range)")]
    ZeroRange,
}

/// Immutable oriented reference frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFrame {
    anchor0: Decimal,
    anchor1: Decimal,
    direction: Direction,
}

impl ReferenceFrame {
    /// Build a frame from its two anchors. Fails on zero range.
    pub fn new(anchor0: Decimal, anchor1: Decimal, direction: Direction) -> Result<Self, FrameError> {
        if anchor0 == anchor1 {
            return Err(FrameError::ZeroRange);
        }
        Ok(Self {
            anchor0,
            anchor1,
            direction,
        })
    }

    /// Build a bull frame (anchor0 = low, anchor1 = high) or bear frame
    /// (anchor0 = high, anchor1 = low) from the swing's extremes.
    pub fn from_extremes(low: Decimal, high: Decimal, direction: Direction) -> Result<Self, FrameError> {
        match direction {
            Direction::Bull => Self::new(low, high, direction),
            Direction::Bear => Self::new(high, low, direction),
        }
    }

    /// The defended pivot price (ratio 0).
    pub fn anchor0(&self) -> Decimal {
        self.anchor0
    }

    /// The origin extremum price (ratio 1).
    pub fn anchor1(&self) -> Decimal {
        self.anchor1
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Signed range: anchor1 - anchor0. Positive for bull, negative for bear.
    pub fn range(&self) -> Decimal {
        self.anchor1 - self.anchor0
    }

    /// Convert an absolute price to a ratio in this frame.
    pub fn ratio(&self, price: Decimal) -> Decimal {
        (price - self.anchor0) / self.range()
    }

    /// Convert a ratio back to an absolute price.
    pub fn price(&self, ratio: Decimal) -> Decimal {
        self.anchor0 + ratio * self.range()
    }

    /// Price of a Fibonacci level in this frame.
    pub fn get_fib_price(&self, level: Decimal) -> Decimal {
        self.price(level)
    }

    /// Price has violated the defended pivot beyond the tolerance.
    pub fn is_violated(&self, price: Decimal, tolerance: Decimal) -> bool {
        self.ratio(price) < -tolerance
    }

    /// Price has retraced at least the formation fib (inclusive).
    pub fn is_formed(&self, price: Decimal, formation_fib: Decimal) -> bool {
        self.ratio(price) >= formation_fib
    }

    /// Price has reached the completion target (inclusive).
    pub fn is_completed(&self, price: Decimal, threshold: Decimal) -> bool {
        self.ratio(price) >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bull_frame() -> ReferenceFrame {
        // Bull swing: defended low 5000, origin high 5100.
        ReferenceFrame::new(dec!(5000), dec!(5100), Direction::Bull).unwrap()
    }

    fn bear_frame() -> ReferenceFrame {
        // Bear swing: defended high 5100, origin low 5000.
        ReferenceFrame::new(dec!(5100), dec!(5000), Direction::Bear).unwrap()
    }

    #[test]
    fn zero_range_rejected() {
        let err = ReferenceFrame::new(dec!(5000), dec!(5000), Direction::Bull).unwrap_err();
        assert_eq!(err, FrameError::ZeroRange);
    }

    #[test]
    fn semantic_anchors() {
        let frame = bull_frame();
        assert_eq!(frame.ratio(dec!(5000)), dec!(0));
        assert_eq!(frame.ratio(dec!(5100)), dec!(1));
        assert_eq!(frame.ratio(dec!(5200)), dec!(2));
    }

    #[test]
    fn bear_frame_is_symmetric() {
        let frame = bear_frame();
        assert_eq!(frame.ratio(dec!(5100)), dec!(0));
        assert_eq!(frame.ratio(dec!(5000)), dec!(1));
        assert_eq!(frame.ratio(dec!(4900)), dec!(2));
        // Below the defended high is negative territory.
        assert!(frame.ratio(dec!(5116)) < dec!(-0.15));
    }

    #[test]
    fn price_ratio_roundtrip() {
        let frame = bull_frame();
        for p in [dec!(4980), dec!(5000), dec!(5023.25), dec!(5100), dec!(5200)] {
            assert_eq!(frame.price(frame.ratio(p)), p);
        }
    }

    #[test]
    fn fib_price() {
        let frame = bull_frame();
        assert_eq!(frame.get_fib_price(dec!(0.382)), dec!(5038.2));
        assert_eq!(frame.get_fib_price(dec!(2.0)), dec!(5200.0));
    }

    #[test]
    fn violation_uses_tolerance() {
        let frame = bull_frame();
        // -0.15 tolerance: 4984 is ratio -0.16, violated; 4986 is -0.14, held.
        assert!(frame.is_violated(dec!(4984), dec!(0.15)));
        assert!(!frame.is_violated(dec!(4986), dec!(0.15)));
        // Strict tolerance 0: any dip below the pivot violates.
        assert!(frame.is_violated(dec!(4999.99), dec!(0)));
        assert!(!frame.is_violated(dec!(5000), dec!(0)));
    }

    #[test]
    fn formation_is_inclusive() {
        let frame = bull_frame();
        let exactly = frame.price(dec!(0.287));
        assert!(frame.is_formed(exactly, dec!(0.287)));
        assert!(!frame.is_formed(exactly - dec!(0.01), dec!(0.287)));
    }

    #[test]
    fn completion_is_inclusive_at_two() {
        let frame = bull_frame();
        assert!(frame.is_completed(dec!(5200), dec!(2.0)));
        assert!(!frame.is_completed(dec!(5199.99), dec!(2.0)));
    }

    #[test]
    fn from_extremes_orients_by_direction() {
        let bull = ReferenceFrame::from_extremes(dec!(5000), dec!(5100), Direction::Bull).unwrap();
        assert_eq!(bull.anchor0(), dec!(5000));
        let bear = ReferenceFrame::from_extremes(dec!(5000), dec!(5100), Direction::Bear).unwrap();
        assert_eq!(bear.anchor0(), dec!(5100));
    }
}
