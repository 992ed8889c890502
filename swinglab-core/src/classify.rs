//! Bar classifier — labels each bar against its predecessor.
//!
//! The classification fixes the temporal order of the current bar's extremes
//! relative to the previous bar, which is what lets the leg detector anchor
//! origins and pivots without intra-bar data:
//! - Type 2-Bull: the previous bar's LOW occurred before the current HIGH
//! - Type 2-Bear: the previous bar's HIGH occurred before the current LOW
//! - Inside: both orderings hold between the two bars
//! - Outside: direction ambiguous; extremes extend but no leg is created
//!   from the previous bar's extremes on this bar alone

use crate::domain::{Bar, Direction};
use serde::{Deserialize, Serialize};

/// Relationship of a bar to its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarType {
    /// Type 1: high <= prev.high and low >= prev.low.
    Inside,
    /// Type 2-Bull: higher high and higher low.
    Type2Bull,
    /// Type 2-Bear: lower high and lower low.
    Type2Bear,
    /// Type 3: higher high and lower low (engulfing).
    Outside,
}

impl BarType {
    /// The trend direction a Type 2 bar asserts, if any.
    pub fn directional(self) -> Option<Direction> {
        match self {
            BarType::Type2Bull => Some(Direction::Bull),
            BarType::Type2Bear => Some(Direction::Bear),
            _ => None,
        }
    }
}

/// Classify `bar` against `prev`. Equal extremes count as not exceeding.
pub fn classify_bar(bar: &Bar, prev: &Bar) -> BarType {
    let higher_high = bar.high > prev.high;
    let lower_high = bar.high < prev.high;
    let higher_low = bar.low > prev.low;
    let lower_low = bar.low < prev.low;

    if higher_high && higher_low {
        BarType::Type2Bull
    } else if lower_high && lower_low {
        BarType::Type2Bear
    } else if higher_high && lower_low {
        BarType::Outside
    } else {
        BarType::Inside
    }
}
