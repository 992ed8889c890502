//! SwingNode — a confirmed directional structure.

use crate::domain::{ids, Direction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a swing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingStatus {
    Active,
    Invalidated,
    Completed,
}

/// A confirmed swing: two anchor extremes with the bars that made them.
///
/// Created when a leg crosses the formation threshold. A bull swing defends
/// its low; a bear swing defends its high.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingNode {
    pub swing_id: String,
    pub direction: Direction,
    pub high_price: Decimal,
    pub high_bar_index: u64,
    pub low_price: Decimal,
    pub low_bar_index: u64,
    pub status: SwingStatus,
    pub formed_at_bar: u64,
}

impl SwingNode {
    /// Build the swing for a formed leg. The leg's origin/pivot map onto the
    /// swing's low/high depending on direction.
    pub fn from_formed_leg(
        direction: Direction,
        origin_price: Decimal,
        origin_index: u64,
        pivot_price: Decimal,
        pivot_index: u64,
        formed_at_bar: u64,
    ) -> Self {
        let swing_id = ids::swing_id(direction, origin_price, origin_index);
        match direction {
            Direction::Bull => Self {
                swing_id,
                direction,
                low_price: origin_price,
                low_bar_index: origin_index,
                high_price: pivot_price,
                high_bar_index: pivot_index,
                status: SwingStatus::Active,
                formed_at_bar,
            },
            Direction::Bear => Self {
                swing_id,
                direction,
                high_price: origin_price,
                high_bar_index: origin_index,
                low_price: pivot_price,
                low_bar_index: pivot_index,
                status: SwingStatus::Active,
                formed_at_bar,
            },
        }
    }

    /// The anchor the swing defends: low for bull, high for bear.
    pub fn defended_pivot(&self) -> Decimal {
        match self.direction {
            Direction::Bull => self.low_price,
            Direction::Bear => self.high_price,
        }
    }

    /// The anchor opposite the defended pivot.
    pub fn origin(&self) -> Decimal {
        match self.direction {
            Direction::Bull => self.high_price,
            Direction::Bear => self.low_price,
        }
    }

    pub fn range(&self) -> Decimal {
        self.high_price - self.low_price
    }

    pub fn is_active(&self) -> bool {
        self.status == SwingStatus::Active
    }

    pub fn invalidate(&mut self) {
        self.status = SwingStatus::Invalidated;
    }

    pub fn complete(&mut self) {
        self.status = SwingStatus::Completed;
    }
}
