//! Detector event stream — one closed, discriminated union.
//!
//! Every event carries the bar index and timestamp it occurred on plus the
//! id of the affected leg or swing. Within a bar the emission order follows
//! the per-bar pipeline, so the stream is a deterministic total order.

use crate::domain::Direction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a leg was pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    Engulfed,
    OriginProximityPrune,
    TurnRatioPrune,
    MinCounterTrend,
    InnerStructure,
    ExtensionPrune,
    SubtreePrune,
}

/// Why a swing was invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    OriginBreached,
    ToleranceExceeded,
}

/// Events emitted by the detector and reference layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwingEvent {
    LegCreated {
        bar_index: u64,
        timestamp: i64,
        leg_id: String,
        direction: Direction,
        origin_price: Decimal,
        origin_index: u64,
        pivot_price: Decimal,
        pivot_index: u64,
    },
    LegPruned {
        bar_index: u64,
        timestamp: i64,
        leg_id: String,
        swing_id: Option<String>,
        reason: PruneReason,
    },
    OriginBreached {
        bar_index: u64,
        timestamp: i64,
        leg_id: String,
        swing_id: Option<String>,
        breach_price: Decimal,
        breach_amount: Decimal,
    },
    PivotBreached {
        bar_index: u64,
        timestamp: i64,
        leg_id: String,
        swing_id: Option<String>,
        breach_price: Decimal,
        breach_amount: Decimal,
    },
    SwingFormed {
        bar_index: u64,
        timestamp: i64,
        swing_id: String,
        direction: Direction,
        high_price: Decimal,
        high_bar_index: u64,
        low_price: Decimal,
        low_bar_index: u64,
    },
    SwingInvalidated {
        bar_index: u64,
        timestamp: i64,
        swing_id: String,
        reason: InvalidationReason,
    },
    SwingCompleted {
        bar_index: u64,
        timestamp: i64,
        swing_id: String,
        completion_price: Decimal,
    },
    LevelCross {
        bar_index: u64,
        timestamp: i64,
        /// Id of the tracked leg whose frame the level belongs to.
        subject_id: String,
        level: Decimal,
        previous_level: Decimal,
        price: Decimal,
    },
}

impl SwingEvent {
    pub fn bar_index(&self) -> u64 {
        match self {
            SwingEvent::LegCreated { bar_index, .. }
            | SwingEvent::LegPruned { bar_index, .. }
            | SwingEvent::OriginBreached { bar_index, .. }
            | SwingEvent::PivotBreached { bar_index, .. }
            | SwingEvent::SwingFormed { bar_index, .. }
            | SwingEvent::SwingInvalidated { bar_index, .. }
            | SwingEvent::SwingCompleted { bar_index, .. }
            | SwingEvent::LevelCross { bar_index, .. } => *bar_index,
        }
    }
}
