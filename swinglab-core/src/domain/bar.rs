//! Bar — the fundamental market data unit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLC bar for a single instrument at a single resolution step.
///
/// Bars are immutable once constructed: the detector consumes each bar
/// exactly once and never mutates it. `index` is the monotonic position in
/// the stream; `timestamp` is seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub index: u64,
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    pub fn new(
        index: u64,
        timestamp: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            index,
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// OHLC sanity check: low <= min(open, close) <= max(open, close) <= high.
    pub fn is_sane(&self) -> bool {
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }

    /// Bar range (high - low). Zero for a flat bar.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}
