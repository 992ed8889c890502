//! Deterministic identifiers for legs and swings.
//!
//! Ids are derived from the properties that define the entity, so two
//! detectors fed the same bars emit identical id streams. An id survives a
//! snapshot/restore cycle and a full re-run from scratch, which lets
//! embedders hold on to a leg across detector resets.

use crate::domain::Direction;
use rust_decimal::Decimal;

/// Deterministic leg id: `leg_{direction}_{origin_price}_{origin_index}`.
///
/// The pivot is deliberately excluded — a leg keeps its identity while its
/// pivot extends.
pub fn leg_id(direction: Direction, origin_price: Decimal, origin_index: u64) -> String {
    format!("leg_{direction}_{origin_price}_{origin_index}")
}

/// Deterministic swing id for a swing formed from a leg.
pub fn swing_id(direction: Direction, origin_price: Decimal, origin_index: u64) -> String {
    format!("swing_{direction}_{origin_price}_{origin_index}")
}
