//! Leg pruning — keeps the active set O(k).
//!
//! All passes operate on the detector state in place and report removals as
//! LegPruned events. The passes are:
//! - engulfed: both origin and pivot breached, structurally refuted
//! - origin-proximity: same-pivot clusters of interchangeable legs
//! - turn-ratio: counter-legs dwarfed by the move launching off their pivot
//! - min-CTR: legs without meaningful counter-trend pressure at their origin
//! - inner-structure: counter-legs anchored at refuted inner pivots
//! - subtree: contained same-direction legs below the size floor
//! - extension: origin-breached children stretched far past their origin
//!
//! Creation-time checks (domination, branch ratio) live here too since they
//! are the preventive side of the same policy.

use crate::config::{DetectorConfig, ProximityPruneStrategy};
use crate::detector::events::{PruneReason, SwingEvent};
use crate::detector::leg::{Leg, LegStatus};
use crate::detector::state::DetectorState;
use crate::domain::{Bar, Direction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Stateless pruning helper. Holds only the config; all state is passed in,
/// which keeps every pass independently testable.
pub struct LegPruner<'a> {
    config: &'a DetectorConfig,
}

impl<'a> LegPruner<'a> {
    pub fn new(config: &'a DetectorConfig) -> Self {
        Self { config }
    }

    // ── Creation-time checks ───────────────────────────────────────────

    /// Would a new leg at this origin be dominated by a live same-direction
    /// leg from the current turn? Bull: a lower-or-equal origin dominates;
    /// bear: a higher-or-equal origin. Legs from before the turn boundary
    /// never dominate, so nested subtrees can form after reversals.
    pub fn would_leg_be_dominated(
        &self,
        state: &DetectorState,
        direction: Direction,
        origin_price: Decimal,
    ) -> bool {
        let turn_start = state.last_turn_bar.get(direction).unwrap_or(0);
        state.active_legs.iter().any(|leg| {
            leg.direction == direction
                && leg.is_live()
                && leg.origin_index >= turn_start
                && match direction {
                    Direction::Bull => leg.origin_price <= origin_price,
                    Direction::Bear => leg.origin_price >= origin_price,
                }
        })
    }

    /// Branch-ratio origin domination: the counter-trend at the new origin
    /// (R0) must be at least `min_branch_ratio` times the counter-trend at
    /// the parent's origin (R1). Root legs are exempt; a missing R1 exempts
    /// the child; a missing R0 blocks it.
    pub fn is_origin_dominated_by_branch_ratio(
        &self,
        state: &DetectorState,
        direction: Direction,
        origin_price: Decimal,
        parent_leg_id: Option<&str>,
    ) -> bool {
        let min_ratio = self.config.min_branch_ratio;
        if min_ratio <= 0.0 {
            return false;
        }
        let Some(parent_id) = parent_leg_id else {
            return false;
        };
        let Some(parent) = state.find_leg(parent_id) else {
            return false;
        };
        let r1 = match counter_trend_range_at(state, direction, parent.origin_price) {
            Some(r1) if r1 > 0.0 => r1,
            _ => return false,
        };
        match counter_trend_range_at(state, direction, origin_price) {
            Some(r0) => r0 < min_ratio * r1,
            None => true,
        }
    }

    // ── Engulfed ───────────────────────────────────────────────────────

    /// Remove legs whose origin and pivot have both been breached.
    pub fn prune_engulfed_legs(
        &self,
        state: &mut DetectorState,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        if !self.config.enable_engulfed_prune {
            return Vec::new();
        }
        let victims: Vec<String> = state
            .active_legs
            .iter()
            .filter(|leg| leg.origin_breached() && leg.pivot_breached())
            .map(|leg| leg.leg_id.clone())
            .collect();
        self.remove_legs(state, &victims, PruneReason::Engulfed, bar, timestamp)
    }

    // ── Origin-proximity clustering ────────────────────────────────────

    /// Consolidate same-pivot legs whose origins are interchangeable in
    /// (range, time) space. Any swing on a pruned leg transfers to the
    /// cluster survivor.
    pub fn apply_origin_proximity_prune(
        &self,
        state: &mut DetectorState,
        direction: Direction,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        let range_threshold = self.config.origin_range_prune_threshold;
        let time_threshold = self.config.origin_time_prune_threshold;
        if range_threshold.is_zero() || time_threshold.is_zero() || bar.index == 0 {
            return Vec::new();
        }

        // Group by exact pivot: legs with different pivots found different
        // structure and are never interchangeable.
        let mut groups: HashMap<(Decimal, u64), Vec<String>> = HashMap::new();
        for leg in &state.active_legs {
            if leg.direction == direction && leg.status == LegStatus::Active {
                groups
                    .entry((leg.pivot_price, leg.pivot_index))
                    .or_default()
                    .push(leg.leg_id.clone());
            }
        }

        let current_bar = Decimal::from(bar.index);
        let mut events = Vec::new();

        // Deterministic group order: by pivot index, then price.
        let mut group_keys: Vec<(Decimal, u64)> = groups.keys().copied().collect();
        group_keys.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

        for key in group_keys {
            let ids = &groups[&key];
            if ids.len() < 2 {
                continue;
            }
            let mut members: Vec<Leg> = ids
                .iter()
                .filter_map(|id| state.find_leg(id).cloned())
                .collect();
            self.order_by_strategy(&mut members);

            let mut survivors: Vec<Leg> = vec![members[0].clone()];
            for leg in members.into_iter().skip(1) {
                let clustered = survivors.iter().any(|survivor| {
                    in_same_cluster(survivor, &leg, current_bar, range_threshold, time_threshold)
                });
                if clustered {
                    // Transfer a carried swing to the best survivor.
                    if let Some(swing_id) = leg.swing_id.clone() {
                        let target_id = survivors[0].leg_id.clone();
                        if let Some(target) = state.find_leg_mut(&target_id) {
                            if target.swing_id.is_none() {
                                target.swing_id = Some(swing_id);
                            }
                        }
                    }
                    events.extend(self.remove_legs(
                        state,
                        &[leg.leg_id.clone()],
                        PruneReason::OriginProximityPrune,
                        bar,
                        timestamp,
                    ));
                } else {
                    survivors.push(leg);
                }
            }
        }

        events
    }

    fn order_by_strategy(&self, members: &mut [Leg]) {
        match self.config.proximity_prune_strategy {
            // Earliest origin first; ties broken by larger range.
            ProximityPruneStrategy::Oldest => members.sort_by(|a, b| {
                a.origin_index
                    .cmp(&b.origin_index)
                    .then(b.range().cmp(&a.range()))
            }),
            // Largest counter-trend score first; fall back to range, then age.
            ProximityPruneStrategy::CounterTrend => members.sort_by(|a, b| {
                let score_a = a.origin_counter_trend_range.unwrap_or(0.0);
                let score_b = b.origin_counter_trend_range.unwrap_or(0.0);
                score_b
                    .partial_cmp(&score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.range().cmp(&a.range()))
                    .then(a.origin_index.cmp(&b.origin_index))
            }),
        }
    }

    // ── Turn-ratio ─────────────────────────────────────────────────────

    /// When a new leg launches off a turn, counter-legs ending at that turn
    /// whose recorded counter-trend range is below `min_turn_threshold` of
    /// the new leg's range are noise. Pre-bootstrap legs (no counter-trend
    /// recorded) are exempt; carriers of active swings are kept.
    pub fn prune_by_turn_ratio(
        &self,
        state: &mut DetectorState,
        new_leg_id: &str,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        let threshold = self.config.min_turn_threshold;
        if threshold.is_zero() {
            return Vec::new();
        }
        let Some(new_leg) = state.find_leg(new_leg_id) else {
            return Vec::new();
        };
        let opposite = new_leg.direction.opposite();
        let origin_price = new_leg.origin_price;
        let floor = threshold * new_leg.range();

        let active_swing_ids: Vec<String> = active_swing_ids(state);
        let victims: Vec<String> = state
            .active_legs
            .iter()
            .filter(|leg| {
                leg.direction == opposite
                    && leg.pivot_price == origin_price
                    && !carries_active_swing(leg, &active_swing_ids)
                    && match leg.max_counter_leg_range {
                        None => false, // bootstrap exempt
                        Some(max) => {
                            Decimal::try_from(max).unwrap_or(Decimal::ZERO) < floor
                        }
                    }
            })
            .map(|leg| leg.leg_id.clone())
            .collect();

        self.remove_legs(state, &victims, PruneReason::TurnRatioPrune, bar, timestamp)
    }

    // ── Min counter-trend ratio ────────────────────────────────────────

    /// Fill `counter_trend_ratio` on live legs of `direction` and prune the
    /// ones below the configured floor. A leg with no opposite-direction
    /// legs anywhere scores 1.0 (pass); one with opposite legs elsewhere but
    /// none at its origin also passes with 1.0 (absent counter-trend).
    pub fn apply_min_counter_trend_prune(
        &self,
        state: &mut DetectorState,
        direction: Direction,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        if self.config.min_counter_trend_ratio <= 0.0 {
            return Vec::new();
        }

        let opposite = direction.opposite();
        let mut ratios: Vec<(String, f64)> = Vec::new();
        for leg in &state.active_legs {
            if leg.direction != direction || leg.status != LegStatus::Active {
                continue;
            }
            let longest = state
                .active_legs
                .iter()
                .filter(|o| {
                    o.direction == opposite
                        && o.status == LegStatus::Active
                        && o.pivot_price == leg.origin_price
                })
                .map(|o| o.range())
                .max();
            let ratio = match longest {
                Some(ctr) if !leg.range().is_zero() => (ctr / leg.range()).to_f64().unwrap_or(1.0),
                _ => 1.0,
            };
            ratios.push((leg.leg_id.clone(), ratio));
        }

        let mut victims = Vec::new();
        for (leg_id, ratio) in ratios {
            if let Some(leg) = state.find_leg_mut(&leg_id) {
                leg.counter_trend_ratio = Some(ratio);
                if ratio < self.config.min_counter_trend_ratio {
                    victims.push(leg_id);
                }
            }
        }

        self.remove_legs(state, &victims, PruneReason::MinCounterTrend, bar, timestamp)
    }

    // ── Inner structure ────────────────────────────────────────────────

    /// When price refutes a nested structure (both the outer and an inner
    /// same-direction leg are origin-breached, inner strictly contained),
    /// the counter-leg anchored at the inner pivot duplicates the one at the
    /// outer pivot and is removed. The outer pivot is immune while a
    /// still-active or a larger refuted same-direction leg also anchors it.
    /// Swings are NOT immune from this rule.
    pub fn prune_inner_structure_legs(
        &self,
        state: &mut DetectorState,
        breached_leg_ids: &[String],
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        if !self.config.enable_inner_structure_prune {
            return Vec::new();
        }

        let breached: Vec<Leg> = breached_leg_ids
            .iter()
            .filter_map(|id| state.find_leg(id).cloned())
            .collect();
        if breached.len() < 2 {
            return Vec::new();
        }

        let mut victims: Vec<String> = Vec::new();
        for outer in &breached {
            for inner in &breached {
                if outer.leg_id == inner.leg_id || outer.direction != inner.direction {
                    continue;
                }
                if !strictly_contained(outer, inner) {
                    continue;
                }
                if self.outer_pivot_is_immune(state, outer) {
                    continue;
                }
                victims.extend(self.inner_pivot_duplicates(state, outer, inner));
            }
        }

        victims.sort();
        victims.dedup();
        self.remove_legs(state, &victims, PruneReason::InnerStructure, bar, timestamp)
    }

    /// Another same-direction leg anchored at the outer's pivot keeps the
    /// pivot structurally alive: still active, or refuted but larger than
    /// the outer itself.
    fn outer_pivot_is_immune(&self, state: &DetectorState, outer: &Leg) -> bool {
        state.active_legs.iter().any(|leg| {
            leg.leg_id != outer.leg_id
                && leg.direction == outer.direction
                && leg.pivot_price == outer.pivot_price
                && (leg.is_live() || leg.range() > outer.range())
        })
    }

    /// Opposite legs anchored at the inner pivot that share their current
    /// pivot with an opposite leg anchored at the outer pivot.
    fn inner_pivot_duplicates(&self, state: &DetectorState, outer: &Leg, inner: &Leg) -> Vec<String> {
        let opposite = outer.direction.opposite();
        let outer_anchored: Vec<Decimal> = state
            .active_legs
            .iter()
            .filter(|leg| leg.direction == opposite && leg.origin_price == outer.pivot_price)
            .map(|leg| leg.pivot_price)
            .collect();
        state
            .active_legs
            .iter()
            .filter(|leg| {
                leg.direction == opposite
                    && leg.origin_price == inner.pivot_price
                    && outer_anchored.contains(&leg.pivot_price)
            })
            .map(|leg| leg.leg_id.clone())
            .collect()
    }

    // ── Subtree ────────────────────────────────────────────────────────

    /// Prune live legs strictly contained in a larger same-direction leg
    /// when their range falls below `subtree_prune_threshold` of the
    /// container. Carriers of active swings are immune. Disabled at 0.
    pub fn prune_contained_subtrees(
        &self,
        state: &mut DetectorState,
        direction: Direction,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        let threshold = self.config.subtree_prune_threshold;
        if threshold.is_zero() {
            return Vec::new();
        }

        let mut legs: Vec<Leg> = state
            .active_legs
            .iter()
            .filter(|l| l.direction == direction && l.status == LegStatus::Active)
            .cloned()
            .collect();
        if legs.len() < 2 {
            return Vec::new();
        }
        legs.sort_by(|a, b| b.range().cmp(&a.range()));

        let active_swing_ids = active_swing_ids(state);
        let mut victims: Vec<String> = Vec::new();
        for (i, container) in legs.iter().enumerate() {
            if victims.contains(&container.leg_id) {
                continue;
            }
            let floor = threshold * container.range();
            for contained in legs.iter().skip(i + 1) {
                if victims.contains(&contained.leg_id) {
                    continue;
                }
                if carries_active_swing(contained, &active_swing_ids) {
                    continue;
                }
                if strictly_contained(container, contained) && contained.range() < floor {
                    victims.push(contained.leg_id.clone());
                }
            }
        }

        self.remove_legs(state, &victims, PruneReason::SubtreePrune, bar, timestamp)
    }

    // ── Extension ──────────────────────────────────────────────────────

    /// Origin-breached child legs are pruned once price stretches past
    /// their origin by `stale_extension_threshold` times their range. Root
    /// legs are preserved as the historical anchor of the move.
    pub fn prune_extended_children(
        &self,
        state: &mut DetectorState,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        let threshold = self.config.stale_extension_threshold;
        let victims: Vec<String> = state
            .active_legs
            .iter()
            .filter(|leg| {
                leg.origin_breached() && leg.parent_leg_id.is_some() && !leg.range().is_zero()
            })
            .filter(|leg| {
                let extension = threshold * leg.range();
                match leg.direction {
                    Direction::Bull => bar.low < leg.origin_price - extension,
                    Direction::Bear => bar.high > leg.origin_price + extension,
                }
            })
            .map(|leg| leg.leg_id.clone())
            .collect();

        self.remove_legs(state, &victims, PruneReason::ExtensionPrune, bar, timestamp)
    }

    // ── Shared removal path ────────────────────────────────────────────

    /// Mark, reparent, emit, and drop the given legs.
    fn remove_legs(
        &self,
        state: &mut DetectorState,
        leg_ids: &[String],
        reason: PruneReason,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        for leg_id in leg_ids {
            let Some(leg) = state.find_leg(leg_id) else {
                continue;
            };
            let parent = leg.parent_leg_id.clone();
            let swing_id = leg.swing_id.clone();

            // Reparent children to the pruned leg's own parent.
            for child in state.active_legs.iter_mut() {
                if child.parent_leg_id.as_deref() == Some(leg_id) {
                    child.parent_leg_id = parent.clone();
                }
            }

            if let Some(leg) = state.find_leg_mut(leg_id) {
                leg.status = LegStatus::Pruned;
            }
            events.push(SwingEvent::LegPruned {
                bar_index: bar.index,
                timestamp,
                leg_id: leg_id.clone(),
                swing_id,
                reason,
            });
        }
        state
            .active_legs
            .retain(|leg| leg.status != LegStatus::Pruned);
        events
    }
}

/// Range of the largest opposite-direction leg whose pivot sits at `price`,
/// regardless of status — counter-trend pressure that ever existed there.
pub fn counter_trend_range_at(
    state: &DetectorState,
    direction: Direction,
    price: Decimal,
) -> Option<f64> {
    let opposite = direction.opposite();
    state
        .active_legs
        .iter()
        .filter(|leg| leg.direction == opposite && leg.pivot_price == price)
        .map(|leg| leg.range())
        .max()
        .and_then(|r| r.to_f64())
}

/// Strict geometric containment of `inner` within `outer` (same direction).
fn strictly_contained(outer: &Leg, inner: &Leg) -> bool {
    match outer.direction {
        // Bull: origin=LOW, pivot=HIGH.
        Direction::Bull => {
            inner.origin_price > outer.origin_price && inner.pivot_price < outer.pivot_price
        }
        // Bear: origin=HIGH, pivot=LOW.
        Direction::Bear => {
            inner.origin_price < outer.origin_price && inner.pivot_price > outer.pivot_price
        }
    }
}

fn active_swing_ids(state: &DetectorState) -> Vec<String> {
    state
        .active_swings
        .iter()
        .filter(|s| s.is_active())
        .map(|s| s.swing_id.clone())
        .collect()
}

fn carries_active_swing(leg: &Leg, active_ids: &[String]) -> bool {
    leg.swing_id
        .as_ref()
        .is_some_and(|id| active_ids.iter().any(|a| a == id))
}

/// Cluster membership test: relative range gap and relative age gap both
/// below their thresholds.
fn in_same_cluster(
    a: &Leg,
    b: &Leg,
    current_bar: Decimal,
    range_threshold: Decimal,
    time_threshold: Decimal,
) -> bool {
    let (r1, r2) = (a.range(), b.range());
    let max_range = r1.max(r2);
    if max_range.is_zero() || current_bar.is_zero() {
        return false;
    }
    let range_ratio = (r1 - r2).abs() / max_range;
    let older = a.origin_index.min(b.origin_index);
    let newer = a.origin_index.max(b.origin_index);
    let time_ratio = Decimal::from(newer - older) / current_bar;
    range_ratio < range_threshold && time_ratio < time_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar_at(index: u64) -> Bar {
        Bar::new(index, index as i64 * 60, dec!(100), dec!(100), dec!(100), dec!(100))
    }

    fn bull_leg(origin: Decimal, origin_index: u64, pivot: Decimal, pivot_index: u64) -> Leg {
        Leg::new(Direction::Bull, origin, origin_index, pivot, pivot_index)
    }

    fn bear_leg(origin: Decimal, origin_index: u64, pivot: Decimal, pivot_index: u64) -> Leg {
        Leg::new(Direction::Bear, origin, origin_index, pivot, pivot_index)
    }

    #[test]
    fn engulfed_legs_are_removed() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        let mut doomed = bear_leg(dec!(4450), 0, dec!(4420), 4);
        doomed.max_origin_breach = Some(dec!(3));
        doomed.max_pivot_breach = Some(dec!(4));
        state.active_legs.push(doomed);
        state.active_legs.push(bull_leg(dec!(4420), 4, dec!(4453), 8));

        let events = pruner.prune_engulfed_legs(&mut state, &bar_at(9), 540);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SwingEvent::LegPruned {
                reason: PruneReason::Engulfed,
                ..
            }
        ));
        assert_eq!(state.active_legs.len(), 1);
    }

    #[test]
    fn engulfed_prune_can_be_disabled() {
        let mut config = DetectorConfig::default();
        config.enable_engulfed_prune = false;
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        let mut leg = bear_leg(dec!(4450), 0, dec!(4420), 4);
        leg.max_origin_breach = Some(dec!(3));
        leg.max_pivot_breach = Some(dec!(4));
        state.active_legs.push(leg);
        assert!(pruner.prune_engulfed_legs(&mut state, &bar_at(9), 540).is_empty());
        assert_eq!(state.active_legs.len(), 1);
    }

    #[test]
    fn domination_is_turn_scoped() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(100), 2, dec!(110), 6));

        // Same turn: lower origin dominates a higher candidate.
        assert!(pruner.would_leg_be_dominated(&state, Direction::Bull, dec!(101)));
        // Better candidate is not dominated.
        assert!(!pruner.would_leg_be_dominated(&state, Direction::Bull, dec!(99)));
        // After a turn boundary past the leg's origin, it no longer dominates.
        state.last_turn_bar.set(Direction::Bull, Some(5));
        assert!(!pruner.would_leg_be_dominated(&state, Direction::Bull, dec!(101)));
    }

    #[test]
    fn proximity_prunes_newer_same_pivot_leg() {
        let config = DetectorConfig::default().with_origin_prune(dec!(0.20), dec!(0.50));
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(100), 0, dec!(110), 10));
        state.active_legs.push(bull_leg(dec!(101), 5, dec!(110), 10));

        // time_ratio = (20-15)/20 = 0.25 < 0.50, range_ratio = 1/10 < 0.20.
        let events =
            pruner.apply_origin_proximity_prune(&mut state, Direction::Bull, &bar_at(20), 1200);
        assert_eq!(events.len(), 1);
        assert_eq!(state.active_legs.len(), 1);
        assert_eq!(state.active_legs[0].origin_price, dec!(100));
    }

    #[test]
    fn proximity_ignores_different_pivots() {
        let config = DetectorConfig::default().with_origin_prune(dec!(0.50), dec!(0.50));
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(1218.75), 0, dec!(1220.25), 18));
        state.active_legs.push(bull_leg(dec!(1218.5), 39, dec!(1220.25), 60));

        let events =
            pruner.apply_origin_proximity_prune(&mut state, Direction::Bull, &bar_at(100), 6000);
        assert!(events.is_empty());
        assert_eq!(state.active_legs.len(), 2);
    }

    #[test]
    fn proximity_respects_time_threshold() {
        let config = DetectorConfig::default().with_origin_prune(dec!(0.20), dec!(0.10));
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(100), 0, dec!(110), 15));
        state.active_legs.push(bull_leg(dec!(101), 10, dec!(110), 15));

        // time_ratio = 10/20 = 0.50 > 0.10: keep both.
        let events =
            pruner.apply_origin_proximity_prune(&mut state, Direction::Bull, &bar_at(20), 1200);
        assert!(events.is_empty());
        assert_eq!(state.active_legs.len(), 2);
    }

    #[test]
    fn proximity_transfers_swing_to_survivor() {
        let config = DetectorConfig::default().with_origin_prune(dec!(0.50), dec!(0.50));
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(100), 0, dec!(110), 10));
        let mut carrier = bull_leg(dec!(101), 5, dec!(110), 10);
        carrier.swing_id = Some("swing-123".into());
        state.active_legs.push(carrier);

        let events =
            pruner.apply_origin_proximity_prune(&mut state, Direction::Bull, &bar_at(20), 1200);
        assert_eq!(events.len(), 1);
        assert_eq!(state.active_legs.len(), 1);
        assert_eq!(state.active_legs[0].swing_id.as_deref(), Some("swing-123"));
    }

    #[test]
    fn turn_ratio_prunes_dwarfed_counter_legs() {
        let config = DetectorConfig::default().with_min_turn_threshold(dec!(0.25));
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        // Tiny bear leg ending at 100 with a recorded counter-trend of 1.0.
        let mut small_bear = bear_leg(dec!(102), 2, dec!(100), 4);
        small_bear.max_counter_leg_range = Some(1.0);
        state.active_legs.push(small_bear);
        // Pre-bootstrap bear leg: exempt.
        state.active_legs.push(bear_leg(dec!(108), 0, dec!(100), 4));
        // New bull leg launching off 100 with range 20.
        state.active_legs.push(bull_leg(dec!(100), 4, dec!(120), 9));

        let events =
            pruner.prune_by_turn_ratio(&mut state, "leg_bull_100_4", &bar_at(9), 540);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SwingEvent::LegPruned {
                reason: PruneReason::TurnRatioPrune,
                ..
            }
        ));
        // The exempt leg and the new leg survive.
        assert_eq!(state.active_legs.len(), 2);
    }

    #[test]
    fn min_ctr_fills_ratio_and_prunes() {
        let config = DetectorConfig::default().with_min_counter_trend(0.15);
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        // Bull leg 92->100 (range 8) ending where the bear leg starts.
        state.active_legs.push(bull_leg(dec!(92), 0, dec!(100), 5));
        // Bear leg from 100 down to 87.2 (range 12.8): ctr = 8/12.8 = 0.625.
        state.active_legs.push(bear_leg(dec!(100), 5, dec!(87.2), 9));

        let events =
            pruner.apply_min_counter_trend_prune(&mut state, Direction::Bear, &bar_at(10), 600);
        assert!(events.is_empty());
        let bear = state
            .active_legs
            .iter()
            .find(|l| l.direction == Direction::Bear)
            .unwrap();
        let ratio = bear.counter_trend_ratio.unwrap();
        assert!((ratio - 0.625).abs() < 1e-9);
    }

    #[test]
    fn min_ctr_passes_without_counter_legs() {
        let config = DetectorConfig::default().with_min_counter_trend(0.15);
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bear_leg(dec!(100), 5, dec!(90), 9));

        let events =
            pruner.apply_min_counter_trend_prune(&mut state, Direction::Bear, &bar_at(10), 600);
        assert!(events.is_empty());
        assert_eq!(state.active_legs[0].counter_trend_ratio, Some(1.0));
    }

    #[test]
    fn min_ctr_disabled_at_zero() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bear_leg(dec!(100), 5, dec!(90), 9));

        pruner.apply_min_counter_trend_prune(&mut state, Direction::Bear, &bar_at(10), 600);
        assert_eq!(state.active_legs[0].counter_trend_ratio, None);
    }

    fn breached(mut leg: Leg, amount: Decimal) -> Leg {
        leg.max_origin_breach = Some(amount);
        leg.status = LegStatus::Active;
        leg
    }

    #[test]
    fn inner_structure_prunes_duplicate_at_inner_pivot() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        // Outer bear 6100->5900 and inner bear 6050->5950, both refuted.
        let outer = breached(bear_leg(dec!(6100), 0, dec!(5900), 1), dec!(50));
        let inner = breached(bear_leg(dec!(6050), 2, dec!(5950), 3), dec!(100));
        let outer_id = outer.leg_id.clone();
        let inner_id = inner.leg_id.clone();
        state.active_legs.push(outer);
        state.active_legs.push(inner);
        // Bull legs off both pivots sharing the current pivot 6150.
        state.active_legs.push(bull_leg(dec!(5900), 1, dec!(6150), 5));
        state.active_legs.push(bull_leg(dec!(5950), 3, dec!(6150), 5));

        let events = pruner.prune_inner_structure_legs(
            &mut state,
            &[outer_id, inner_id],
            &bar_at(5),
            300,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            SwingEvent::LegPruned {
                reason: PruneReason::InnerStructure,
                ..
            }
        ));
        // The bull from the inner pivot is gone; the outer one survives.
        let bulls: Vec<_> = state
            .active_legs
            .iter()
            .filter(|l| l.direction == Direction::Bull)
            .collect();
        assert_eq!(bulls.len(), 1);
        assert_eq!(bulls[0].origin_price, dec!(5900));
    }

    #[test]
    fn inner_structure_respects_active_same_pivot_leg() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        // Active bear leg still defends the outer pivot 90.
        state.active_legs.push(bear_leg(dec!(100), 0, dec!(90), 1));
        let outer = breached(bear_leg(dec!(98), 2, dec!(90), 1), dec!(7));
        let inner = breached(bear_leg(dec!(96), 3, dec!(92), 4), dec!(9));
        let outer_id = outer.leg_id.clone();
        let inner_id = inner.leg_id.clone();
        state.active_legs.push(outer);
        state.active_legs.push(inner);
        state.active_legs.push(bull_leg(dec!(90), 1, dec!(105), 5));
        state.active_legs.push(bull_leg(dec!(92), 4, dec!(105), 5));

        let events = pruner.prune_inner_structure_legs(
            &mut state,
            &[outer_id, inner_id],
            &bar_at(5),
            300,
        );
        assert!(events.is_empty());
        let bulls = state
            .active_legs
            .iter()
            .filter(|l| l.direction == Direction::Bull)
            .count();
        assert_eq!(bulls, 2);
    }

    #[test]
    fn extension_prune_spares_roots() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        // Breached root and breached child, both bull with range 10.
        let root = breached(bull_leg(dec!(100), 0, dec!(110), 5), dec!(1));
        let mut child = breached(bull_leg(dec!(104), 2, dec!(110), 5), dec!(1));
        child.parent_leg_id = Some(root.leg_id.clone());
        state.active_legs.push(root);
        state.active_legs.push(child);

        // Price 3x the child's range (6) below its origin: 104 - 18 = 86.
        let mut bar = bar_at(10);
        bar.low = dec!(85);
        bar.high = dec!(100);
        let events = pruner.prune_extended_children(&mut state, &bar, 600);
        assert_eq!(events.len(), 1);
        assert_eq!(state.active_legs.len(), 1);
        assert!(state.active_legs[0].parent_leg_id.is_none());
    }

    #[test]
    fn subtree_prune_drops_contained_minnows() {
        let mut config = DetectorConfig::default();
        config.subtree_prune_threshold = dec!(0.10);
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();
        state.active_legs.push(bull_leg(dec!(100), 0, dec!(200), 10));
        state.active_legs.push(bull_leg(dec!(150), 4, dec!(155), 6)); // 5% of 100

        let events =
            pruner.prune_contained_subtrees(&mut state, Direction::Bull, &bar_at(12), 720);
        assert_eq!(events.len(), 1);
        assert_eq!(state.active_legs.len(), 1);
        assert_eq!(state.active_legs[0].pivot_price, dec!(200));
    }

    #[test]
    fn removal_reparents_grandchildren() {
        let config = DetectorConfig::default();
        let pruner = LegPruner::new(&config);
        let mut state = DetectorState::new();

        let root = bull_leg(dec!(90), 0, dec!(120), 10);
        let mut middle = breached(bull_leg(dec!(100), 2, dec!(120), 10), dec!(30));
        middle.parent_leg_id = Some(root.leg_id.clone());
        middle.max_pivot_breach = Some(dec!(2));
        let mut child = bull_leg(dec!(110), 5, dec!(120), 10);
        child.parent_leg_id = Some(middle.leg_id.clone());
        let root_id = root.leg_id.clone();
        state.active_legs.push(root);
        state.active_legs.push(middle);
        state.active_legs.push(child);

        pruner.prune_engulfed_legs(&mut state, &bar_at(11), 660);
        let child = state.find_leg("leg_bull_110_5").unwrap();
        assert_eq!(child.parent_leg_id.as_deref(), Some(root_id.as_str()));
    }
}
