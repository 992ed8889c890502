//! Streaming leg detector — one bar in, a list of structural events out.
//!
//! `process_bar` runs a fixed pipeline per bar:
//! 1. prune engulfed legs
//! 2. extend pivots on new extremes
//! 3. update origin/pivot breach tracking
//! 4. inner-structure pruning when new origin breaches appeared
//! 5. first-bar bootstrap (pending origins only)
//! 6. bar-type branch: pruning, leg creation, pending-origin updates,
//!    formation checks
//! 7. bar_count increment on live legs
//! 8. extension pruning of origin-breached children
//!
//! Everything mutable lives in DetectorState, so pause/resume is a snapshot
//! of that struct. The algorithm never looks ahead: it only sees the current
//! and previous bar.

use crate::classify::{classify_bar, BarType};
use crate::config::{ConfigError, DetectorConfig};
use crate::detector::events::{InvalidationReason, SwingEvent};
use crate::detector::leg::{impulse, spikiness, Leg, OriginSource, PendingOrigin};
use crate::detector::pruner::{counter_trend_range_at, LegPruner};
use crate::detector::state::{DetectorError, DetectorState};
use crate::detector::swing::SwingNode;
use crate::domain::{Bar, Direction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Streaming detector over a single bar stream. One instance per
/// instrument; instances share nothing.
pub struct LegDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl LegDetector {
    /// Build a detector with a validated config.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            state: DetectorState::new(),
        })
    }

    /// Restore a detector from a snapshot. The snapshot is integrity-checked
    /// first; on failure nothing is constructed.
    pub fn from_state(state: DetectorState, config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, state })
    }

    /// Restore from snapshot JSON.
    pub fn from_snapshot(json: &str, config: DetectorConfig) -> Result<Self, DetectorError> {
        let state = DetectorState::from_json(json)?;
        Self::from_state(state, config)
            .map_err(|e| DetectorError::InvalidState(e.to_string()))
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Serializable snapshot of the detector between bars.
    pub fn snapshot(&self) -> String {
        self.state.to_json()
    }

    /// All swings currently active.
    pub fn active_swings(&self) -> Vec<&SwingNode> {
        self.state
            .active_swings
            .iter()
            .filter(|s| s.is_active())
            .collect()
    }

    /// Process a single bar. Returns the events it generated, in emission
    /// order. A rejected bar changes no state.
    pub fn process_bar(&mut self, bar: &Bar) -> Result<Vec<SwingEvent>, DetectorError> {
        if !bar.is_sane() {
            return Err(DetectorError::InvalidBar {
                index: bar.index,
                reason: "OHLC ordering violated (low <= open/close <= high)".into(),
            });
        }
        if let Some(last) = self.state.last_bar_index {
            if bar.index <= last {
                return Err(DetectorError::InvalidBar {
                    index: bar.index,
                    reason: format!("bar index must increase (last was {last})"),
                });
            }
        }

        self.state.last_bar_index = Some(bar.index);
        let timestamp = bar.timestamp;
        // The previous bar before this one overwrites it; per-bar moment
        // contributions are measured against it.
        let prior_bar = self.state.prev_bar.clone();

        let mut events = Vec::new();
        events.extend(self.update_dag_state(bar, timestamp));

        self.update_leg_moments(bar, prior_bar.as_ref());
        self.update_live_leg_impulsiveness();

        Ok(events)
    }

    // ── Pipeline core ──────────────────────────────────────────────────

    fn update_dag_state(&mut self, bar: &Bar, timestamp: i64) -> Vec<SwingEvent> {
        let mut events = Vec::new();

        let pruner = LegPruner::new(&self.config);
        events.extend(pruner.prune_engulfed_legs(&mut self.state, bar, timestamp));

        self.extend_leg_pivots(bar);

        if self.config.min_counter_trend_ratio > 0.0 {
            let pruner = LegPruner::new(&self.config);
            for direction in [Direction::Bull, Direction::Bear] {
                events.extend(pruner.apply_min_counter_trend_prune(
                    &mut self.state,
                    direction,
                    bar,
                    timestamp,
                ));
            }
        }

        let (breach_events, newly_breached) = self.update_breach_tracking(bar, timestamp);
        events.extend(breach_events);

        if !newly_breached.is_empty() {
            let all_breached: Vec<String> = self
                .state
                .active_legs
                .iter()
                .filter(|leg| leg.origin_breached())
                .map(|leg| leg.leg_id.clone())
                .collect();
            if all_breached.len() >= 2 {
                let pruner = LegPruner::new(&self.config);
                events.extend(pruner.prune_inner_structure_legs(
                    &mut self.state,
                    &all_breached,
                    bar,
                    timestamp,
                ));
            }
        }

        // A leg double-breached on this very bar is refuted now, not on the
        // next bar's leading prune.
        let pruner = LegPruner::new(&self.config);
        events.extend(pruner.prune_engulfed_legs(&mut self.state, bar, timestamp));

        let Some(prev_bar) = self.state.prev_bar.clone() else {
            // First bar ever: publish its extremes as pending origins. Legs
            // need a second bar to establish temporal order.
            self.initialize_first_bar(bar);
            self.state.prev_bar = Some(bar.clone());
            return events;
        };

        let bar_type = classify_bar(bar, &prev_bar);
        self.update_turn_tracking(bar, bar_type);

        match bar_type {
            BarType::Type2Bull => {
                events.extend(self.process_type2(Direction::Bull, bar, timestamp))
            }
            BarType::Type2Bear => {
                events.extend(self.process_type2(Direction::Bear, bar, timestamp))
            }
            BarType::Inside => events.extend(self.process_inside(bar, timestamp)),
            BarType::Outside => events.extend(self.process_outside(bar, timestamp)),
        }

        for leg in self.state.active_legs.iter_mut() {
            if leg.is_live() {
                leg.bar_count += 1;
            }
        }

        if !self.config.subtree_prune_threshold.is_zero() {
            let pruner = LegPruner::new(&self.config);
            for direction in [Direction::Bull, Direction::Bear] {
                events.extend(pruner.prune_contained_subtrees(
                    &mut self.state,
                    direction,
                    bar,
                    timestamp,
                ));
            }
        }

        let pruner = LegPruner::new(&self.config);
        events.extend(pruner.prune_extended_children(&mut self.state, bar, timestamp));

        self.state.prev_bar = Some(bar.clone());
        events
    }

    fn initialize_first_bar(&mut self, bar: &Bar) {
        self.state.pending_origins.set(
            Direction::Bear,
            Some(PendingOrigin {
                price: bar.high,
                bar_index: bar.index,
                direction: Direction::Bear,
                source: OriginSource::High,
            }),
        );
        self.state.pending_origins.set(
            Direction::Bull,
            Some(PendingOrigin {
                price: bar.low,
                bar_index: bar.index,
                direction: Direction::Bull,
                source: OriginSource::Low,
            }),
        );
    }

    /// A turn starts only on a transition FROM the opposite directional
    /// type. The boundary is the pending origin's bar index when one exists:
    /// that origin was set during the opposite turn and seeds the first leg
    /// of this one.
    fn update_turn_tracking(&mut self, bar: &Bar, bar_type: BarType) {
        let Some(direction) = bar_type.directional() else {
            return;
        };
        if let Some(prev_type) = self.state.prev_bar_type {
            if prev_type != direction {
                let boundary = self
                    .state
                    .pending_origins
                    .get(direction)
                    .as_ref()
                    .map(|p| p.bar_index)
                    .unwrap_or(bar.index);
                self.state.last_turn_bar.set(direction, Some(boundary));
            }
        }
        self.state.prev_bar_type = Some(direction);
    }

    // ── Pivot extension ────────────────────────────────────────────────

    /// Extend live legs' pivots on new extremes. Origins never move. Each
    /// extension republishes the new pivot as the opposite direction's
    /// pending origin so counter-legs anchor exactly at it.
    fn extend_leg_pivots(&mut self, bar: &Bar) {
        let mut new_bear_pending: Option<Decimal> = None;
        let mut new_bull_pending: Option<Decimal> = None;

        for leg in self.state.active_legs.iter_mut() {
            if !leg.is_live() {
                continue;
            }
            match leg.direction {
                Direction::Bull if bar.high > leg.pivot_price => {
                    leg.update_pivot(bar.high, bar.index);
                    leg.last_modified_bar = bar.index;
                    new_bear_pending = Some(bar.high);
                }
                Direction::Bear if bar.low < leg.pivot_price => {
                    leg.update_pivot(bar.low, bar.index);
                    leg.last_modified_bar = bar.index;
                    new_bull_pending = Some(bar.low);
                }
                _ => {}
            }
        }

        if let Some(price) = new_bear_pending {
            self.state.pending_origins.set(
                Direction::Bear,
                Some(PendingOrigin {
                    price,
                    bar_index: bar.index,
                    direction: Direction::Bear,
                    source: OriginSource::PivotExtension,
                }),
            );
        }
        if let Some(price) = new_bull_pending {
            self.state.pending_origins.set(
                Direction::Bull,
                Some(PendingOrigin {
                    price,
                    bar_index: bar.index,
                    direction: Direction::Bull,
                    source: OriginSource::PivotExtension,
                }),
            );
        }
    }

    // ── Breach tracking ────────────────────────────────────────────────

    /// Track origin and pivot breaches for active legs. Events fire on the
    /// first breach only; later breaches just extend the running maximum.
    /// An origin breach invalidates the leg's swing. Pivot breaches are
    /// tracked for formed legs only — for an unformed leg a new extreme is
    /// extension, not violation.
    fn update_breach_tracking(&mut self, bar: &Bar, timestamp: i64) -> (Vec<SwingEvent>, Vec<String>) {
        let mut events = Vec::new();
        let mut newly_breached = Vec::new();
        let mut swings_to_invalidate: Vec<String> = Vec::new();

        for leg in self.state.active_legs.iter_mut() {
            if leg.status != crate::detector::leg::LegStatus::Active {
                continue;
            }

            // Origin breach.
            let origin_excursion = match leg.direction {
                Direction::Bull if bar.low < leg.origin_price => Some((leg.origin_price - bar.low, bar.low)),
                Direction::Bear if bar.high > leg.origin_price => Some((bar.high - leg.origin_price, bar.high)),
                _ => None,
            };
            if let Some((amount, price)) = origin_excursion {
                match leg.max_origin_breach {
                    None => {
                        leg.max_origin_breach = Some(amount);
                        newly_breached.push(leg.leg_id.clone());
                        events.push(SwingEvent::OriginBreached {
                            bar_index: bar.index,
                            timestamp,
                            leg_id: leg.leg_id.clone(),
                            swing_id: leg.swing_id.clone(),
                            breach_price: price,
                            breach_amount: amount,
                        });
                        if let Some(swing_id) = leg.swing_id.clone() {
                            swings_to_invalidate.push(swing_id);
                        }
                    }
                    Some(max) if amount > max => leg.max_origin_breach = Some(amount),
                    Some(_) => {}
                }
            }

            // Pivot breach (formed legs only).
            if leg.formed && !leg.range().is_zero() {
                let pivot_excursion = match leg.direction {
                    Direction::Bull if bar.high > leg.pivot_price => {
                        Some((bar.high - leg.pivot_price, bar.high))
                    }
                    Direction::Bear if bar.low < leg.pivot_price => {
                        Some((leg.pivot_price - bar.low, bar.low))
                    }
                    _ => None,
                };
                if let Some((amount, price)) = pivot_excursion {
                    let first = leg.max_pivot_breach.is_none();
                    if first || Some(amount) > leg.max_pivot_breach {
                        leg.max_pivot_breach = Some(amount);
                    }
                    if first {
                        events.push(SwingEvent::PivotBreached {
                            bar_index: bar.index,
                            timestamp,
                            leg_id: leg.leg_id.clone(),
                            swing_id: leg.swing_id.clone(),
                            breach_price: price,
                            breach_amount: amount,
                        });
                    }
                }
            }
        }

        for swing_id in swings_to_invalidate {
            if let Some(swing) = self
                .state
                .active_swings
                .iter_mut()
                .find(|s| s.swing_id == swing_id && s.is_active())
            {
                swing.invalidate();
                events.push(SwingEvent::SwingInvalidated {
                    bar_index: bar.index,
                    timestamp,
                    swing_id,
                    reason: InvalidationReason::OriginBreached,
                });
            }
        }

        (events, newly_breached)
    }

    // ── Bar-type branches ──────────────────────────────────────────────

    /// Type 2 bar: the trend direction may consume its pending origin into
    /// a new leg anchored at the bar's extreme.
    fn process_type2(&mut self, direction: Direction, bar: &Bar, timestamp: i64) -> Vec<SwingEvent> {
        let mut events = Vec::new();

        let pruner = LegPruner::new(&self.config);
        events.extend(pruner.apply_origin_proximity_prune(
            &mut self.state,
            direction.opposite(),
            bar,
            timestamp,
        ));

        if let Some(pending) = self.state.pending_origins.get(direction).clone() {
            let pivot_price = match direction {
                Direction::Bull => bar.high,
                Direction::Bear => bar.low,
            };
            events.extend(self.try_create_leg(
                direction,
                &pending,
                pivot_price,
                bar.index,
                bar,
                timestamp,
            ));
        }

        self.update_pending_origins(bar);
        // A trend bar confirms the legs it retraces into: only the opposite
        // direction is checked for formation here.
        let check = match direction {
            Direction::Bull => (None, Some(bar.close)),
            Direction::Bear => (Some(bar.close), None),
        };
        events.extend(self.check_leg_formations(bar, timestamp, check.0, check.1));
        events
    }

    /// Inside bar: both inter-bar orderings hold, so whichever pending
    /// origin is older may seed a leg toward the younger one.
    fn process_inside(&mut self, bar: &Bar, timestamp: i64) -> Vec<SwingEvent> {
        let mut events = Vec::new();

        let pending_bull = self.state.pending_origins.get(Direction::Bull).clone();
        let pending_bear = self.state.pending_origins.get(Direction::Bear).clone();

        if let (Some(bull), Some(bear)) = (pending_bull, pending_bear) {
            if bear.bar_index < bull.bar_index {
                // HIGH before LOW: bear structure from the high to the low.
                let created = self.try_create_leg(
                    Direction::Bear,
                    &bear,
                    bull.price,
                    bull.bar_index,
                    bar,
                    timestamp,
                );
                if !created.is_empty() {
                    self.state.pending_origins.set(Direction::Bull, None);
                }
                events.extend(created);
            } else if bull.bar_index < bear.bar_index {
                // LOW before HIGH: bull structure from the low to the high.
                let created = self.try_create_leg(
                    Direction::Bull,
                    &bull,
                    bear.price,
                    bear.bar_index,
                    bar,
                    timestamp,
                );
                if !created.is_empty() {
                    self.state.pending_origins.set(Direction::Bear, None);
                }
                events.extend(created);
            }
        }

        self.update_pending_origins(bar);

        // Both orderings hold, so extremes are usable for retracement.
        events.extend(self.check_leg_formations(bar, timestamp, Some(bar.high), Some(bar.low)));
        events
    }

    /// Outside bar: direction ambiguous. Extremes update pending origins but
    /// no leg is created from this bar alone.
    fn process_outside(&mut self, bar: &Bar, timestamp: i64) -> Vec<SwingEvent> {
        self.update_pending_origins(bar);
        self.check_leg_formations(bar, timestamp, Some(bar.close), Some(bar.close))
    }

    // ── Leg creation ───────────────────────────────────────────────────

    /// Run the creation gauntlet for a pending origin: duplicate check,
    /// turn-scoped domination, branch-ratio domination. On success the leg
    /// is appended, counter-legs at its origin face turn-ratio pruning, the
    /// parent's segment impulse updates, and the pending origin is consumed.
    fn try_create_leg(
        &mut self,
        direction: Direction,
        pending: &PendingOrigin,
        pivot_price: Decimal,
        pivot_index: u64,
        bar: &Bar,
        timestamp: i64,
    ) -> Vec<SwingEvent> {
        if pending.price == pivot_price {
            return Vec::new(); // zero-range legs are never created
        }

        let duplicate = self.state.active_legs.iter().any(|leg| {
            leg.direction == direction
                && !leg.origin_breached()
                && leg.origin_price == pending.price
                && leg.origin_index == pending.bar_index
        });
        if duplicate {
            return Vec::new();
        }

        let pruner = LegPruner::new(&self.config);
        if pruner.would_leg_be_dominated(&self.state, direction, pending.price) {
            return Vec::new();
        }

        let parent_leg_id = self.find_parent_for_leg(direction, pending.price, pending.bar_index);
        if pruner.is_origin_dominated_by_branch_ratio(
            &self.state,
            direction,
            pending.price,
            parent_leg_id.as_deref(),
        ) {
            return Vec::new();
        }

        let origin_ctr = match counter_trend_range_at(&self.state, direction, pending.price) {
            Some(range) => Some(range),
            None if self.state.has_bootstrapped(direction.opposite()) => Some(0.0),
            None => None,
        };

        let mut leg = Leg::new(
            direction,
            pending.price,
            pending.bar_index,
            pivot_price,
            pivot_index,
        );
        leg.price_at_creation = bar.close;
        leg.last_modified_bar = bar.index;
        leg.impulse = impulse(leg.range(), pending.bar_index, pivot_index);
        leg.parent_leg_id = parent_leg_id.clone();
        leg.origin_counter_trend_range = origin_ctr;
        leg.max_counter_leg_range = origin_ctr;
        let leg_id = leg.leg_id.clone();

        let mut events = Vec::new();
        self.state.active_legs.push(leg);
        self.state.mark_bootstrapped(direction);

        let pruner = LegPruner::new(&self.config);
        events.extend(pruner.prune_by_turn_ratio(&mut self.state, &leg_id, bar, timestamp));

        if let Some(parent_id) = parent_leg_id {
            self.update_parent_segment_impulse(&parent_id, pending.price, pending.bar_index);
        }

        self.state.pending_origins.set(direction, None);

        // Re-read the leg: turn-ratio pruning may have reshaped the vec.
        if let Some(leg) = self.state.find_leg(&leg_id) {
            events.push(SwingEvent::LegCreated {
                bar_index: bar.index,
                timestamp,
                leg_id: leg.leg_id.clone(),
                direction: leg.direction,
                origin_price: leg.origin_price,
                origin_index: leg.origin_index,
                pivot_price: leg.pivot_price,
                pivot_index: leg.pivot_index,
            });
        }
        events
    }

    /// Parent = the tightest same-direction ancestor by time-price order:
    /// earlier origin, strictly better origin price; bull picks the highest
    /// such origin, bear the lowest. Only non-breached legs qualify.
    fn find_parent_for_leg(
        &self,
        direction: Direction,
        origin_price: Decimal,
        origin_index: u64,
    ) -> Option<String> {
        let eligible = self.state.active_legs.iter().filter(|leg| {
            leg.direction == direction
                && !leg.origin_breached()
                && leg.origin_index < origin_index
                && match direction {
                    Direction::Bull => leg.origin_price < origin_price,
                    Direction::Bear => leg.origin_price > origin_price,
                }
        });

        let parent = match direction {
            Direction::Bull => {
                eligible.max_by(|a, b| {
                    a.origin_price
                        .cmp(&b.origin_price)
                        .then(a.origin_index.cmp(&b.origin_index))
                })
            }
            Direction::Bear => {
                eligible.min_by(|a, b| {
                    a.origin_price
                        .cmp(&b.origin_price)
                        .then(b.origin_index.cmp(&a.origin_index))
                })
            }
        };
        parent.map(|leg| leg.leg_id.clone())
    }

    /// Store or refresh the parent's origin -> deepest -> child-origin
    /// segment when a child anchors at it.
    fn update_parent_segment_impulse(
        &mut self,
        parent_id: &str,
        child_origin_price: Decimal,
        child_origin_index: u64,
    ) {
        let Some(parent) = self.state.find_leg_mut(parent_id) else {
            return;
        };

        let pivot_extended_deeper = match parent.segment_deepest_price {
            None => true,
            Some(deepest) => match parent.direction {
                Direction::Bull => parent.pivot_price > deepest,
                Direction::Bear => parent.pivot_price < deepest,
            },
        };

        if pivot_extended_deeper {
            parent.segment_deepest_price = Some(parent.pivot_price);
            parent.segment_deepest_index = Some(parent.pivot_index);
            let range_to = (parent.origin_price - parent.pivot_price).abs();
            parent.impulse_to_deepest =
                Some(impulse(range_to, parent.origin_index, parent.pivot_index));
        }

        if let (Some(deepest_price), Some(deepest_index)) =
            (parent.segment_deepest_price, parent.segment_deepest_index)
        {
            let range_back = (deepest_price - child_origin_price).abs();
            parent.impulse_back = Some(impulse(range_back, deepest_index, child_origin_index));
        }
    }

    // ── Pending origins ────────────────────────────────────────────────

    /// Track more extreme candidates, unless a live leg from the current
    /// turn already owns a better origin.
    fn update_pending_origins(&mut self, bar: &Bar) {
        let existing_bear = self.state.pending_origins.get(Direction::Bear).clone();
        let bear_improves = existing_bear.as_ref().map_or(true, |p| bar.high > p.price);
        if bear_improves && self.should_track_pending_origin(Direction::Bear, bar.high) {
            self.state.pending_origins.set(
                Direction::Bear,
                Some(PendingOrigin {
                    price: bar.high,
                    bar_index: bar.index,
                    direction: Direction::Bear,
                    source: OriginSource::High,
                }),
            );
        }

        let existing_bull = self.state.pending_origins.get(Direction::Bull).clone();
        let bull_improves = existing_bull.as_ref().map_or(true, |p| bar.low < p.price);
        if bull_improves && self.should_track_pending_origin(Direction::Bull, bar.low) {
            self.state.pending_origins.set(
                Direction::Bull,
                Some(PendingOrigin {
                    price: bar.low,
                    bar_index: bar.index,
                    direction: Direction::Bull,
                    source: OriginSource::Low,
                }),
            );
        }
    }

    /// During the opposite direction's turn, always track (origins must
    /// accumulate through retracements). In our own turn, skip candidates a
    /// live current-turn leg already beats.
    fn should_track_pending_origin(&self, direction: Direction, price: Decimal) -> bool {
        if self.state.prev_bar_type == Some(direction.opposite()) {
            return true;
        }
        let turn_start = self.state.last_turn_bar.get(direction).unwrap_or(0);
        !self.state.active_legs.iter().any(|leg| {
            leg.direction == direction
                && leg.is_live()
                && leg.origin_index >= turn_start
                && match direction {
                    Direction::Bull => leg.origin_price <= price,
                    Direction::Bear => leg.origin_price >= price,
                }
        })
    }

    // ── Formation ──────────────────────────────────────────────────────

    /// Recompute retracement on live unformed legs of the checked
    /// directions and promote the ones at or past the formation fib into
    /// swings. A `None` price skips that direction: legs riding a trend bar
    /// of their own direction are not formation candidates.
    fn check_leg_formations(
        &mut self,
        bar: &Bar,
        timestamp: i64,
        bull_price: Option<Decimal>,
        bear_price: Option<Decimal>,
    ) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        let threshold = self.config.formation_fib;

        let mut formed: Vec<String> = Vec::new();
        for leg in self.state.active_legs.iter_mut() {
            if !leg.is_live() || leg.formed || leg.range().is_zero() {
                continue;
            }
            let Some(check_price) = (match leg.direction {
                Direction::Bull => bull_price,
                Direction::Bear => bear_price,
            }) else {
                continue;
            };
            let retracement = match leg.direction {
                Direction::Bull => (check_price - leg.origin_price) / leg.range(),
                Direction::Bear => (leg.origin_price - check_price) / leg.range(),
            };
            leg.retracement_pct = retracement;
            if retracement >= threshold {
                leg.formed = true;
                formed.push(leg.leg_id.clone());
            }
        }

        for leg_id in formed {
            if let Some(event) = self.form_swing_from_leg(&leg_id, bar, timestamp) {
                events.push(event);
            }
        }
        events
    }

    /// Promote a formed leg into a SwingNode with a deterministic id and
    /// record its impulse in the population.
    fn form_swing_from_leg(
        &mut self,
        leg_id: &str,
        bar: &Bar,
        timestamp: i64,
    ) -> Option<SwingEvent> {
        let leg = self.state.find_leg(leg_id)?;
        let swing = SwingNode::from_formed_leg(
            leg.direction,
            leg.origin_price,
            leg.origin_index,
            leg.pivot_price,
            leg.pivot_index,
            bar.index,
        );
        if self
            .state
            .active_swings
            .iter()
            .any(|s| s.swing_id == swing.swing_id)
        {
            return None;
        }

        let leg_impulse = leg.impulse;
        let swing_id = swing.swing_id.clone();
        let event = SwingEvent::SwingFormed {
            bar_index: bar.index,
            timestamp,
            swing_id: swing_id.clone(),
            direction: swing.direction,
            high_price: swing.high_price,
            high_bar_index: swing.high_bar_index,
            low_price: swing.low_price,
            low_bar_index: swing.low_bar_index,
        };

        if let Some(leg) = self.state.find_leg_mut(leg_id) {
            leg.swing_id = Some(swing_id);
        }
        self.state.formed_leg_impulses.insert(leg_impulse);
        self.state.active_swings.push(swing);
        Some(event)
    }

    // ── Metrics ────────────────────────────────────────────────────────

    /// Accumulate per-bar contributions into each live leg's running
    /// moments and refresh spikiness. Contributions are measured against
    /// the bar that preceded this one; the first bar of a leg has no
    /// baseline and is skipped.
    fn update_leg_moments(&mut self, bar: &Bar, prior_bar: Option<&Bar>) {
        let Some(prev) = prior_bar else {
            return;
        };
        let prev_high = prev.high.to_f64().unwrap_or(0.0);
        let prev_low = prev.low.to_f64().unwrap_or(0.0);
        let close = bar.close.to_f64().unwrap_or(0.0);

        for leg in self.state.active_legs.iter_mut() {
            if !leg.is_live() || leg.bar_count < 1 {
                continue;
            }
            let contribution = match leg.direction {
                Direction::Bull => close - prev_high,
                Direction::Bear => prev_low - close,
            };
            leg.moment_n += 1;
            leg.moment_sum_x += contribution;
            leg.moment_sum_x2 += contribution * contribution;
            leg.moment_sum_x3 += contribution * contribution * contribution;
            leg.spikiness = spikiness(
                leg.moment_n,
                leg.moment_sum_x,
                leg.moment_sum_x2,
                leg.moment_sum_x3,
            );
        }
    }

    /// Refresh impulsiveness percentile for live legs. Breached legs keep
    /// their last value frozen.
    fn update_live_leg_impulsiveness(&mut self) {
        // Split borrow: population is read-only while legs mutate.
        let population = self.state.formed_leg_impulses.clone();
        for leg in self.state.active_legs.iter_mut() {
            if !leg.is_live() {
                continue;
            }
            leg.impulsiveness = population.percentile(leg.impulse);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::events::PruneReason;

    fn bar(index: u64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            index,
            1_704_103_800 + index as i64 * 60,
            Decimal::try_from(open).unwrap(),
            Decimal::try_from(high).unwrap(),
            Decimal::try_from(low).unwrap(),
            Decimal::try_from(close).unwrap(),
        )
    }

    fn detector() -> LegDetector {
        LegDetector::new(DetectorConfig::default()).unwrap()
    }

    #[test]
    fn rejects_malformed_bar_without_state_change() {
        let mut det = detector();
        let bad = bar(0, 100.0, 98.0, 99.0, 100.0); // high below low
        assert!(det.process_bar(&bad).is_err());
        assert_eq!(det.state().last_bar_index, None);
        assert!(det.state().prev_bar.is_none());
    }

    #[test]
    fn rejects_backwards_index() {
        let mut det = detector();
        det.process_bar(&bar(5, 100.0, 102.0, 99.0, 101.0)).unwrap();
        let err = det.process_bar(&bar(5, 100.0, 102.0, 99.0, 101.0));
        assert!(err.is_err());
        let err = det.process_bar(&bar(3, 100.0, 102.0, 99.0, 101.0));
        assert!(err.is_err());
        assert_eq!(det.state().last_bar_index, Some(5));
    }

    #[test]
    fn first_bar_publishes_pending_origins_only() {
        let mut det = detector();
        let events = det.process_bar(&bar(0, 100.0, 102.0, 99.0, 101.0)).unwrap();
        assert!(events.is_empty());
        assert!(det.state().active_legs.is_empty());
        let bull = det.state().pending_origins.get(Direction::Bull).clone().unwrap();
        assert_eq!(bull.price, Decimal::from(99));
        let bear = det.state().pending_origins.get(Direction::Bear).clone().unwrap();
        assert_eq!(bear.price, Decimal::from(102));
    }

    #[test]
    fn type2_bull_creates_bull_leg_from_pending_low() {
        let mut det = detector();
        det.process_bar(&bar(0, 100.0, 102.0, 99.0, 101.0)).unwrap();
        let events = det.process_bar(&bar(1, 102.0, 103.0, 102.0, 102.5)).unwrap();
        let created: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SwingEvent::LegCreated { .. }))
            .collect();
        assert_eq!(created.len(), 1);
        let leg = &det.state().active_legs[0];
        assert_eq!(leg.direction, Direction::Bull);
        assert_eq!(leg.origin_price, Decimal::from(99));
        assert_eq!(leg.pivot_price, Decimal::from(103));
        assert!(leg.origin_index <= leg.pivot_index);
    }

    #[test]
    fn pivot_extends_and_republishes_opposite_pending() {
        let mut det = detector();
        det.process_bar(&bar(0, 100.0, 102.0, 99.0, 101.0)).unwrap();
        det.process_bar(&bar(1, 102.0, 103.0, 102.0, 102.5)).unwrap();
        det.process_bar(&bar(2, 102.5, 108.0, 102.2, 107.0)).unwrap();

        let leg = &det.state().active_legs[0];
        assert_eq!(leg.pivot_price, Decimal::from(108));
        let bear = det.state().pending_origins.get(Direction::Bear).clone().unwrap();
        assert_eq!(bear.price, Decimal::from(108));
        assert_eq!(bear.source, OriginSource::PivotExtension);
    }

    #[test]
    fn formation_emits_swing_and_records_impulse() {
        let mut det = detector();
        // Rising bars then a retracement close above the formation fib.
        det.process_bar(&bar(0, 100.0, 102.0, 99.0, 101.0)).unwrap();
        det.process_bar(&bar(1, 102.0, 103.0, 102.0, 102.5)).unwrap();
        det.process_bar(&bar(2, 106.5, 108.0, 106.0, 107.0)).unwrap();
        det.process_bar(&bar(3, 109.5, 112.0, 109.0, 111.0)).unwrap();
        det.process_bar(&bar(4, 111.0, 114.0, 110.0, 113.0)).unwrap();
        let events = det.process_bar(&bar(5, 113.0, 116.0, 108.0, 108.0)).unwrap();

        let formed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SwingEvent::SwingFormed { .. }))
            .collect();
        assert_eq!(formed.len(), 1);
        if let SwingEvent::SwingFormed {
            direction,
            low_price,
            ..
        } = formed[0]
        {
            assert_eq!(*direction, Direction::Bull);
            assert_eq!(*low_price, Decimal::from(99));
        }
        assert_eq!(det.state().formed_leg_impulses.len(), 1);
        assert!(det.state().active_swings[0].is_active());
        let leg = det
            .state()
            .active_legs
            .iter()
            .find(|l| l.formed)
            .expect("formed leg kept");
        assert!(leg.swing_id.is_some());
    }

    #[test]
    fn origin_breach_invalidates_swing_once() {
        let mut det = detector();
        det.process_bar(&bar(0, 100.0, 102.0, 99.0, 101.0)).unwrap();
        det.process_bar(&bar(1, 102.0, 103.0, 102.0, 102.5)).unwrap();
        det.process_bar(&bar(2, 106.5, 108.0, 106.0, 107.0)).unwrap();
        det.process_bar(&bar(3, 107.0, 112.0, 104.0, 105.0)).unwrap();

        // Breach the bull origin at 99.
        let events = det.process_bar(&bar(4, 105.0, 106.0, 97.0, 98.0)).unwrap();
        let breaches: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SwingEvent::OriginBreached { .. }))
            .collect();
        assert!(!breaches.is_empty());

        // A deeper breach extends the max without a second event.
        let events = det.process_bar(&bar(5, 98.0, 99.0, 95.0, 96.0)).unwrap();
        assert!(events
            .iter()
            .all(|e| !matches!(e, SwingEvent::OriginBreached { .. })));
        let leg = det
            .state()
            .active_legs
            .iter()
            .find(|l| l.direction == Direction::Bull && l.origin_breached());
        if let Some(leg) = leg {
            assert_eq!(leg.max_origin_breach, Some(Decimal::from(4)));
        }
    }

    #[test]
    fn engulfed_leg_pruned_after_double_breach() {
        let mut det = detector();
        // Build a bear leg 4450 -> 4420, form it, then breach both sides.
        det.process_bar(&bar(0, 4445.0, 4450.0, 4440.0, 4442.0)).unwrap();
        det.process_bar(&bar(1, 4442.0, 4448.0, 4420.0, 4422.0)).unwrap();
        det.process_bar(&bar(2, 4422.0, 4435.0, 4421.0, 4432.0)).unwrap();

        let bear_formed = det
            .state()
            .active_legs
            .iter()
            .any(|l| l.direction == Direction::Bear && l.formed);
        assert!(bear_formed, "bear leg should have formed on the retracement");

        // Bar A: origin breach (high above 4450).
        let events_a = det.process_bar(&bar(3, 4432.0, 4453.0, 4430.0, 4451.0)).unwrap();
        assert!(events_a
            .iter()
            .any(|e| matches!(e, SwingEvent::OriginBreached { .. })));

        // Bar B: pivot breach (low below 4420) removes the leg on this bar.
        let events_b = det.process_bar(&bar(4, 4451.0, 4452.0, 4416.0, 4418.0)).unwrap();
        assert!(events_b
            .iter()
            .any(|e| matches!(e, SwingEvent::PivotBreached { .. })));
        let engulfed: Vec<_> = events_b
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SwingEvent::LegPruned {
                        reason: PruneReason::Engulfed,
                        ..
                    }
                )
            })
            .collect();
        assert_eq!(engulfed.len(), 1);
        // No replacement leg resurrects the refuted origin.
        assert!(!det
            .state()
            .active_legs
            .iter()
            .any(|l| l.origin_price == Decimal::from(4450)));
    }

    #[test]
    fn snapshot_resume_is_equivalent() {
        let bars: Vec<Bar> = vec![
            bar(0, 100.0, 102.0, 99.0, 101.0),
            bar(1, 102.0, 103.0, 102.0, 102.5),
            bar(2, 106.5, 108.0, 106.0, 107.0),
            bar(3, 109.5, 112.0, 109.0, 111.0),
            bar(4, 111.0, 114.0, 110.0, 113.0),
            bar(5, 113.0, 116.0, 108.0, 108.0),
            bar(6, 108.0, 110.0, 105.0, 106.0),
        ];

        let mut uninterrupted = detector();
        let mut all_events = Vec::new();
        for b in &bars {
            all_events.push(uninterrupted.process_bar(b).unwrap());
        }

        let mut first_half = detector();
        for b in &bars[..4] {
            first_half.process_bar(b).unwrap();
        }
        let snapshot = first_half.snapshot();
        let mut resumed =
            LegDetector::from_snapshot(&snapshot, DetectorConfig::default()).unwrap();
        for (i, b) in bars[4..].iter().enumerate() {
            let events = resumed.process_bar(b).unwrap();
            assert_eq!(events, all_events[4 + i], "bar {} diverged", 4 + i);
        }
        assert_eq!(resumed.state(), uninterrupted.state());
    }

    #[test]
    fn deterministic_ids_across_fresh_runs() {
        let bars: Vec<Bar> = vec![
            bar(0, 100.0, 102.0, 99.0, 101.0),
            bar(1, 101.0, 103.0, 98.0, 102.0),
            bar(2, 102.0, 108.0, 101.0, 107.0),
            bar(3, 107.0, 112.0, 106.0, 111.0),
            bar(4, 111.0, 115.0, 109.0, 114.0),
            bar(5, 114.0, 116.0, 108.0, 109.0),
        ];
        let mut a = detector();
        let mut b = detector();
        for bar in &bars {
            a.process_bar(bar).unwrap();
            b.process_bar(bar).unwrap();
        }
        let ids_a: Vec<_> = a.state().active_legs.iter().map(|l| &l.leg_id).collect();
        let ids_b: Vec<_> = b.state().active_legs.iter().map(|l| &l.leg_id).collect();
        assert_eq!(ids_a, ids_b);
    }
}
