//! Reference layer — lifecycle of formed swings under scale-aware rules.
//!
//! The structural layer (detector) decides what exists; this layer decides
//! what it means:
//! - invalidation with tolerances scaled by the swing's size bucket
//!   (S/M strict, L/XL tolerate wick probes)
//! - completion at the 2x target, small scales only
//! - completed references are terminal: `max_location` is persistent and
//!   completion derives from it at query time, so a completed reference
//!   never re-forms even if price retraces below the target
//! - opt-in Fibonacci level-cross tracking for a bounded set of legs

use crate::config::DetectorConfig;
use crate::detector::events::{InvalidationReason, SwingEvent};
use crate::detector::leg::Leg;
use crate::detector::swing::{SwingNode, SwingStatus};
use crate::domain::{Bar, Direction, Scale};
use crate::frame::{FrameError, ReferenceFrame};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Hard cap on level-cross subscriptions.
pub const MAX_TRACKED_LEGS: usize = 10;

/// The standard Fibonacci grid used for per-leg level crossing.
pub const STANDARD_FIB_LEVELS: [Decimal; 12] = [
    dec!(0.0),
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
];

/// Soft errors from the reference layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("maximum of {max} tracked legs reached")]
    TrackingLimitExceeded { max: usize },

    #[error("reference frame: {0}")]
    Frame(#[from] FrameError),
}

/// A registered reference: a formed swing plus its scale bucket and the
/// highest frame location price has ever reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub swing: SwingNode,
    pub scale: Scale,
    frame: ReferenceFrame,
    pub max_location: Decimal,
}

impl ReferenceEntry {
    pub fn frame(&self) -> &ReferenceFrame {
        &self.frame
    }
}

/// Scale-aware lifecycle manager for formed swings.
pub struct ReferenceLayer {
    config: DetectorConfig,
    references: Vec<ReferenceEntry>,
    tracked_legs: Vec<String>,
    /// Last raw location per tracked leg; the first observation only seeds
    /// the baseline.
    last_leg_location: HashMap<String, Decimal>,
    pending_cross_events: Vec<SwingEvent>,
}

impl ReferenceLayer {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            references: Vec::new(),
            tracked_legs: Vec::new(),
            last_leg_location: HashMap::new(),
            pending_cross_events: Vec::new(),
        }
    }

    // ── Registration and queries ───────────────────────────────────────

    /// Register a formed swing under a scale bucket. Registering an id that
    /// is already present is a no-op.
    pub fn register_swing(&mut self, swing: &SwingNode, scale: Scale) -> Result<(), ReferenceError> {
        if self.references.iter().any(|r| r.swing.swing_id == swing.swing_id) {
            return Ok(());
        }
        let frame = ReferenceFrame::new(swing.defended_pivot(), swing.origin(), swing.direction)?;
        self.references.push(ReferenceEntry {
            swing: swing.clone(),
            scale,
            frame,
            max_location: Decimal::MIN,
        });
        Ok(())
    }

    pub fn get_reference(&self, swing_id: &str) -> Option<&ReferenceEntry> {
        self.references.iter().find(|r| r.swing.swing_id == swing_id)
    }

    /// Completion derives from `max_location` at query time, so changing
    /// `completion_threshold` in config applies retroactively.
    pub fn is_completed(&self, swing_id: &str) -> bool {
        self.get_reference(swing_id)
            .map(|r| r.max_location >= self.config.completion_threshold)
            .unwrap_or(false)
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Apply one bar to every active reference. Completion is checked
    /// before invalidation; big swings never complete.
    pub fn process_bar(&mut self, bar: &Bar) -> Vec<SwingEvent> {
        let mut events = Vec::new();
        let completion = self.config.completion_threshold;
        let wick_tolerance = self.config.big_wick_tolerance;
        let close_tolerance = self.config.big_close_tolerance;

        for entry in self.references.iter_mut() {
            if entry.swing.status != SwingStatus::Active {
                continue;
            }
            let frame = &entry.frame;

            // The favorable extreme advances the location; the unfavorable
            // one probes the defended pivot.
            let (favorable, unfavorable) = match entry.swing.direction {
                Direction::Bull => (bar.high, bar.low),
                Direction::Bear => (bar.low, bar.high),
            };
            entry.max_location = entry.max_location.max(frame.ratio(favorable));

            if !entry.scale.is_big() && entry.max_location >= completion {
                entry.swing.complete();
                events.push(SwingEvent::SwingCompleted {
                    bar_index: bar.index,
                    timestamp: bar.timestamp,
                    swing_id: entry.swing.swing_id.clone(),
                    completion_price: bar.close,
                });
                continue;
            }

            let violated = if entry.scale.is_big() {
                frame.is_violated(unfavorable, wick_tolerance)
                    || frame.is_violated(bar.close, close_tolerance)
            } else {
                frame.is_violated(unfavorable, Decimal::ZERO)
            };
            if violated {
                entry.swing.invalidate();
                events.push(SwingEvent::SwingInvalidated {
                    bar_index: bar.index,
                    timestamp: bar.timestamp,
                    swing_id: entry.swing.swing_id.clone(),
                    reason: InvalidationReason::ToleranceExceeded,
                });
            }
        }

        events
    }

    // ── Level-cross tracking ───────────────────────────────────────────

    /// Subscribe a leg for level crossing. Idempotent; at most
    /// MAX_TRACKED_LEGS subscriptions, beyond which a soft error is
    /// returned and existing subscriptions are untouched.
    pub fn add_crossing_tracking(&mut self, leg_id: &str) -> Result<(), ReferenceError> {
        if self.tracked_legs.iter().any(|id| id == leg_id) {
            return Ok(());
        }
        if self.tracked_legs.len() >= MAX_TRACKED_LEGS {
            return Err(ReferenceError::TrackingLimitExceeded {
                max: MAX_TRACKED_LEGS,
            });
        }
        self.tracked_legs.push(leg_id.to_string());
        Ok(())
    }

    /// Drop a subscription and its baseline, freeing a slot.
    pub fn remove_crossing_tracking(&mut self, leg_id: &str) {
        self.tracked_legs.retain(|id| id != leg_id);
        self.last_leg_location.remove(leg_id);
    }

    pub fn tracked_leg_ids(&self) -> &[String] {
        &self.tracked_legs
    }

    /// Detect level crossings for tracked legs on this bar's close. The
    /// frame is the leg's own: location 0 at the pivot, 1 at the origin.
    /// The first observation of a leg seeds the baseline without events.
    /// Events are returned and also accumulate until drained.
    pub fn detect_level_crossings(&mut self, legs: &[Leg], bar: &Bar) -> Vec<SwingEvent> {
        let mut events = Vec::new();

        for leg in legs {
            if !self.tracked_legs.iter().any(|id| id == &leg.leg_id) {
                continue;
            }
            if leg.range().is_zero() {
                continue;
            }
            let Ok(frame) = ReferenceFrame::new(leg.pivot_price, leg.origin_price, leg.direction)
            else {
                continue;
            };
            let location = frame.ratio(bar.close);
            let Some(previous) = self.last_leg_location.insert(leg.leg_id.clone(), location)
            else {
                continue;
            };

            let mut last_level = quantize_to_fib_level(previous);
            for level in fib_levels_between(previous, location) {
                events.push(SwingEvent::LevelCross {
                    bar_index: bar.index,
                    timestamp: bar.timestamp,
                    subject_id: leg.leg_id.clone(),
                    level,
                    previous_level: last_level,
                    price: bar.close,
                });
                last_level = level;
            }
        }

        self.pending_cross_events.extend(events.iter().cloned());
        events
    }

    /// Drain the accumulated level-cross events.
    pub fn take_pending_cross_events(&mut self) -> Vec<SwingEvent> {
        std::mem::take(&mut self.pending_cross_events)
    }
}

/// Nearest standard fib level, clamped to the grid's ends.
pub fn quantize_to_fib_level(location: Decimal) -> Decimal {
    let mut nearest = STANDARD_FIB_LEVELS[0];
    let mut best = (location - nearest).abs();
    for level in STANDARD_FIB_LEVELS {
        let distance = (location - level).abs();
        if distance < best {
            best = distance;
            nearest = level;
        }
    }
    nearest
}

/// Grid levels crossed moving from one location to another. Landing exactly
/// on a level counts; leaving one does not re-cross it. Results follow the
/// direction of movement.
pub fn fib_levels_between(from: Decimal, to: Decimal) -> Vec<Decimal> {
    let mut crossed = Vec::new();
    if to > from {
        for level in STANDARD_FIB_LEVELS {
            if from < level && level <= to {
                crossed.push(level);
            }
        }
    } else if to < from {
        for level in STANDARD_FIB_LEVELS.iter().rev() {
            if to <= *level && *level < from {
                crossed.push(*level);
            }
        }
    }
    crossed
}
