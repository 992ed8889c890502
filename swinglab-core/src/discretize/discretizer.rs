//! Discretizer — batch replay of OHLC plus detected swings into an ordered
//! structural event log.
//!
//! Design:
//! - batch-only: no streaming state survives a call
//! - per-scale independence: scales interact only through the parent
//!   context side-channel
//! - config-driven levels and semantics, recorded in the log for corpus
//!   comparability
//! - no lookahead: every annotation uses data up to the current bar

use crate::discretize::schema::{
    CrossingSemantics, DiscretizationEvent, DiscretizationLog, DiscretizationMeta,
    DiscretizeError, DiscretizerConfig, EffortAnnotation, EventType, ParentContext,
    ShockAnnotation, SwingEntry, SwingEntryStatus,
};
use crate::domain::{Bar, Direction, Scale};
use crate::frame::ReferenceFrame;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};

/// Completion target on the ratio axis.
const COMPLETION_RATIO: Decimal = dec!(2.0);

/// A detected swing handed to the discretizer: raw extremes plus the bars
/// that made them.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSwing {
    pub direction: Direction,
    pub high_price: Decimal,
    pub high_bar_index: u64,
    pub low_price: Decimal,
    pub low_bar_index: u64,
}

impl DetectedSwing {
    /// The bar on which the swing is considered formed: the later anchor.
    pub fn formed_bar(&self) -> u64 {
        self.high_bar_index.max(self.low_bar_index)
    }
}

/// Band dwell bookkeeping for the effort side-channel.
#[derive(Debug, Clone)]
struct DwellState {
    entry_bar: u64,
    test_count: u32,
    max_probe_r: Option<Decimal>,
}

/// Live tracking state for one swing during the replay.
#[derive(Debug, Clone)]
struct ActiveSwing {
    entry_index: usize,
    scale: Scale,
    frame: ReferenceFrame,
    previous_ratio: Decimal,
    previous_band: String,
    dwell: DwellState,
    terminated: bool,
}

/// Batch discretizer: OHLC + swings per scale -> event log.
pub struct Discretizer {
    config: DiscretizerConfig,
}

impl Discretizer {
    pub fn new(config: DiscretizerConfig) -> Result<Self, DiscretizeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DiscretizerConfig {
        &self.config
    }

    /// Replay the bars against the detected swings and produce the log.
    pub fn discretize(
        &self,
        bars: &[Bar],
        swings: &BTreeMap<Scale, Vec<DetectedSwing>>,
        instrument: &str,
        source_resolution: &str,
    ) -> Result<DiscretizationLog, DiscretizeError> {
        validate_bars(bars)?;
        self.validate_swings(bars, swings)?;

        let mut events: Vec<DiscretizationEvent> = Vec::new();
        let mut swing_entries: Vec<SwingEntry> = Vec::new();
        let mut active: Vec<ActiveSwing> = Vec::new();

        let mut rolling: BTreeMap<Scale, VecDeque<Decimal>> = self
            .config
            .rolling_window_sizes
            .keys()
            .map(|scale| (*scale, VecDeque::new()))
            .collect();

        // Swings indexed by formation bar, in scale order.
        let mut by_formation_bar: BTreeMap<u64, Vec<(Scale, DetectedSwing)>> = BTreeMap::new();
        for (scale, list) in swings {
            for swing in list {
                by_formation_bar
                    .entry(swing.formed_bar())
                    .or_default()
                    .push((*scale, swing.clone()));
            }
        }

        let date_range_start = bars.first().map(|b| iso_timestamp(b.timestamp)).unwrap_or_default();
        let date_range_end = bars.last().map(|b| iso_timestamp(b.timestamp)).unwrap_or_default();

        let mut prev_close: Option<Decimal> = None;

        for bar in bars {
            let timestamp = iso_timestamp(bar.timestamp);
            let bar_range = bar.range();

            // Gap detection against the previous close.
            let (is_gap, gap_size) = match prev_close {
                Some(prev) => {
                    let gap = (bar.open - prev).abs();
                    (gap > prev.abs() * self.config.gap_threshold_pct, gap)
                }
                None => (false, Decimal::ZERO),
            };

            // Push the bar range into every scale window, bounded by its
            // configured capacity.
            for (scale, window) in rolling.iter_mut() {
                let capacity = self.config.rolling_window_sizes[scale];
                if window.len() == capacity {
                    window.pop_front();
                }
                window.push_back(bar_range);
            }

            // Register swings formed on this bar.
            if let Some(formed) = by_formation_bar.get(&bar.index) {
                for (scale, swing) in formed {
                    let (anchor0, anchor1, anchor0_bar, anchor1_bar) = match swing.direction {
                        Direction::Bull => (
                            swing.low_price,
                            swing.high_price,
                            swing.low_bar_index,
                            swing.high_bar_index,
                        ),
                        Direction::Bear => (
                            swing.high_price,
                            swing.low_price,
                            swing.high_bar_index,
                            swing.low_bar_index,
                        ),
                    };
                    let swing_id =
                        format!("swing_{scale}_{}_{anchor0}_{anchor0_bar}", swing.direction);
                    let frame = ReferenceFrame::new(anchor0, anchor1, swing.direction)
                        .map_err(|e| DiscretizeError::InconsistentSwings(e.to_string()))?;

                    let entry = SwingEntry {
                        swing_id: swing_id.clone(),
                        scale: *scale,
                        direction: swing.direction,
                        anchor0,
                        anchor1,
                        anchor0_bar,
                        anchor1_bar,
                        formed_at_bar: bar.index,
                        status: SwingEntryStatus::Active,
                        terminated_at_bar: None,
                        termination_reason: None,
                    };
                    let entry_index = swing_entries.len();
                    swing_entries.push(entry);

                    let initial_ratio = frame.ratio(bar.close);
                    let initial_band = band_label(initial_ratio, &self.config.level_set);
                    active.push(ActiveSwing {
                        entry_index,
                        scale: *scale,
                        frame,
                        previous_ratio: initial_ratio,
                        previous_band: initial_band.clone(),
                        dwell: DwellState {
                            entry_bar: bar.index,
                            test_count: 0,
                            max_probe_r: None,
                        },
                        terminated: false,
                    });

                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id: swing_id.clone(),
                        event_type: EventType::SwingFormed,
                        data: json!({
                            "swing_id": swing_id,
                            "scale": scale,
                            "direction": swing.direction,
                            "anchor0": anchor0,
                            "anchor1": anchor1,
                        }),
                        effort: None,
                        shock: None,
                        parent_context: None,
                    });
                }
            }

            // Walk every active swing against this bar.
            for i in 0..active.len() {
                if active[i].terminated {
                    continue;
                }
                let scale = active[i].scale;
                let frame = active[i].frame.clone();
                let previous_ratio = active[i].previous_ratio;
                let current_ratio = frame.ratio(bar.close);

                // Crossing tolerance lives on the ratio axis: the config
                // fraction of the swing size maps to the same fraction of
                // a ratio unit.
                let ratio_tolerance = self.config.crossing_tolerance_pct;

                let median_range = median(rolling[&scale].iter().copied()).unwrap_or(bar_range);
                let range_multiple = if median_range.is_zero() {
                    Decimal::ONE
                } else {
                    bar_range / median_range
                };
                let gap_multiple = if is_gap && !median_range.is_zero() {
                    Some(gap_size / median_range)
                } else {
                    None
                };

                let current_band = band_label(current_ratio, &self.config.level_set);
                let band_changed = current_band != active[i].previous_band;

                let crossed = self.detect_level_crossings(previous_ratio, current_ratio, ratio_tolerance);

                // Effort: closed out when the band changes; otherwise the
                // dwell state absorbs wick probes past the band boundary.
                let effort = if band_changed {
                    let dwell = &active[i].dwell;
                    let annotation = EffortAnnotation {
                        dwell_bars: bar.index - dwell.entry_bar,
                        test_count: dwell.test_count,
                        max_probe_r: dwell.max_probe_r,
                    };
                    active[i].dwell = DwellState {
                        entry_bar: bar.index,
                        test_count: 0,
                        max_probe_r: None,
                    };
                    Some(annotation)
                } else {
                    self.record_band_probe(&mut active[i], &frame, bar, current_ratio);
                    None
                };

                let shock = ShockAnnotation {
                    levels_jumped: crossed.len(),
                    range_multiple,
                    gap_multiple,
                    is_gap,
                };

                let parent_context =
                    self.parent_context(scale, &active, &swing_entries, bar.close);

                let cross_direction = if current_ratio > previous_ratio { "up" } else { "down" };

                for (n, level) in crossed.iter().enumerate() {
                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id: swing_entries[active[i].entry_index].swing_id.clone(),
                        event_type: EventType::LevelCross,
                        data: json!({
                            "from_ratio": previous_ratio,
                            "to_ratio": current_ratio,
                            "level_crossed": level,
                            "direction": cross_direction,
                        }),
                        effort: if n == 0 { effort.clone() } else { None },
                        shock: Some(shock.clone()),
                        parent_context: parent_context.clone(),
                    });
                }

                // Completion before invalidation; inclusive at the target.
                if current_ratio >= COMPLETION_RATIO && previous_ratio < COMPLETION_RATIO {
                    let swing_id = swing_entries[active[i].entry_index].swing_id.clone();
                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id: swing_id.clone(),
                        event_type: EventType::Completion,
                        data: json!({ "completion_ratio": current_ratio }),
                        effort: if crossed.is_empty() { effort.clone() } else { None },
                        shock: Some(shock.clone()),
                        parent_context: parent_context.clone(),
                    });
                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id,
                        event_type: EventType::SwingTerminated,
                        data: json!({ "termination_type": "COMPLETED" }),
                        effort: None,
                        shock: None,
                        parent_context: None,
                    });
                    terminate(
                        &mut active,
                        &mut swing_entries,
                        i,
                        bar.index,
                        SwingEntryStatus::Completed,
                        "completed".to_string(),
                    );
                    continue;
                }

                let threshold = self.config.invalidation_thresholds[&scale];
                if current_ratio < threshold {
                    let swing_id = swing_entries[active[i].entry_index].swing_id.clone();
                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id: swing_id.clone(),
                        event_type: EventType::Invalidation,
                        data: json!({
                            "invalidation_ratio": current_ratio,
                            "threshold": threshold,
                        }),
                        effort: if crossed.is_empty() { effort.clone() } else { None },
                        shock: Some(shock),
                        parent_context,
                    });
                    events.push(DiscretizationEvent {
                        bar: bar.index,
                        timestamp: timestamp.clone(),
                        swing_id,
                        event_type: EventType::SwingTerminated,
                        data: json!({ "termination_type": "INVALIDATED" }),
                        effort: None,
                        shock: None,
                        parent_context: None,
                    });
                    terminate(
                        &mut active,
                        &mut swing_entries,
                        i,
                        bar.index,
                        SwingEntryStatus::Invalidated,
                        format!("invalidated at {current_ratio}"),
                    );
                    continue;
                }

                active[i].previous_ratio = current_ratio;
                active[i].previous_band = current_band;
            }

            prev_close = Some(bar.close);
        }

        let meta = DiscretizationMeta {
            instrument: instrument.to_string(),
            source_resolution: source_resolution.to_string(),
            date_range_start,
            date_range_end,
            created_at: Utc::now().to_rfc3339(),
            config: self.config.clone(),
        };

        Ok(DiscretizationLog {
            meta,
            swings: swing_entries,
            events,
        })
    }

    // ── Helpers ────────────────────────────────────────────────────────

    /// Levels strictly between the two ratios, within tolerance, ordered
    /// along the direction of movement. The reserved semantics fall back
    /// to close-to-close detection.
    fn detect_level_crossings(
        &self,
        from: Decimal,
        to: Decimal,
        tolerance: Decimal,
    ) -> Vec<Decimal> {
        match self.config.crossing_semantics {
            CrossingSemantics::CloseCross
            | CrossingSemantics::OpenCloseCross
            | CrossingSemantics::WickTouch => levels_between(from, to, &self.config.level_set, tolerance),
        }
    }

    /// Count a wick probe past the current band boundary that closed back
    /// inside, and deepen the max excursion.
    fn record_band_probe(
        &self,
        swing: &mut ActiveSwing,
        frame: &ReferenceFrame,
        bar: &Bar,
        current_ratio: Decimal,
    ) {
        let Some((lower, upper)) = band_bounds(current_ratio, &self.config.level_set) else {
            return;
        };
        let r_high = frame.ratio(bar.high);
        let r_low = frame.ratio(bar.low);
        let (wick_max, wick_min) = (r_high.max(r_low), r_high.min(r_low));

        let mut excursion: Option<Decimal> = None;
        if let Some(upper) = upper {
            if wick_max > upper {
                excursion = Some(wick_max - upper);
            }
        }
        if let Some(lower) = lower {
            if wick_min < lower {
                let below = lower - wick_min;
                excursion = Some(excursion.map_or(below, |e| e.max(below)));
            }
        }
        if let Some(excursion) = excursion {
            swing.dwell.test_count += 1;
            swing.dwell.max_probe_r = Some(
                swing
                    .dwell
                    .max_probe_r
                    .map_or(excursion, |m| m.max(excursion)),
            );
        }
    }

    /// Nearest larger-scale active swing, walking S -> M -> L -> XL.
    fn parent_context(
        &self,
        scale: Scale,
        active: &[ActiveSwing],
        entries: &[SwingEntry],
        close: Decimal,
    ) -> Option<ParentContext> {
        let mut parent_scale = scale.parent();
        while let Some(candidate) = parent_scale {
            if let Some(state) = active
                .iter()
                .rev()
                .find(|s| s.scale == candidate && !s.terminated)
            {
                let entry = &entries[state.entry_index];
                let ratio = state.frame.ratio(close);
                return Some(ParentContext {
                    scale: candidate,
                    swing_id: entry.swing_id.clone(),
                    band: band_label(ratio, &self.config.level_set),
                    direction: entry.direction,
                    ratio,
                });
            }
            parent_scale = candidate.parent();
        }
        None
    }

    fn validate_swings(
        &self,
        bars: &[Bar],
        swings: &BTreeMap<Scale, Vec<DetectedSwing>>,
    ) -> Result<(), DiscretizeError> {
        let (min_index, max_index) = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => (first.index, last.index),
            _ => {
                return if swings.values().all(|v| v.is_empty()) {
                    Ok(())
                } else {
                    Err(DiscretizeError::InconsistentSwings(
                        "swings provided without any bars".into(),
                    ))
                }
            }
        };
        for (scale, list) in swings {
            for swing in list {
                for anchor_bar in [swing.high_bar_index, swing.low_bar_index] {
                    if anchor_bar < min_index || anchor_bar > max_index {
                        return Err(DiscretizeError::InconsistentSwings(format!(
                            "{scale} swing anchor bar {anchor_bar} outside OHLC range \
                             [{min_index}, {max_index}]"
                        )));
                    }
                }
                if swing.high_price <= swing.low_price {
                    return Err(DiscretizeError::InconsistentSwings(format!(
                        "{scale} swing has high {} <= low {}",
                        swing.high_price, swing.low_price
                    )));
                }
            }
        }
        Ok(())
    }
}

fn terminate(
    active: &mut [ActiveSwing],
    entries: &mut [SwingEntry],
    index: usize,
    bar_index: u64,
    status: SwingEntryStatus,
    reason: String,
) {
    active[index].terminated = true;
    let entry = &mut entries[active[index].entry_index];
    entry.status = status;
    entry.terminated_at_bar = Some(bar_index);
    entry.termination_reason = Some(reason);
}

fn validate_bars(bars: &[Bar]) -> Result<(), DiscretizeError> {
    for bar in bars {
        if !bar.is_sane() {
            return Err(DiscretizeError::InvalidBars(format!(
                "bar {} violates OHLC ordering",
                bar.index
            )));
        }
    }
    if !bars.windows(2).all(|w| w[0].index < w[1].index) {
        return Err(DiscretizeError::InvalidBars(
            "bar indices must be strictly increasing".into(),
        ));
    }
    Ok(())
}

fn iso_timestamp(seconds: i64) -> String {
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Band label for a ratio: "lower-upper", with sentinels outside the grid.
pub fn band_label(ratio: Decimal, level_set: &[Decimal]) -> String {
    let first = level_set[0];
    let last = level_set[level_set.len() - 1];
    if ratio < first {
        return format!("<{first}");
    }
    if ratio >= last {
        return format!(">={last}");
    }
    for pair in level_set.windows(2) {
        if pair[0] <= ratio && ratio < pair[1] {
            return format!("{}-{}", pair[0], pair[1]);
        }
    }
    "unknown".to_string()
}

/// The half-open band around a ratio: (lower, upper), either side absent at
/// the grid sentinels.
fn band_bounds(ratio: Decimal, level_set: &[Decimal]) -> Option<(Option<Decimal>, Option<Decimal>)> {
    let first = level_set[0];
    let last = level_set[level_set.len() - 1];
    if ratio < first {
        return Some((None, Some(first)));
    }
    if ratio >= last {
        return Some((Some(last), None));
    }
    for pair in level_set.windows(2) {
        if pair[0] <= ratio && ratio < pair[1] {
            return Some((Some(pair[0]), Some(pair[1])));
        }
    }
    None
}

/// Levels crossed moving between two ratios, with a tolerance band around
/// each level, ordered along the direction of movement.
pub fn levels_between(
    from: Decimal,
    to: Decimal,
    level_set: &[Decimal],
    tolerance: Decimal,
) -> Vec<Decimal> {
    if (from - to).abs() < tolerance {
        return Vec::new();
    }
    let mut crossed = Vec::new();
    if to > from {
        for level in level_set {
            if from + tolerance < *level && *level <= to + tolerance {
                crossed.push(*level);
            }
        }
    } else {
        for level in level_set {
            if to - tolerance <= *level && *level < from - tolerance {
                crossed.push(*level);
            }
        }
        crossed.reverse();
    }
    crossed
}

/// Median of a decimal sequence; the mean of the two middles on even
/// counts.
fn median<I: Iterator<Item = Decimal>>(values: I) -> Option<Decimal> {
    let mut sorted: Vec<Decimal> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / dec!(2))
    }
}
