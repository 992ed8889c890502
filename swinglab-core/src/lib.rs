//! SwingLab Core — streaming swing-structure detection and discretization.
//!
//! This crate converts a stream of OHLC bars into a discrete log of
//! structural events describing market swings and their lifecycle:
//! - Reference frame: direction-independent ratio coordinates (0 = defended
//!   pivot, 1 = origin, 2 = completion target)
//! - Bar classifier: Inside / Type 2-Bull / Type 2-Bear / Outside
//! - Leg detector and pruner: streaming leg tracking, swing formation,
//!   breach tracking, aggressive pruning of dominated and refuted structure
//! - Reference layer: scale-aware invalidation, completion, and opt-in
//!   level-cross tracking
//! - Discretizer: batch replay of OHLC plus detected swings into a sorted,
//!   annotated event log
//!
//! The crate is a library only: single-threaded, no lookahead, no internal
//! logging. Multiple instruments are handled by running independent
//! detector instances.

pub mod classify;
pub mod config;
pub mod detector;
pub mod discretize;
pub mod domain;
pub mod frame;
pub mod reference;

pub use classify::{classify_bar, BarType};
pub use config::{ConfigError, DetectorConfig, ProximityPruneStrategy};
pub use detector::{
    DetectorError, DetectorState, LegDetector, PruneReason, SwingEvent, SwingNode,
};
pub use discretize::{DetectedSwing, DiscretizationLog, Discretizer, DiscretizerConfig};
pub use domain::{Bar, Direction, Scale};
pub use frame::{FrameError, ReferenceFrame};
pub use reference::{ReferenceError, ReferenceLayer, MAX_TRACKED_LEGS};
