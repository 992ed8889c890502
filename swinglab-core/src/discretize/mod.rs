//! Discretization: OHLC plus detected swings -> canonical structural event
//! log.

pub mod discretizer;
pub mod io;
pub mod schema;

pub use discretizer::{DetectedSwing, Discretizer};
pub use schema::{
    CrossingSemantics, DiscretizationEvent, DiscretizationLog, DiscretizationMeta,
    DiscretizeError, DiscretizerConfig, EffortAnnotation, EventType, ParentContext,
    ShockAnnotation, SwingEntry, SwingEntryStatus,
};
