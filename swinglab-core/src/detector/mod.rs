//! The structural layer: streaming leg detection, pruning, and swing
//! formation.

pub mod engine;
pub mod events;
pub mod leg;
pub mod population;
pub mod pruner;
pub mod state;
pub mod swing;

pub use engine::LegDetector;
pub use events::{InvalidationReason, PruneReason, SwingEvent};
pub use leg::{Leg, LegStatus, OriginSource, PendingOrigin};
pub use population::ImpulsePopulation;
pub use state::{ByDirection, DetectorError, DetectorState};
pub use swing::{SwingNode, SwingStatus};
