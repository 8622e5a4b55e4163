//! Closed-loop contrast estimation
//!
//! See [`estimator`] for the update rules, [`history`] for the output
//! record and [`sweep`] for exposure/magnitude grids.

pub mod estimator;
pub mod history;
pub mod sweep;

pub use estimator::{
    ClosedLoop, ClosedLoopParams, DetectorNoise, EstimatorState, EstimatorVariant,
    IterationRecord, SensorResponse,
};
pub use history::ClosedLoopHistory;
pub use sweep::{flux_from_magnitude, logspace, ExposureSweep, SweepResult};
