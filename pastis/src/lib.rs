//! PASTIS: pair-based analytical contrast sensitivity for segmented telescopes
//!
//! This crate builds the PASTIS matrix, a quadratic model of coronagraphic
//! dark-hole contrast in the aberrations of a segmented primary mirror, from
//! any forward model of the telescope. From the matrix it derives error
//! budgets per PASTIS mode and per segment, checks them by Monte Carlo, and
//! estimates the contrast a closed wavefront-sensing loop can hold.

pub mod closed_loop;
pub mod config;
pub mod dark_hole;
pub mod error;
pub mod forward_model;
pub mod io;
pub mod jacobian;
pub mod matrix;
pub mod models;
pub mod monte_carlo;
pub mod requirements;
pub mod sensitivity;
pub mod shared_args;

// Re-exports for easier access
pub use closed_loop::{ClosedLoop, ClosedLoopHistory, ClosedLoopParams, EstimatorState, EstimatorVariant};
pub use config::PastisConfig;
pub use dark_hole::DarkHole;
pub use error::{PastisError, PastisResult};
pub use forward_model::{ForwardModel, Propagation, Reference, ReferenceSummary};
pub use jacobian::Jacobian;
pub use matrix::{Calibration, CoronagraphFloor, MatrixMode, PastisMatrix, PastisMatrixBuilder};
pub use models::LinearFieldModel;
pub use requirements::{Accumulation, PastisModes, RequirementVector};
