//! Concrete forward models
//!
//! Telescope simulators live outside this crate and plug in through
//! [`crate::forward_model::ForwardModel`]. The linear model here replays a
//! measured calibration and drives the tests and command-line tools.

pub mod linear;

pub use linear::{LinearFieldModel, SyntheticLayout};
