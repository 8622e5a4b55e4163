//! Error taxonomy for the PASTIS core
//!
//! Every failure is returned to the immediate caller; nothing in the core
//! retries or clamps. The variants group into four families:
//!
//! - calibration: [`PastisError::CalibrationTooSmall`]
//! - numerical singularity: [`PastisError::SingularMatrix`]
//! - shape/contract violations: [`PastisError::ShapeMismatch`],
//!   [`PastisError::ModeVectorLength`], [`PastisError::EmptyDarkHole`],
//!   [`PastisError::InvalidParameter`]
//! - invalid contrast models: [`PastisError::NegativeEigenvalue`],
//!   [`PastisError::TargetBelowFloor`]

use pastis_math::MathError;
use thiserror::Error;

/// Errors raised by matrix construction, requirement solving and estimation
#[derive(Error, Debug)]
pub enum PastisError {
    #[error(
        "calibration amplitude too small: PASTIS diagonal entry for mode {mode} is negative ({value:.6e})"
    )]
    CalibrationTooSmall { mode: usize, value: f64 },

    #[error("singular matrix ({size}x{size}) in {context}")]
    SingularMatrix { context: String, size: usize },

    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("mode vector has length {actual}, forward model expects {expected}")]
    ModeVectorLength { expected: usize, actual: usize },

    #[error("dark hole mask selects no pixels")]
    EmptyDarkHole,

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(
        "eigenvalue {index} of the PASTIS matrix is negative ({value:.6e}); not a valid contrast model"
    )]
    NegativeEigenvalue { index: usize, value: f64 },

    #[error("target contrast {target:.3e} is below the coronagraph floor {floor:.3e}")]
    TargetBelowFloor { target: f64, floor: f64 },

    #[error("numerical error: {0}")]
    Math(MathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result alias used throughout the crate
pub type PastisResult<T> = Result<T, PastisError>;

impl PastisError {
    /// Attach a context label to a singular-matrix failure from `pastis-math`
    pub fn singular_in(context: &str) -> impl FnOnce(MathError) -> PastisError + '_ {
        move |err| match err {
            MathError::SingularMatrix { size } => PastisError::SingularMatrix {
                context: context.to_string(),
                size,
            },
            other => PastisError::from(other),
        }
    }

    /// Shorthand for [`PastisError::InvalidParameter`]
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        PastisError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<MathError> for PastisError {
    fn from(err: MathError) -> Self {
        match err {
            MathError::SingularMatrix { size } => PastisError::SingularMatrix {
                context: "matrix inversion".to_string(),
                size,
            },
            MathError::ShapeMismatch {
                what,
                expected,
                actual,
            } => PastisError::ShapeMismatch {
                what,
                expected,
                actual,
            },
            MathError::EmptyMask => PastisError::EmptyDarkHole,
            MathError::NegativeEigenvalue { index, value } => {
                PastisError::NegativeEigenvalue { index, value }
            }
            other => PastisError::Math(other),
        }
    }
}
