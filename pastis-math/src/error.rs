//! Error type shared by the numerical helpers

use thiserror::Error;

/// Errors produced by the linear algebra, statistics and resampling helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("singular matrix of size {size}x{size} cannot be inverted")]
    SingularMatrix { size: usize },

    #[error("SVD decomposition failed: {0}")]
    SvdFailed(String),

    #[error("covariance is not positive semi-definite: eigenvalue {index} = {value:.6e}")]
    NegativeEigenvalue { index: usize, value: f64 },

    #[error("mask selects no pixels")]
    EmptyMask,

    #[error("cannot split a {rows}x{cols} array into {factor}x{factor} blocks")]
    IndivisibleShape {
        rows: usize,
        cols: usize,
        factor: usize,
    },

    #[error("non-finite value encountered in {0}")]
    NonFinite(String),
}
