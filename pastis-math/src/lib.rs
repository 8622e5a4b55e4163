//! pastis-math - Numerical building blocks for PASTIS contrast analysis
//!
//! This crate provides the leaf-level algorithms shared by the matrix
//! builder, the requirement solver and the closed-loop estimator:
//!
//! - **Pairs** - Minimal (i, j) pair enumeration for filling symmetric matrices
//! - **Linalg** - Inverse, pseudo-inverse and symmetric eigendecomposition on
//!   `ndarray` arrays, backed by `nalgebra`
//! - **Stats** - Dark-hole masked means and zero-mean RMS
//! - **Resample** - Block-sum downsampling of 2D fields
//! - **Sampling** - Correlated Gaussian draws from a (possibly singular) covariance
//!
//! # Example
//!
//! ```text
//! use pastis_math::{mode_pairs_non_repeating, symmetrize_upper};
//! use ndarray::Array2;
//!
//! let n = 3;
//! let mut half = Array2::<f64>::zeros((n, n));
//! for (i, j) in mode_pairs_non_repeating(n) {
//!     half[[i, j]] = (i + j) as f64;
//! }
//! let full = symmetrize_upper(&half.view()).unwrap();
//! assert_eq!(full[[2, 0]], full[[0, 2]]);
//! ```

pub mod error;
pub mod linalg;
pub mod pairs;
pub mod resample;
pub mod sampling;
pub mod stats;

// Re-export commonly used types
pub use error::MathError;
pub use linalg::{
    from_dmatrix, invert, is_symmetric, pinv, quadratic_form, symmetric_eigen, symmetrize_upper,
    to_dmatrix, trace, SymmetricEigen, EIGEN_RELATIVE_TOLERANCE, PINV_RCOND,
};
pub use pairs::{mode_pairs_all, mode_pairs_non_repeating, pair_measurement_count, ModePairs};
pub use resample::{block_sum, downsample_field};
pub use sampling::CorrelatedNormal;
pub use stats::{masked_mean, mean, rms};
