//! Correlated Gaussian sampling
//!
//! Draws `x ~ N(0, C)` for a covariance `C` that may be singular (the
//! estimator starts from a zero covariance, and drift models often leave
//! some modes untouched). The factor `L = V diag(sqrt(λ))` comes from the
//! symmetric eigendecomposition rather than a Cholesky factorization, so
//! positive semi-definite inputs are accepted as-is.

use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::linalg::{symmetric_eigen, EIGEN_RELATIVE_TOLERANCE};
use crate::MathError;

/// Zero-mean multivariate normal distribution with a fixed covariance
#[derive(Debug, Clone)]
pub struct CorrelatedNormal {
    /// Square-root factor, `factor · factorᵀ = covariance`
    factor: Array2<f64>,
}

impl CorrelatedNormal {
    /// Build the sampler for a symmetric positive semi-definite covariance
    ///
    /// Eigenvalues within round-off of zero are clipped to zero; a clearly
    /// negative eigenvalue is rejected.
    pub fn new(covariance: &ArrayView2<f64>) -> Result<Self, MathError> {
        let eig = symmetric_eigen(covariance)?;
        let n = eig.values.len();

        let scale = eig.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let mut factor = Array2::<f64>::zeros((n, n));
        for (k, &value) in eig.values.iter().enumerate() {
            if value < -EIGEN_RELATIVE_TOLERANCE * scale {
                return Err(MathError::NegativeEigenvalue { index: k, value });
            }
            let std = value.max(0.0).sqrt();
            for row in 0..n {
                factor[[row, k]] = eig.vectors[[row, k]] * std;
            }
        }

        Ok(Self { factor })
    }

    /// Dimension of the sampled vectors
    pub fn dim(&self) -> usize {
        self.factor.nrows()
    }

    /// Draw one sample
    ///
    /// Always consumes exactly `dim()` standard normal draws from `rng`, even
    /// for a zero covariance, so sequences stay aligned across runs that only
    /// differ in the covariance.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<f64> {
        let z = Array1::from_iter((0..self.dim()).map(|_| {
            let draw: f64 = StandardNormal.sample(&mut *rng);
            draw
        }));
        self.factor.dot(&z)
    }
}
