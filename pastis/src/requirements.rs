//! Error budgets from a PASTIS matrix
//!
//! The eigenvectors of `M` are the PASTIS modes: independent aberration
//! patterns ordered from most (largest eigenvalue) to least damaging. A
//! contrast allocation `c_target - c0` is split evenly between the `n` modes
//! to give per-mode tolerances `σ`, or mapped back to independent
//! per-segment tolerances `μ`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use pastis_math::{pinv, symmetric_eigen, EIGEN_RELATIVE_TOLERANCE, PINV_RCOND};
use serde::{Deserialize, Serialize};

use crate::error::{PastisError, PastisResult};
use crate::matrix::PastisMatrix;

/// Contrast left for aberrations, `c_target - c0`
///
/// Equal target and floor leave a budget of exactly zero.
pub fn contrast_budget(c_target: f64, c_floor: f64) -> PastisResult<f64> {
    if !(c_target.is_finite() && c_floor.is_finite()) {
        return Err(PastisError::invalid(
            "c_target",
            format!("target {c_target} and floor {c_floor} must be finite"),
        ));
    }
    if c_target < c_floor {
        return Err(PastisError::TargetBelowFloor {
            target: c_target,
            floor: c_floor,
        });
    }
    Ok(c_target - c_floor)
}

/// Tolerance `sqrt(budget / (n λ))` with the zero-budget and zero-λ limits
fn tolerance(budget: f64, share: f64, eigenvalue: f64) -> f64 {
    if budget == 0.0 {
        0.0
    } else if eigenvalue == 0.0 {
        f64::INFINITY
    } else {
        (budget / (share * eigenvalue)).sqrt()
    }
}

/// Per-mode tolerance for `n` modes sharing the budget evenly
pub fn calculate_sigma(c_target: f64, c_floor: f64, num_modes: usize, eigenvalue: f64) -> PastisResult<f64> {
    let budget = contrast_budget(c_target, c_floor)?;
    Ok(tolerance(budget, num_modes as f64, eigenvalue))
}

/// Tolerance when a single mode takes the whole budget, `sqrt((c_target - c0) / λ)`
pub fn single_mode_sigma(c_target: f64, c_floor: f64, eigenvalue: f64) -> PastisResult<f64> {
    let budget = contrast_budget(c_target, c_floor)?;
    Ok(tolerance(budget, 1.0, eigenvalue))
}

/// Allowed dynamic amplitude of one mode, `sqrt(c_dyn / (sqrt(n) λ))`
pub fn delta_sigma(c_dyn: f64, num_modes: usize, eigenvalue: f64) -> PastisResult<f64> {
    if c_dyn < 0.0 {
        return Err(PastisError::invalid("c_dyn", format!("must be non-negative, got {c_dyn}")));
    }
    Ok(tolerance(c_dyn, (num_modes as f64).sqrt(), eigenvalue))
}

/// How mode contributions are accumulated in [`PastisModes::contrast_per_mode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accumulation {
    /// Aberration `Σ_{m<=k} σ_m v_m`
    Cumulative,
    /// Aberration `σ_k v_k`
    Individual,
}

/// Eigendecomposition of a PASTIS matrix
#[derive(Debug, Clone)]
pub struct PastisModes {
    /// Eigenvalues in descending order, near-zero values snapped to zero
    eigenvalues: Array1<f64>,
    /// `[segments, modes]`, column `k` is mode `k`
    modes: Array2<f64>,
}

impl PastisModes {
    /// Decompose `M`, rejecting clearly negative eigenvalues
    pub fn from_matrix(matrix: &PastisMatrix) -> PastisResult<Self> {
        let eig = symmetric_eigen(&matrix.view())?;
        let scale = eig.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let tol = EIGEN_RELATIVE_TOLERANCE * scale;

        if let Some((index, &value)) = eig.values.iter().enumerate().find(|(_, v)| **v < -tol) {
            return Err(PastisError::NegativeEigenvalue { index, value });
        }
        let eigenvalues = eig.values.mapv(|v| if v.abs() <= tol { 0.0 } else { v });
        let zeros = eigenvalues.iter().filter(|v| **v == 0.0).count();
        if zeros > 0 {
            log::warn!("{zeros} PASTIS eigenvalues are numerically zero; their tolerances are unbounded");
        }

        Ok(Self {
            eigenvalues,
            modes: eig.vectors,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn eigenvalues(&self) -> ArrayView1<'_, f64> {
        self.eigenvalues.view()
    }

    /// Mode matrix `V`, `[segments, modes]`
    pub fn modes(&self) -> ArrayView2<'_, f64> {
        self.modes.view()
    }

    pub fn mode(&self, k: usize) -> ArrayView1<'_, f64> {
        self.modes.column(k)
    }

    /// Per-mode tolerances `σ_i = sqrt((c_target - c0) / (n λ_i))`
    pub fn uniform_sigmas(&self, c_target: f64, c_floor: f64) -> PastisResult<Array1<f64>> {
        let budget = contrast_budget(c_target, c_floor)?;
        let n = self.num_modes() as f64;
        Ok(self.eigenvalues.mapv(|lambda| tolerance(budget, n, lambda)))
    }

    /// Independent per-segment tolerances `μ_j`
    ///
    /// `μ_j = sqrt(((c_target - c0)/n) / Σ_k c_k · W[k,j]²)` with
    /// `W = pinv(V)` and `c_k = v_kᵀ M v_k`.
    pub fn segment_tolerances(
        &self,
        matrix: &PastisMatrix,
        c_target: f64,
        c_floor: f64,
    ) -> PastisResult<Array1<f64>> {
        let budget = contrast_budget(c_target, c_floor)?;
        let n = self.num_modes();
        let modes_to_segs = pinv(&self.modes.view(), PINV_RCOND)?;

        let mut mode_contrasts = Array1::<f64>::zeros(n);
        for k in 0..n {
            mode_contrasts[k] = matrix.pastis_contrast(&self.mode(k))?;
        }

        let mus = (0..n)
            .map(|j| {
                let denominator: f64 = (0..n)
                    .map(|k| mode_contrasts[k] * modes_to_segs[[k, j]].powi(2))
                    .sum();
                tolerance(budget, n as f64, denominator)
            })
            .collect();
        Ok(mus)
    }

    /// Aberration in segment space for weights on the modes, `V·w`
    pub fn aberration(&self, weights: &ArrayView1<f64>) -> PastisResult<Array1<f64>> {
        self.check_weights(weights)?;
        Ok(self.modes.dot(weights))
    }

    /// Contrast after adding modes one at a time (or singly), weighted by `sigmas`
    pub fn contrast_per_mode(
        &self,
        matrix: &PastisMatrix,
        sigmas: &ArrayView1<f64>,
        c_floor: f64,
        accumulation: Accumulation,
    ) -> PastisResult<Array1<f64>> {
        self.check_weights(sigmas)?;
        let n = self.num_modes();
        let mut aberration = Array1::<f64>::zeros(n);
        let mut contrasts = Array1::<f64>::zeros(n);

        for k in 0..n {
            let contribution = &self.mode(k) * sigmas[k];
            match accumulation {
                Accumulation::Cumulative => aberration += &contribution,
                Accumulation::Individual => aberration = contribution,
            }
            contrasts[k] = matrix.contrast(&aberration.view(), c_floor)?;
        }
        Ok(contrasts)
    }

    /// Mode-space covariance `Cb = Vᵀ Ca V` of a segment covariance
    pub fn mode_covariance(&self, segment_covariance: &ArrayView2<f64>) -> PastisResult<Array2<f64>> {
        let n = self.num_modes();
        if segment_covariance.dim() != (n, n) {
            return Err(PastisError::ShapeMismatch {
                what: "segment covariance".to_string(),
                expected: vec![n, n],
                actual: vec![segment_covariance.nrows(), segment_covariance.ncols()],
            });
        }
        Ok(self.modes.t().dot(segment_covariance).dot(&self.modes))
    }

    /// Mode tolerances implied by independent segment tolerances `μ`
    ///
    /// `Ca = diag(μ²)`, `σ_opt = sqrt(diag(Vᵀ Ca V))`.
    pub fn optimized_sigmas(&self, mus: &ArrayView1<f64>) -> PastisResult<Array1<f64>> {
        self.check_weights(mus)?;
        let ca = Array2::from_diag(&mus.mapv(|m| m * m));
        let cb = self.mode_covariance(&ca.view())?;
        Ok(cb.diag().mapv(f64::sqrt))
    }

    fn check_weights(&self, weights: &ArrayView1<f64>) -> PastisResult<()> {
        if weights.len() != self.num_modes() {
            return Err(PastisError::ModeVectorLength {
                expected: self.num_modes(),
                actual: weights.len(),
            });
        }
        Ok(())
    }
}

/// Requirement vector persisted with its units and basis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementVector {
    /// `"mode"` or `"segment"`
    pub basis: String,
    pub units: String,
    pub values: Array1<f64>,
}

impl RequirementVector {
    pub fn modes(values: Array1<f64>) -> Self {
        Self {
            basis: "mode".to_string(),
            units: "nm".to_string(),
            values,
        }
    }

    pub fn segments(values: Array1<f64>) -> Self {
        Self {
            basis: "segment".to_string(),
            units: "nm".to_string(),
            values,
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> PastisResult<()> {
        crate::io::write_json(path, self)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> PastisResult<Self> {
        crate::io::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn diagonal() -> PastisMatrix {
        PastisMatrix::new(array![[4.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.25]]).unwrap()
    }

    #[test]
    fn test_eigenvalues_descending() {
        let modes = PastisModes::from_matrix(&diagonal()).unwrap();
        let expected = [4.0, 1.0, 0.25];
        for (got, want) in modes.eigenvalues().iter().zip(expected) {
            assert_relative_eq!(*got, want, max_relative = 1e-12);
        }
        assert_relative_eq!(modes.mode(2)[2], 1.0);
    }

    #[test]
    fn test_sigma_scales_inverse_sqrt_lambda() {
        let modes = PastisModes::from_matrix(&diagonal()).unwrap();
        let sigmas = modes.uniform_sigmas(4.0, 1.0).unwrap();
        // budget 3 over 3 modes -> 1/λ
        assert_relative_eq!(sigmas[0], 0.5, max_relative = 1e-12);
        assert_relative_eq!(sigmas[1], 1.0, max_relative = 1e-12);
        assert_relative_eq!(sigmas[2], 2.0, max_relative = 1e-12);
        assert_relative_eq!(calculate_sigma(4.0, 1.0, 3, 4.0).unwrap(), 0.5);
    }

    #[test]
    fn test_target_equal_floor_gives_zero() {
        let modes = PastisModes::from_matrix(&diagonal()).unwrap();
        let sigmas = modes.uniform_sigmas(1e-10, 1e-10).unwrap();
        assert!(sigmas.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_target_below_floor_rejected() {
        let modes = PastisModes::from_matrix(&diagonal()).unwrap();
        assert!(matches!(
            modes.uniform_sigmas(1e-11, 1e-10),
            Err(PastisError::TargetBelowFloor { .. })
        ));
    }

    #[test]
    fn test_negative_eigenvalue_rejected() {
        let m = PastisMatrix::new(array![[1.0, 2.0], [2.0, 1.0]]).unwrap();
        assert!(matches!(
            PastisModes::from_matrix(&m),
            Err(PastisError::NegativeEigenvalue { index: 1, .. })
        ));
    }

    #[test]
    fn test_zero_eigenvalue_is_unbounded() {
        let m = PastisMatrix::new(array![[1.0, 1.0], [1.0, 1.0]]).unwrap();
        let modes = PastisModes::from_matrix(&m).unwrap();
        assert_eq!(modes.eigenvalues()[1], 0.0);
        let sigmas = modes.uniform_sigmas(2.0, 0.0).unwrap();
        assert!(sigmas[1].is_infinite());
    }

    #[test]
    fn test_single_and_dynamic_sigma() {
        assert_relative_eq!(single_mode_sigma(5.0, 1.0, 4.0).unwrap(), 1.0);
        assert_relative_eq!(delta_sigma(8.0, 4, 1.0).unwrap(), 2.0);
        assert!(delta_sigma(-1.0, 4, 1.0).is_err());
    }

    #[test]
    fn test_segment_tolerances_on_diagonal_matrix() {
        let m = diagonal();
        let modes = PastisModes::from_matrix(&m).unwrap();
        let mus = modes.segment_tolerances(&m, 4.0, 1.0).unwrap();
        // Diagonal M: μ_j = sqrt(1 / M_jj)
        assert_relative_eq!(mus[0], 0.5, max_relative = 1e-12);
        assert_relative_eq!(mus[2], 2.0, max_relative = 1e-12);

        let sigma_opt = modes.optimized_sigmas(&mus.view()).unwrap();
        assert_relative_eq!(sigma_opt[0], 0.5, max_relative = 1e-12);
    }

    #[test]
    fn test_individual_contrast() {
        let m = diagonal();
        let modes = PastisModes::from_matrix(&m).unwrap();
        let sigmas = array![1.0, 1.0, 2.0];
        let individual = modes
            .contrast_per_mode(&m, &sigmas.view(), 0.5, Accumulation::Individual)
            .unwrap();
        assert_relative_eq!(individual[0], 4.5, max_relative = 1e-12);
        assert_relative_eq!(individual[2], 1.5, max_relative = 1e-12);
    }
}
