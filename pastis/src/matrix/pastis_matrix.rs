//! The PASTIS matrix and contrast propagation through it

use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView2};
use pastis_math::{quadratic_form, trace};
use serde::{Deserialize, Serialize};

use crate::error::{PastisError, PastisResult};

/// Units tag written with every persisted matrix
pub const MATRIX_UNITS: &str = "contrast/nm^2";

/// Symmetric quadratic contrast model `c(a) = aᵀ M a + c0`
///
/// `M[i,j] == M[j,i]` holds exactly: construction and loading both reject
/// anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct PastisMatrix {
    matrix: Array2<f64>,
}

#[derive(Serialize, Deserialize)]
struct PersistedMatrix {
    units: String,
    shape: [usize; 2],
    data: Array2<f64>,
}

impl PastisMatrix {
    /// Wrap an exactly symmetric square matrix in contrast per nm²
    pub fn new(matrix: Array2<f64>) -> PastisResult<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(PastisError::ShapeMismatch {
                what: "PASTIS matrix".to_string(),
                expected: vec![rows, rows],
                actual: vec![rows, cols],
            });
        }
        if let Some(((i, j), _)) = matrix
            .indexed_iter()
            .find(|&((i, j), &v)| v != matrix[[j, i]])
        {
            return Err(PastisError::invalid(
                "matrix",
                format!(
                    "not symmetric at ({i}, {j}): {} vs {}",
                    matrix[[i, j]],
                    matrix[[j, i]]
                ),
            ));
        }
        Ok(Self { matrix })
    }

    pub fn num_modes(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.matrix
    }

    /// `aᵀ M a`, the aberration-driven part of the contrast
    pub fn pastis_contrast(&self, aberration: &ArrayView1<f64>) -> PastisResult<f64> {
        if aberration.len() != self.num_modes() {
            return Err(PastisError::ModeVectorLength {
                expected: self.num_modes(),
                actual: aberration.len(),
            });
        }
        Ok(quadratic_form(aberration, &self.matrix.view())?)
    }

    /// Full contrast `aᵀ M a + c0` for an aberration in nm
    pub fn contrast(&self, aberration: &ArrayView1<f64>, floor: f64) -> PastisResult<f64> {
        Ok(self.pastis_contrast(aberration)? + floor)
    }

    /// Expected contrast `tr(Ca M) + c0` for segment covariance `Ca` (nm²)
    pub fn statistical_mean_contrast(
        &self,
        covariance: &ArrayView2<f64>,
        floor: f64,
    ) -> PastisResult<f64> {
        self.check_covariance(covariance)?;
        Ok(trace(&covariance.dot(&self.matrix).view())? + floor)
    }

    /// Variance `2 tr(M Ca M Ca)` of the contrast for segment covariance `Ca`
    pub fn contrast_variance(&self, covariance: &ArrayView2<f64>) -> PastisResult<f64> {
        self.check_covariance(covariance)?;
        let mc = self.matrix.dot(covariance);
        Ok(2.0 * trace(&mc.dot(&mc).view())?)
    }

    fn check_covariance(&self, covariance: &ArrayView2<f64>) -> PastisResult<()> {
        let n = self.num_modes();
        if covariance.dim() != (n, n) {
            return Err(PastisError::ShapeMismatch {
                what: "aberration covariance".to_string(),
                expected: vec![n, n],
                actual: vec![covariance.nrows(), covariance.ncols()],
            });
        }
        Ok(())
    }

    /// Write as JSON with shape and units metadata
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> PastisResult<()> {
        let persisted = PersistedMatrix {
            units: MATRIX_UNITS.to_string(),
            shape: [self.num_modes(), self.num_modes()],
            data: self.matrix.clone(),
        };
        crate::io::write_json(path, &persisted)
    }

    /// Read a matrix written by [`PastisMatrix::save_to_file`]
    ///
    /// Rejects files whose units tag, declared shape or symmetry do not hold.
    pub fn load_from_file(path: impl AsRef<Path>) -> PastisResult<Self> {
        let persisted: PersistedMatrix = crate::io::read_json(path)?;
        if persisted.units != MATRIX_UNITS {
            return Err(PastisError::invalid(
                "units",
                format!("expected {MATRIX_UNITS}, found {}", persisted.units),
            ));
        }
        let (rows, cols) = persisted.data.dim();
        if persisted.shape != [rows, cols] {
            return Err(PastisError::ShapeMismatch {
                what: "persisted PASTIS matrix".to_string(),
                expected: persisted.shape.to_vec(),
                actual: vec![rows, cols],
            });
        }
        Self::new(persisted.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_mode() -> PastisMatrix {
        PastisMatrix::new(array![[4e-9, 5e-9], [5e-9, 5e-9]]).unwrap()
    }

    #[test]
    fn test_rejects_asymmetric() {
        assert!(PastisMatrix::new(array![[1.0, 2.0], [2.0 + 1e-15, 1.0]]).is_err());
        assert!(PastisMatrix::new(Array2::zeros((2, 3))).is_err());
    }

    #[test]
    fn test_contrast_propagation() {
        let m = two_mode();
        let a = array![1.0, 1.0];
        // 4 + 5 + 2*5 = 19
        assert_relative_eq!(m.pastis_contrast(&a.view()).unwrap(), 19e-9);
        assert_relative_eq!(m.contrast(&a.view(), 1e-9).unwrap(), 20e-9);
        assert!(m.pastis_contrast(&array![1.0].view()).is_err());
    }

    #[test]
    fn test_statistics_for_diagonal_covariance() {
        let m = two_mode();
        let ca = array![[2.0, 0.0], [0.0, 3.0]];
        // tr(Ca M) = 2*4 + 3*5
        assert_relative_eq!(
            m.statistical_mean_contrast(&ca.view(), 1e-9).unwrap(),
            24e-9,
            max_relative = 1e-12
        );
        // 2 tr(M Ca M Ca) = 2 Σ_ij M_ij² Ca_ii Ca_jj
        let expected = 2.0 * (16.0 * 4.0 + 2.0 * 25.0 * 6.0 + 25.0 * 9.0) * 1e-18;
        assert_relative_eq!(
            m.contrast_variance(&ca.view()).unwrap(),
            expected,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.json");
        let m = two_mode();
        m.save_to_file(&path).unwrap();
        assert_eq!(PastisMatrix::load_from_file(&path).unwrap(), m);
    }

    #[test]
    fn test_load_rejects_asymmetric_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let persisted = PersistedMatrix {
            units: MATRIX_UNITS.to_string(),
            shape: [2, 2],
            data: array![[1.0, 2.0], [3.0, 4.0]],
        };
        crate::io::write_json(&path, &persisted).unwrap();
        assert!(PastisMatrix::load_from_file(&path).is_err());
    }
}
