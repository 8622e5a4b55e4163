//! PASTIS matrix construction
//!
//! Both measurement modes produce a half-filled matrix (upper triangle and
//! diagonal), which is checked, scaled to contrast per nm² and mirrored.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dark_hole::DarkHole;
use crate::error::{PastisError, PastisResult};
use crate::forward_model::{ForwardModel, Reference};
use crate::jacobian::Jacobian;
use crate::matrix::PastisMatrix;
use crate::sensitivity::{measure_jacobians, measure_pair_contrasts, PlaneJacobians};
use pastis_math::{mode_pairs_non_repeating, pair_measurement_count, symmetrize_upper};

/// Coronagraph contrast with no aberration applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoronagraphFloor {
    /// One floor `c0` for every measurement
    Static(f64),
    /// Per-pair floor, same shape as the contrast matrix
    Drifting(Array2<f64>),
}

impl CoronagraphFloor {
    fn at(&self, i: usize, j: usize) -> f64 {
        match self {
            CoronagraphFloor::Static(c0) => *c0,
            CoronagraphFloor::Drifting(floor) => floor[[i, j]],
        }
    }

    fn check_shape(&self, n: usize) -> PastisResult<()> {
        if let CoronagraphFloor::Drifting(floor) = self {
            if floor.dim() != (n, n) {
                return Err(PastisError::ShapeMismatch {
                    what: "drifting coronagraph floor".to_string(),
                    expected: vec![n, n],
                    actual: vec![floor.nrows(), floor.ncols()],
                });
            }
        }
        Ok(())
    }
}

/// Poke amplitude and its conversion to nanometres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Amplitude applied to each poked mode, in forward-model units
    pub amplitude: f64,
    /// Nanometres per forward-model unit
    pub nm_per_unit: f64,
}

impl Calibration {
    pub fn new(amplitude: f64, nm_per_unit: f64) -> PastisResult<Self> {
        if !(amplitude > 0.0 && amplitude.is_finite()) {
            return Err(PastisError::invalid(
                "amplitude",
                format!("must be positive and finite, got {amplitude}"),
            ));
        }
        if !(nm_per_unit > 0.0 && nm_per_unit.is_finite()) {
            return Err(PastisError::invalid(
                "nm_per_unit",
                format!("must be positive and finite, got {nm_per_unit}"),
            ));
        }
        Ok(Self {
            amplitude,
            nm_per_unit,
        })
    }

    /// Calibration amplitude in nanometres
    pub fn amplitude_nm(&self) -> f64 {
        self.amplitude * self.nm_per_unit
    }

    /// Convert an aberration in nm to forward-model units
    pub fn to_model_units(&self, nm: f64) -> f64 {
        nm / self.nm_per_unit
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            nm_per_unit: 1.0,
        }
    }
}

/// Half matrix from pair contrasts, floor subtracted, not yet normalized
///
/// `contrasts[[i, j]]` for `i <= j` holds `C(i,j)`; the strict lower
/// triangle is ignored.
pub fn half_matrix_from_contrasts(
    contrasts: &ArrayView2<f64>,
    floor: &CoronagraphFloor,
) -> PastisResult<Array2<f64>> {
    let (n, cols) = contrasts.dim();
    if n != cols {
        return Err(PastisError::ShapeMismatch {
            what: "contrast matrix".to_string(),
            expected: vec![n, n],
            actual: vec![n, cols],
        });
    }
    floor.check_shape(n)?;

    let mut half = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        half[[i, i]] = contrasts[[i, i]] - floor.at(i, i);
    }
    for (i, j) in mode_pairs_non_repeating(n).filter(|(i, j)| i != j) {
        half[[i, j]] = (contrasts[[i, j]] - floor.at(i, j) - half[[i, i]] - half[[j, j]]) / 2.0;
    }
    Ok(half)
}

/// Half matrix from differential science fields, not yet normalized
///
/// `M[i,j] = mean_DH(Re(ΔE_i · conj(ΔE_j))) / norm` for `i <= j`.
pub fn half_matrix_from_fields(
    science: &Jacobian,
    dark_hole: &DarkHole,
    norm: f64,
) -> PastisResult<Array2<f64>> {
    let (rows, cols) = science.image_shape();
    if dark_hole.shape() != (rows, cols) {
        let (dr, dc) = dark_hole.shape();
        return Err(PastisError::ShapeMismatch {
            what: "dark hole vs science jacobian".to_string(),
            expected: vec![rows, cols],
            actual: vec![dr, dc],
        });
    }

    let pixels: Vec<usize> = dark_hole
        .mask()
        .iter()
        .enumerate()
        .filter_map(|(p, &m)| m.then_some(p))
        .collect();
    let n = science.num_modes();
    let g = science.columns();
    let scale = 1.0 / (pixels.len() as f64 * norm);

    let entries: Vec<((usize, usize), f64)> = mode_pairs_non_repeating(n)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(i, j)| {
            let sum: f64 = pixels
                .iter()
                .map(|&p| (g[[p, i]] * g[[p, j]].conj()).re)
                .sum();
            ((i, j), sum * scale)
        })
        .collect();

    let mut half = Array2::<f64>::zeros((n, n));
    for ((i, j), v) in entries {
        half[[i, j]] = v;
    }
    Ok(half)
}

/// Check the diagonal, scale by `1/a²` (a in nm) and mirror the upper triangle
pub fn finalize_half_matrix(
    half: &ArrayView2<f64>,
    calibration: &Calibration,
) -> PastisResult<PastisMatrix> {
    if let Some((mode, &value)) = half.diag().iter().enumerate().find(|(_, v)| **v < 0.0) {
        return Err(PastisError::CalibrationTooSmall { mode, value });
    }
    let a2 = calibration.amplitude_nm().powi(2);
    let scaled = half.mapv(|v| v / a2);
    PastisMatrix::new(symmetrize_upper(&scaled.view())?)
}

/// Which measurement the builder performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MatrixMode {
    /// `(n²+n)/2` pair contrast evaluations
    Intensity,
    /// `n` per-mode field evaluations
    Field,
}

/// Everything produced while building a matrix from a forward model
#[derive(Debug, Clone)]
pub struct MatrixBuild {
    pub matrix: PastisMatrix,
    pub reference: Reference,
    /// Forward-model evaluations, including the reference
    pub forward_evaluations: usize,
    /// Raw pair contrasts (intensity mode only)
    pub contrasts: Option<Array2<f64>>,
    /// Science and sensor Jacobians (field mode only)
    pub jacobians: Option<PlaneJacobians>,
}

/// Builds a [`PastisMatrix`] from any [`ForwardModel`]
pub struct PastisMatrixBuilder<'a, M: ForwardModel> {
    model: &'a M,
    calibration: Calibration,
    mode: MatrixMode,
    floor: Option<CoronagraphFloor>,
}

impl<'a, M: ForwardModel> PastisMatrixBuilder<'a, M> {
    pub fn new(model: &'a M, calibration: Calibration) -> Self {
        Self {
            model,
            calibration,
            mode: MatrixMode::Intensity,
            floor: None,
        }
    }

    pub fn mode(mut self, mode: MatrixMode) -> Self {
        self.mode = mode;
        self
    }

    /// Override the floor measured from the flat model (intensity mode)
    pub fn floor(mut self, floor: CoronagraphFloor) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn build(self) -> PastisResult<MatrixBuild> {
        let reference = Reference::compute(self.model)?;
        let n = self.model.num_modes();
        let amplitude = self.calibration.amplitude;
        log::info!(
            "Building {n}x{n} PASTIS matrix in {:?} mode (a = {} nm)",
            self.mode,
            self.calibration.amplitude_nm()
        );

        let build = match self.mode {
            MatrixMode::Intensity => {
                let contrasts = measure_pair_contrasts(self.model, reference.norm, amplitude)?;
                let floor = self
                    .floor
                    .unwrap_or(CoronagraphFloor::Static(reference.contrast_floor));
                let half = half_matrix_from_contrasts(&contrasts.view(), &floor)?;
                MatrixBuild {
                    matrix: finalize_half_matrix(&half.view(), &self.calibration)?,
                    forward_evaluations: pair_measurement_count(n) + 1,
                    contrasts: Some(contrasts),
                    jacobians: None,
                    reference,
                }
            }
            MatrixMode::Field => {
                let jacobians = measure_jacobians(self.model, &reference, amplitude)?;
                let half = half_matrix_from_fields(
                    &jacobians.science,
                    self.model.dark_hole(),
                    reference.norm,
                )?;
                MatrixBuild {
                    matrix: finalize_half_matrix(&half.view(), &self.calibration)?,
                    forward_evaluations: n + 1,
                    contrasts: None,
                    jacobians: Some(jacobians),
                    reference,
                }
            }
        };

        log::info!(
            "PASTIS matrix done after {} forward evaluations",
            build.forward_evaluations
        );
        Ok(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_two_mode_round_trip() {
        let contrasts = array![[5e-9, 20e-9], [0.0, 6e-9]];
        let half =
            half_matrix_from_contrasts(&contrasts.view(), &CoronagraphFloor::Static(1e-9)).unwrap();
        let m = finalize_half_matrix(&half.view(), &Calibration::default()).unwrap();
        let m = m.view();

        assert_relative_eq!(m[[0, 0]], 4e-9, max_relative = 1e-12);
        assert_relative_eq!(m[[1, 1]], 5e-9, max_relative = 1e-12);
        assert_relative_eq!(m[[0, 1]], 5e-9, max_relative = 1e-12);
        assert_eq!(m[[0, 1]], m[[1, 0]]);
    }

    #[test]
    fn test_drifting_floor() {
        let contrasts = array![[5e-9, 20e-9], [0.0, 6e-9]];
        let floor = array![[1e-9, 2e-9], [0.0, 1e-9]];
        let half =
            half_matrix_from_contrasts(&contrasts.view(), &CoronagraphFloor::Drifting(floor))
                .unwrap();
        // (20 - 2 - 4 - 5) / 2
        assert_relative_eq!(half[[0, 1]], 4.5e-9, max_relative = 1e-12);

        let wrong = CoronagraphFloor::Drifting(Array2::zeros((3, 3)));
        assert!(matches!(
            half_matrix_from_contrasts(&contrasts.view(), &wrong),
            Err(PastisError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_normalization_by_amplitude_in_nm() {
        let half = array![[8.0, 2.0], [0.0, 4.0]];
        let calibration = Calibration::new(2.0, 1.0).unwrap();
        let m = finalize_half_matrix(&half.view(), &calibration).unwrap();
        assert_relative_eq!(m.view()[[0, 0]], 2.0);
        assert_relative_eq!(m.view()[[1, 0]], 0.5);
    }

    #[test]
    fn test_negative_diagonal_is_calibration_error() {
        let contrasts = array![[5e-9, 0.0], [0.0, 0.5e-9]];
        let half =
            half_matrix_from_contrasts(&contrasts.view(), &CoronagraphFloor::Static(1e-9)).unwrap();
        let err = finalize_half_matrix(&half.view(), &Calibration::default()).unwrap_err();
        match err {
            PastisError::CalibrationTooSmall { mode, value } => {
                assert_eq!(mode, 1);
                assert_relative_eq!(value, -0.5e-9, max_relative = 1e-12);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_calibration_validation() {
        assert!(Calibration::new(0.0, 1.0).is_err());
        assert!(Calibration::new(1.0, -1.0).is_err());
        let c = Calibration::new(0.5, 1e3).unwrap();
        assert_relative_eq!(c.amplitude_nm(), 500.0);
        assert_relative_eq!(c.to_model_units(250.0), 0.25);
    }
}
