//! Monte-Carlo checks of the PASTIS matrix
//!
//! The hockey-stick curve compares contrast predicted by the matrix with
//! contrast from the forward model for random aberrations of growing RMS;
//! the two agree until the quadratic model breaks down. Random draws from
//! segment or mode tolerances check that a budget actually meets its target.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PastisError, PastisResult};
use crate::forward_model::{ForwardModel, Reference};
use crate::matrix::{Calibration, PastisMatrix};
use crate::requirements::PastisModes;
use pastis_math::{mean, rms};

/// Uniform random segment aberration scaled to `total_rms`, piston removed
///
/// # Arguments
/// * `num_segments` - Length of the aberration vector
/// * `total_rms` - Target RMS about the mean, in nm
/// * `rng` - Random source
pub fn random_rms_aberration<R: Rng + ?Sized>(
    num_segments: usize,
    total_rms: f64,
    rng: &mut R,
) -> Array1<f64> {
    let mut aber: Array1<f64> = (0..num_segments).map(|_| rng.gen::<f64>()).collect();
    let spread = rms(&aber.view());
    if spread > 0.0 {
        aber *= total_rms / spread;
    }
    let piston = mean(&aber.view()).unwrap_or(0.0);
    aber -= piston;
    aber
}

/// Matrix and end-to-end contrasts over RMS levels and realizations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HockeyStick {
    /// RMS levels in nm
    pub rms_values: Vec<f64>,
    /// `[levels, realizations]` contrast from `aᵀ M a + c0`
    pub matrix_contrasts: Array2<f64>,
    /// `[levels, realizations]` contrast from the forward model
    pub e2e_contrasts: Array2<f64>,
}

impl HockeyStick {
    /// Mean over realizations for each RMS level, `(matrix, e2e)`
    pub fn mean_curves(&self) -> (Array1<f64>, Array1<f64>) {
        let axis = ndarray::Axis(1);
        let zeros = || Array1::zeros(self.rms_values.len());
        (
            self.matrix_contrasts.mean_axis(axis).unwrap_or_else(zeros),
            self.e2e_contrasts.mean_axis(axis).unwrap_or_else(zeros),
        )
    }

    /// Largest relative deviation of the matrix from the forward model
    pub fn max_relative_error(&self) -> f64 {
        self.matrix_contrasts
            .iter()
            .zip(self.e2e_contrasts.iter())
            .map(|(m, e)| ((m - e) / e).abs())
            .fold(0.0, f64::max)
    }
}

/// Compute a hockey-stick curve
///
/// Each RMS level draws its realizations from its own `StdRng` seeded
/// `seed + level`, so levels run in parallel and results do not depend on
/// the thread count.
pub fn hockeystick_curve<M: ForwardModel>(
    model: &M,
    matrix: &PastisMatrix,
    reference: &Reference,
    calibration: &Calibration,
    rms_values: &[f64],
    realizations: usize,
    seed: u64,
) -> PastisResult<HockeyStick> {
    let n = model.num_modes();
    if matrix.num_modes() != n {
        return Err(PastisError::ShapeMismatch {
            what: "PASTIS matrix vs forward model".to_string(),
            expected: vec![n, n],
            actual: vec![matrix.num_modes(), matrix.num_modes()],
        });
    }
    if realizations == 0 {
        return Err(PastisError::invalid("realizations", "must be at least 1"));
    }
    log::info!(
        "Hockey-stick: {} RMS levels x {realizations} realizations",
        rms_values.len()
    );

    let rows = rms_values
        .par_iter()
        .enumerate()
        .map_init(
            || model.clone(),
            |local, (level, &total_rms)| -> PastisResult<_> {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(level as u64));
                let mut matrix_row = Vec::with_capacity(realizations);
                let mut e2e_row = Vec::with_capacity(realizations);
                for _ in 0..realizations {
                    let aber_nm = random_rms_aberration(n, total_rms, &mut rng);
                    matrix_row.push(matrix.contrast(&aber_nm.view(), reference.contrast_floor)?);

                    let aber_model = aber_nm.mapv(|a| calibration.to_model_units(a));
                    let propagation = local.forward(&aber_model.view())?;
                    e2e_row.push(
                        local
                            .dark_hole()
                            .contrast(&propagation.science.view(), reference.norm)?,
                    );
                }
                log::debug!("RMS {total_rms} nm done");
                Ok((matrix_row, e2e_row))
            },
        )
        .collect::<PastisResult<Vec<_>>>()?;

    let levels = rms_values.len();
    let mut matrix_contrasts = Array2::<f64>::zeros((levels, realizations));
    let mut e2e_contrasts = Array2::<f64>::zeros((levels, realizations));
    for (level, (matrix_row, e2e_row)) in rows.into_iter().enumerate() {
        for r in 0..realizations {
            matrix_contrasts[[level, r]] = matrix_row[r];
            e2e_contrasts[[level, r]] = e2e_row[r];
        }
    }

    Ok(HockeyStick {
        rms_values: rms_values.to_vec(),
        matrix_contrasts,
        e2e_contrasts,
    })
}

fn gaussian_draw<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> PastisResult<f64> {
    if sigma == 0.0 {
        return Ok(0.0);
    }
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| PastisError::invalid("sigma", format!("{sigma}: {e}")))?;
    Ok(normal.sample(rng))
}

/// Contrasts of random segment aberrations with independent tolerances `μ`
pub fn random_segment_contrasts(
    matrix: &PastisMatrix,
    mus: &ArrayView1<f64>,
    c_floor: f64,
    draws: usize,
    seed: u64,
) -> PastisResult<Array1<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..draws)
        .map(|_| {
            let aber = mus
                .iter()
                .map(|&mu| gaussian_draw(&mut rng, mu))
                .collect::<PastisResult<Array1<f64>>>()?;
            matrix.contrast(&aber.view(), c_floor)
        })
        .collect()
}

/// Contrasts of random mode combinations with per-mode tolerances `σ`
pub fn random_mode_contrasts(
    modes: &PastisModes,
    matrix: &PastisMatrix,
    sigmas: &ArrayView1<f64>,
    c_floor: f64,
    draws: usize,
    seed: u64,
) -> PastisResult<Array1<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..draws)
        .map(|_| {
            let weights = sigmas
                .iter()
                .map(|&sigma| gaussian_draw(&mut rng, sigma))
                .collect::<PastisResult<Array1<f64>>>()?;
            let aber = modes.aberration(&weights.view())?;
            matrix.contrast(&aber.view(), c_floor)
        })
        .collect()
}
