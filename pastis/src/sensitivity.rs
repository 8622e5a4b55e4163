//! Sensitivity extraction from a forward model
//!
//! Two measurements feed matrix construction:
//!
//! - pair contrasts `C(i,j)`: dark-hole contrast with modes `i` and `j`
//!   poked together (once for `i == j`), over all non-repeating pairs;
//! - differential fields: `E_k - E0` for each mode poked alone, recorded at
//!   the science camera and at the wavefront sensor.
//!
//! Every forward evaluation is independent. Work is spread over rayon
//! workers, each holding its own clone of the model, and results are
//! written back by index so the output does not depend on scheduling.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::PastisResult;
use crate::forward_model::{ForwardModel, Reference};
use crate::jacobian::Jacobian;
use pastis_math::{mode_pairs_non_repeating, pair_measurement_count};

/// Dark-hole contrast with one or two modes poked at `amplitude`
pub fn pair_contrast<M: ForwardModel>(
    model: &M,
    norm: f64,
    pair: (usize, usize),
    amplitude: f64,
) -> PastisResult<f64> {
    let (i, j) = pair;
    let pokes = if i == j {
        vec![(i, amplitude)]
    } else {
        vec![(i, amplitude), (j, amplitude)]
    };
    let propagation = model.poke(&pokes)?;
    model.dark_hole().contrast(&propagation.science.view(), norm)
}

/// Upper-triangular matrix of pair contrasts `C(i,j)`, `i <= j`
///
/// The strict lower triangle is left at zero.
///
/// # Arguments
/// * `model` - Forward model, cloned once per worker thread
/// * `norm` - Direct PSF peak used to normalize contrast
/// * `amplitude` - Poke amplitude in model units
pub fn measure_pair_contrasts<M: ForwardModel>(
    model: &M,
    norm: f64,
    amplitude: f64,
) -> PastisResult<Array2<f64>> {
    let n = model.num_modes();
    log::info!(
        "Measuring {} pair contrasts for {n} modes at amplitude {amplitude}",
        pair_measurement_count(n)
    );

    let pairs: Vec<(usize, usize)> = mode_pairs_non_repeating(n).collect();
    let contrasts = pairs
        .par_iter()
        .map_init(
            || model.clone(),
            |local, &pair| -> PastisResult<_> {
                let c = pair_contrast(local, norm, pair, amplitude)?;
                log::debug!("Pair {pair:?}: contrast {c:.6e}");
                Ok((pair, c))
            },
        )
        .collect::<PastisResult<Vec<_>>>()?;

    let mut matrix = Array2::<f64>::zeros((n, n));
    for ((i, j), c) in contrasts {
        matrix[[i, j]] = c;
    }
    Ok(matrix)
}

/// Science-camera and wavefront-sensor Jacobians of one model
#[derive(Debug, Clone)]
pub struct PlaneJacobians {
    pub science: Jacobian,
    pub sensor: Jacobian,
}

impl PlaneJacobians {
    /// Replace the sensor Jacobian by its `factor x factor` binned version
    pub fn with_sensor_binning(self, factor: usize) -> PastisResult<Self> {
        if factor <= 1 {
            return Ok(self);
        }
        Ok(Self {
            sensor: self.sensor.downsample(factor)?,
            science: self.science,
        })
    }
}

/// Poke each mode alone and record `E_k - E0` in both planes
pub fn measure_jacobians<M: ForwardModel>(
    model: &M,
    reference: &Reference,
    amplitude: f64,
) -> PastisResult<PlaneJacobians> {
    let n = model.num_modes();
    log::info!("Measuring differential fields for {n} modes at amplitude {amplitude}");

    let fields = (0..n)
        .into_par_iter()
        .map_init(
            || model.clone(),
            |local, k| -> PastisResult<_> {
                let propagation = local.poke(&[(k, amplitude)])?;
                Ok((propagation.science, propagation.sensor))
            },
        )
        .collect::<PastisResult<Vec<_>>>()?;

    let (science_fields, sensor_fields): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
    Ok(PlaneJacobians {
        science: Jacobian::from_fields(reference.science.clone(), &science_fields, amplitude)?,
        sensor: Jacobian::from_fields(reference.sensor.clone(), &sensor_fields, amplitude)?,
    })
}
