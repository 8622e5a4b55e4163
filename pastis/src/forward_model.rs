//! Forward-model capability consumed by the PASTIS core
//!
//! A forward model maps a dense vector of mode coefficients (one per
//! segment, or per mode on a segment) to complex electric fields at the
//! science camera, at the same camera without the coronagraph (the direct
//! PSF used for normalization), and at the wavefront sensor.
//!
//! Implementations are plain values: `forward` takes `&self` and must not
//! carry state between calls. Parallel workers clone the model instead of
//! sharing one, so telescope-specific code only has to implement
//! [`ForwardModel::propagate`].

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::dark_hole::DarkHole;
use crate::error::{PastisError, PastisResult};

/// Complex fields produced by one forward evaluation
#[derive(Debug, Clone)]
pub struct Propagation {
    /// Coronagraphic field at the science camera
    pub science: Array2<Complex64>,
    /// Non-coronagraphic field at the science camera (contrast normalization)
    pub direct: Array2<Complex64>,
    /// Field at the wavefront sensor
    pub sensor: Array2<Complex64>,
}

/// Telescope/coronagraph simulator seen through a mode vector
pub trait ForwardModel: Clone + Send + Sync {
    /// Number of independently commandable modes
    fn num_modes(&self) -> usize;

    /// Dark-hole mask over the science image
    fn dark_hole(&self) -> &DarkHole;

    /// Propagate a mode vector of validated length
    ///
    /// Called only through [`ForwardModel::forward`], which checks the vector
    /// length first.
    fn propagate(&self, modes: &ArrayView1<f64>) -> PastisResult<Propagation>;

    /// Propagate a mode vector, failing fast on a length mismatch
    fn forward(&self, modes: &ArrayView1<f64>) -> PastisResult<Propagation> {
        check_mode_vector(self.num_modes(), modes)?;
        self.propagate(modes)
    }

    /// Propagate with every mode at zero
    fn flat(&self) -> PastisResult<Propagation> {
        let modes = Array1::<f64>::zeros(self.num_modes());
        self.forward(&modes.view())
    }

    /// Propagate with the listed modes set and all others at zero
    ///
    /// A mode listed twice is set once, to its last listed amplitude.
    fn poke(&self, pokes: &[(usize, f64)]) -> PastisResult<Propagation> {
        let n = self.num_modes();
        let mut modes = Array1::<f64>::zeros(n);
        for &(mode, amplitude) in pokes {
            if mode >= n {
                return Err(PastisError::invalid(
                    "mode",
                    format!("mode index {mode} out of range for {n} modes"),
                ));
            }
            modes[mode] = amplitude;
        }
        self.forward(&modes.view())
    }
}

/// Validate the length of a mode vector
pub fn check_mode_vector(expected: usize, modes: &ArrayView1<f64>) -> PastisResult<()> {
    if modes.len() != expected {
        return Err(PastisError::ModeVectorLength {
            expected,
            actual: modes.len(),
        });
    }
    Ok(())
}

/// Unaberrated reference computed once per analysis run
#[derive(Debug, Clone)]
pub struct Reference {
    /// Coronagraphic science field with all modes at zero
    pub science: Array2<Complex64>,
    /// Wavefront-sensor field with all modes at zero
    pub sensor: Array2<Complex64>,
    /// Peak of the direct (non-coronagraphic) PSF intensity
    pub norm: f64,
    /// Mean normalized dark-hole intensity with all modes at zero
    pub contrast_floor: f64,
}

impl Reference {
    /// Evaluate the flat model and derive normalization and coronagraph floor
    pub fn compute<M: ForwardModel>(model: &M) -> PastisResult<Self> {
        let flat = model.flat()?;

        let norm = flat
            .direct
            .iter()
            .map(|e| e.norm_sqr())
            .fold(0.0_f64, f64::max);
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(PastisError::invalid(
                "norm",
                format!("direct PSF peak must be positive and finite, got {norm}"),
            ));
        }

        let contrast_floor = model.dark_hole().contrast(&flat.science.view(), norm)?;
        log::debug!("Reference: norm = {norm:.6e}, coronagraph floor = {contrast_floor:.6e}");

        Ok(Self {
            science: flat.science,
            sensor: flat.sensor,
            norm,
            contrast_floor,
        })
    }

    /// Scalar part of the reference, for persistence next to a matrix
    pub fn summary(&self) -> ReferenceSummary {
        ReferenceSummary {
            norm: self.norm,
            contrast_floor: self.contrast_floor,
        }
    }
}

/// Normalization and floor of a [`Reference`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSummary {
    pub norm: f64,
    pub contrast_floor: f64,
}

impl ReferenceSummary {
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> PastisResult<()> {
        crate::io::write_json(path, self)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> PastisResult<Self> {
        crate::io::read_json(path)
    }
}
