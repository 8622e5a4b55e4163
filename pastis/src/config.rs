//! Analysis configuration
//!
//! One JSON file drives every command-line tool. Sections that a tool does
//! not use are ignored, and every field has a default so a partial file is
//! enough.

use std::path::Path;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::closed_loop::{logspace, ClosedLoopParams, DetectorNoise, EstimatorVariant, ExposureSweep};
use crate::error::{PastisError, PastisResult};
use crate::matrix::{Calibration, MatrixMode};

/// Matrix construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Poke amplitude in forward-model units
    pub amplitude: f64,
    /// Nanometres per forward-model unit
    pub nm_per_unit: f64,
    pub mode: MatrixMode,
    /// Block size for binning the sensor plane, 1 to keep full resolution
    pub sensor_binning: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            amplitude: 1.0,
            nm_per_unit: 1.0,
            mode: MatrixMode::Field,
            sensor_binning: 1,
        }
    }
}

impl CalibrationConfig {
    pub fn calibration(&self) -> PastisResult<Calibration> {
        Calibration::new(self.amplitude, self.nm_per_unit)
    }
}

/// Error-budget and Monte-Carlo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Target mean dark-hole contrast
    pub c_target: f64,
    /// Overrides the coronagraph floor measured from the flat model
    pub coronagraph_floor: Option<f64>,
    /// Dynamic contrast allocation for per-mode drift tolerances
    pub c_dynamic: Option<f64>,
    /// Random draws when checking tolerances against the target
    pub monte_carlo_draws: usize,
    /// RMS levels in nm for the hockey-stick curve
    pub hockeystick_rms: Vec<f64>,
    pub hockeystick_realizations: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            c_target: 1e-10,
            coronagraph_floor: None,
            c_dynamic: None,
            monte_carlo_draws: 1000,
            hockeystick_rms: logspace(-1.0, 3.0, 9),
            hockeystick_realizations: 3,
        }
    }
}

/// Closed-loop estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosedLoopConfig {
    pub exposure_time: f64,
    pub flux: f64,
    pub iterations: usize,
    pub seed: u64,
    pub variant: EstimatorVariant,
    pub science_noise: DetectorNoise,
    pub sensor_noise: DetectorNoise,
    /// `Q = scale² · diag(μ²)` with segment tolerances, or `scale² · I` without
    pub drift_scale: f64,
}

impl Default for ClosedLoopConfig {
    fn default() -> Self {
        Self {
            exposure_time: 1.0,
            flux: 1e9,
            iterations: 10,
            seed: 42,
            variant: EstimatorVariant::Recursive,
            science_noise: DetectorNoise::Uniform(0.0),
            sensor_noise: DetectorNoise::Uniform(0.0),
            drift_scale: 1.0,
        }
    }
}

impl ClosedLoopConfig {
    pub fn params(&self) -> ClosedLoopParams {
        ClosedLoopParams {
            exposure_time: self.exposure_time,
            flux: self.flux,
            iterations: self.iterations,
            seed: self.seed,
            science_noise: self.science_noise.clone(),
            sensor_noise: self.sensor_noise.clone(),
        }
    }

    /// Drift covariance per second for `num_modes` modes
    ///
    /// # Arguments
    /// * `num_modes` - Size of the covariance
    /// * `tolerances` - Per-mode standard deviations; identity when `None`
    pub fn process_noise(
        &self,
        num_modes: usize,
        tolerances: Option<&ArrayView1<f64>>,
    ) -> PastisResult<Array2<f64>> {
        let scale2 = self.drift_scale * self.drift_scale;
        match tolerances {
            None => Ok(Array2::eye(num_modes) * scale2),
            Some(t) if t.len() != num_modes => Err(PastisError::ShapeMismatch {
                what: "drift tolerances".to_string(),
                expected: vec![num_modes],
                actual: vec![t.len()],
            }),
            Some(t) if t.iter().any(|v| !v.is_finite()) => Err(PastisError::invalid(
                "tolerances",
                "drift tolerances must be finite",
            )),
            Some(t) => Ok(Array2::from_diag(&t.mapv(|mu| mu * mu * scale2))),
        }
    }
}

/// Exposure sweep grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// log10 of the shortest exposure time
    pub log_time_min: f64,
    /// log10 of the longest exposure time
    pub log_time_max: f64,
    pub num_times: usize,
    pub log_scale_min: f64,
    pub log_scale_max: f64,
    pub num_scales: usize,
    pub magnitudes: Vec<f64>,
    /// Flux of a magnitude-zero star
    pub zero_point_flux: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            log_time_min: -2.0,
            log_time_max: 3.5,
            num_times: 20,
            log_scale_min: 0.0,
            log_scale_max: 0.0,
            num_scales: 1,
            magnitudes: (0..10).map(f64::from).collect(),
            zero_point_flux: 1e9,
        }
    }
}

impl SweepConfig {
    pub fn sweep(&self, variant: EstimatorVariant, contrast_floor: f64) -> ExposureSweep {
        ExposureSweep {
            exposure_times: logspace(self.log_time_min, self.log_time_max, self.num_times),
            drift_scales: logspace(self.log_scale_min, self.log_scale_max, self.num_scales),
            magnitudes: self.magnitudes.clone(),
            zero_point_flux: self.zero_point_flux,
            variant,
            contrast_floor,
        }
    }
}

/// Complete configuration for the PASTIS tools
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PastisConfig {
    pub calibration: CalibrationConfig,
    pub budget: BudgetConfig,
    pub closed_loop: ClosedLoopConfig,
    pub sweep: SweepConfig,
}

impl PastisConfig {
    pub fn save_to_file(&self, path: &Path) -> PastisResult<()> {
        crate::io::write_json(path, self)
    }

    pub fn load_from_file(path: &Path) -> PastisResult<Self> {
        let config: Self = crate::io::read_json(path)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
