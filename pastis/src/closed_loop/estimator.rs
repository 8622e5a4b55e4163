//! Closed-loop wavefront estimation with a linearized sensor model
//!
//! Each iteration the wavefront drifts by `ε ~ N(0, P + Q·t)`, the sensor
//! records `|Gsensor·ε + E0sensor|²` with photon and detector noise, and the
//! Fisher information of that measurement shrinks the posterior covariance
//! `P`. The science camera contrast left over after correction is sampled at
//! the same `ε`.
//!
//! Two update rules are provided:
//!
//! - recursive: `P ← inv(inv(P + Q·t/2) + I)`, a Kalman-style update that
//!   carries knowledge from one iteration to the next;
//! - batch: `P ← pinv(I)`, each covariance estimated from one exposure.

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::closed_loop::history::ClosedLoopHistory;
use crate::dark_hole::DarkHole;
use crate::error::{PastisError, PastisResult};
use crate::jacobian::Jacobian;
use pastis_math::{invert, pinv, trace, CorrelatedNormal, PINV_RCOND};

/// Covariance update rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorVariant {
    Recursive,
    Batch,
}

/// Detector noise in counts, one value for the whole plane or one per pixel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectorNoise {
    Uniform(f64),
    PerPixel(Array1<f64>),
}

impl DetectorNoise {
    fn at(&self, pixel: usize) -> f64 {
        match self {
            DetectorNoise::Uniform(d) => *d,
            DetectorNoise::PerPixel(d) => d[pixel],
        }
    }

    fn validate(&self, pixels: usize, what: &str) -> PastisResult<()> {
        match self {
            DetectorNoise::Uniform(d) if *d < 0.0 || !d.is_finite() => Err(PastisError::invalid(
                "detector_noise",
                format!("{what} noise must be finite and non-negative, got {d}"),
            )),
            DetectorNoise::PerPixel(d) if d.len() != pixels => Err(PastisError::ShapeMismatch {
                what: format!("{what} detector noise"),
                expected: vec![pixels],
                actual: vec![d.len()],
            }),
            DetectorNoise::PerPixel(d) if d.iter().any(|v| *v < 0.0 || !v.is_finite()) => Err(
                PastisError::invalid("detector_noise", format!("{what} noise has negative entries")),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for DetectorNoise {
    fn default() -> Self {
        DetectorNoise::Uniform(0.0)
    }
}

/// Scalar inputs of one estimator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedLoopParams {
    /// Exposure time per iteration in seconds
    pub exposure_time: f64,
    /// Photon flux in counts per second per unit normalized intensity
    pub flux: f64,
    pub iterations: usize,
    pub seed: u64,
    pub science_noise: DetectorNoise,
    pub sensor_noise: DetectorNoise,
}

/// Posterior covariance of the wavefront estimate
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorState {
    pub covariance: Array2<f64>,
}

impl EstimatorState {
    /// Uninformed start, `P = 0`
    pub fn initial(num_modes: usize) -> Self {
        Self {
            covariance: Array2::zeros((num_modes, num_modes)),
        }
    }
}

/// What one iteration observed
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub eps: Array1<f64>,
    /// `Σ_p(|Ŝ_p|²·flux·t + D_p) / flux`
    pub wfs_intensity: f64,
    /// Mean entry of the information matrix divided by flux
    pub mean_information: f64,
    pub information_trace: f64,
    pub contrast: f64,
}

/// Fisher information and photon count of one sensor exposure
#[derive(Debug, Clone)]
pub struct SensorResponse {
    pub information: Array2<f64>,
    pub wfs_intensity: f64,
}

/// Linearized closed loop around one operating point
#[derive(Debug, Clone)]
pub struct ClosedLoop<'a> {
    science: &'a Jacobian,
    sensor: &'a Jacobian,
    dark_hole: &'a DarkHole,
    dark_hole_pixels: Vec<usize>,
    norm: f64,
    process_noise: Array2<f64>,
    params: ClosedLoopParams,
}

impl<'a> ClosedLoop<'a> {
    /// Validate and bind the constant inputs of a run
    ///
    /// # Arguments
    /// * `science` - Coronagraphic Jacobian `Gcoro` with reference `E0coro`
    /// * `sensor` - Wavefront-sensor Jacobian `Gsensor` with reference `E0sensor`
    /// * `dark_hole` - Mask over the science image
    /// * `norm` - Direct PSF peak
    /// * `process_noise` - Drift covariance per second `Q`
    /// * `params` - Exposure, flux, noise, iteration count and seed
    pub fn new(
        science: &'a Jacobian,
        sensor: &'a Jacobian,
        dark_hole: &'a DarkHole,
        norm: f64,
        process_noise: Array2<f64>,
        params: ClosedLoopParams,
    ) -> PastisResult<Self> {
        let n = science.num_modes();
        if sensor.num_modes() != n {
            return Err(PastisError::ShapeMismatch {
                what: "sensor jacobian modes".to_string(),
                expected: vec![n],
                actual: vec![sensor.num_modes()],
            });
        }
        if process_noise.dim() != (n, n) {
            return Err(PastisError::ShapeMismatch {
                what: "process noise covariance".to_string(),
                expected: vec![n, n],
                actual: vec![process_noise.nrows(), process_noise.ncols()],
            });
        }
        let (rows, cols) = science.image_shape();
        if dark_hole.shape() != (rows, cols) {
            let (dr, dc) = dark_hole.shape();
            return Err(PastisError::ShapeMismatch {
                what: "dark hole vs science jacobian".to_string(),
                expected: vec![rows, cols],
                actual: vec![dr, dc],
            });
        }
        if !(norm > 0.0 && norm.is_finite()) {
            return Err(PastisError::invalid("norm", format!("must be positive, got {norm}")));
        }
        check_exposure(params.exposure_time, params.flux)?;
        if params.iterations == 0 {
            return Err(PastisError::invalid("iterations", "must be at least 1"));
        }
        params.science_noise.validate(science.num_pixels(), "science")?;
        params.sensor_noise.validate(sensor.num_pixels(), "sensor")?;

        let dark_hole_pixels = dark_hole
            .mask()
            .iter()
            .enumerate()
            .filter_map(|(p, &m)| m.then_some(p))
            .collect();

        Ok(Self {
            science,
            sensor,
            dark_hole,
            dark_hole_pixels,
            norm,
            process_noise,
            params,
        })
    }

    /// Same loop at another exposure time and flux
    pub fn with_exposure(&self, exposure_time: f64, flux: f64) -> PastisResult<Self> {
        check_exposure(exposure_time, flux)?;
        let mut other = self.clone();
        other.params.exposure_time = exposure_time;
        other.params.flux = flux;
        Ok(other)
    }

    /// Same loop with the drift covariance scaled to `scale² · Q`
    pub fn with_drift_scale(&self, scale: f64) -> PastisResult<Self> {
        if !scale.is_finite() {
            return Err(PastisError::invalid("drift_scale", format!("must be finite, got {scale}")));
        }
        let mut other = self.clone();
        other.process_noise = &self.process_noise * (scale * scale);
        Ok(other)
    }

    pub fn num_modes(&self) -> usize {
        self.science.num_modes()
    }

    pub fn params(&self) -> &ClosedLoopParams {
        &self.params
    }

    pub fn dark_hole(&self) -> &DarkHole {
        self.dark_hole
    }

    fn photons(&self) -> f64 {
        self.params.flux * self.params.exposure_time
    }

    /// Drift covariance `P + Q·t` seen by the next exposure
    pub fn drift_covariance(&self, state: &EstimatorState) -> Array2<f64> {
        &state.covariance + &(&self.process_noise * self.params.exposure_time)
    }

    /// Draw `ε ~ N(0, P + Q·t)`
    pub fn sample_drift<R: Rng + ?Sized>(
        &self,
        state: &EstimatorState,
        rng: &mut R,
    ) -> PastisResult<Array1<f64>> {
        let sampler = CorrelatedNormal::new(&self.drift_covariance(state).view())?;
        Ok(sampler.sample(rng))
    }

    /// Fisher information `I = 4·flux·t·HᵀH` of a sensor exposure at `ε`
    ///
    /// Pixels with neither signal nor detector noise carry no information
    /// and contribute a zero row to `H`.
    pub fn sensor_response(&self, eps: &ArrayView1<f64>) -> PastisResult<SensorResponse> {
        let field = self.sensor.field(eps)?;
        let g = self.sensor.columns();
        let photons = self.photons();
        let (pixels, modes) = g.dim();

        let mut h = Array2::<f64>::zeros((pixels, modes));
        let mut wfs_intensity = 0.0;
        for (p, s) in field.iter().enumerate() {
            let intensity = s.norm_sqr();
            let noise = self.params.sensor_noise.at(p);
            wfs_intensity += intensity * photons + noise;

            let denominator = (intensity + noise / photons).sqrt();
            if denominator == 0.0 {
                continue;
            }
            for k in 0..modes {
                h[[p, k]] = (s.conj() * g[[p, k]]).re / denominator;
            }
        }

        let information = h.t().dot(&h) * (4.0 * photons);
        Ok(SensorResponse {
            information,
            wfs_intensity: wfs_intensity / self.params.flux,
        })
    }

    /// Normalized dark-hole contrast of one science exposure at `ε`
    pub fn contrast_sample(&self, eps: &ArrayView1<f64>) -> PastisResult<f64> {
        let field = self.science.field(eps)?;
        let photons = self.photons();
        let total: f64 = self
            .dark_hole_pixels
            .iter()
            .map(|&p| field[p].norm_sqr() * photons + self.params.science_noise.at(p))
            .sum();
        let mean = total / self.dark_hole_pixels.len() as f64;
        Ok(mean / (photons * self.norm))
    }

    /// One estimator iteration at a given drift, without sampling
    pub fn step(
        &self,
        state: &EstimatorState,
        eps: &ArrayView1<f64>,
        variant: EstimatorVariant,
    ) -> PastisResult<(EstimatorState, IterationRecord)> {
        let response = self.sensor_response(eps)?;
        let information = &response.information;

        let covariance = match variant {
            EstimatorVariant::Recursive => {
                let half_step = &state.covariance
                    + &(&self.process_noise * (self.params.exposure_time / 2.0));
                let prior_information = invert(&half_step.view())
                    .map_err(PastisError::singular_in("recursive prior inversion"))?;
                invert(&(prior_information + information).view())
                    .map_err(PastisError::singular_in("recursive covariance update"))?
            }
            EstimatorVariant::Batch => {
                let p = pinv(&information.view(), PINV_RCOND)?;
                // SVD round-off leaves the pseudo-inverse slightly asymmetric
                (&p + &p.t()) * 0.5
            }
        };

        let record = IterationRecord {
            eps: eps.to_owned(),
            wfs_intensity: response.wfs_intensity,
            mean_information: information.mean().unwrap_or(0.0) / self.params.flux,
            information_trace: trace(&information.view())?,
            contrast: self.contrast_sample(eps)?,
        };
        Ok((EstimatorState { covariance }, record))
    }

    pub fn run(&self, variant: EstimatorVariant) -> PastisResult<ClosedLoopHistory> {
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut state = EstimatorState::initial(self.num_modes());
        let mut records = Vec::with_capacity(self.params.iterations);

        for iteration in 0..self.params.iterations {
            let eps = self.sample_drift(&state, &mut rng)?;
            let (next, record) = self.step(&state, &eps.view(), variant)?;
            log::debug!(
                "{variant:?} iteration {iteration}: contrast {:.4e}, tr(P) {:.4e}",
                record.contrast,
                next.covariance.diag().sum()
            );
            state = next;
            records.push(record);
        }

        Ok(ClosedLoopHistory::from_records(variant, records, state.covariance))
    }

    /// Recursive estimator, one `StdRng` seeded with `seed` for the whole run
    pub fn run_recursive(&self) -> PastisResult<ClosedLoopHistory> {
        self.run(EstimatorVariant::Recursive)
    }

    /// Batch estimator
    ///
    /// Each covariance is `pinv(I)` of the latest exposure alone, but the
    /// next drift is still drawn from `N(0, P + Q·t)` with that `P`, so the
    /// run is sequential like the recursive one and shares its RNG scheme.
    pub fn run_batch(&self) -> PastisResult<ClosedLoopHistory> {
        self.run(EstimatorVariant::Batch)
    }
}

fn check_exposure(exposure_time: f64, flux: f64) -> PastisResult<()> {
    if !(exposure_time > 0.0 && exposure_time.is_finite()) {
        return Err(PastisError::invalid(
            "exposure_time",
            format!("must be positive, got {exposure_time}"),
        ));
    }
    if !(flux > 0.0 && flux.is_finite()) {
        return Err(PastisError::invalid("flux", format!("must be positive, got {flux}")));
    }
    Ok(())
}
