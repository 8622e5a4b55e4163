//! Exposure-time, drift-scale and stellar-magnitude sweeps of the closed loop

use ndarray::Array3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::closed_loop::estimator::{ClosedLoop, EstimatorVariant};
use crate::error::{PastisError, PastisResult};

/// `n` values spaced evenly in log10 between `10^start` and `10^stop`
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(start)],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|k| 10f64.powf(start + step * k as f64)).collect()
        }
    }
}

/// Photon flux of a star of magnitude `m` given the magnitude-zero flux
pub fn flux_from_magnitude(zero_point_flux: f64, magnitude: f64) -> f64 {
    zero_point_flux * 10f64.powf(-magnitude / 2.5)
}

/// Grid of exposure times, drift scales and stellar magnitudes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSweep {
    pub exposure_times: Vec<f64>,
    /// Each scale `s` runs the loop with drift covariance `s²·Q`
    pub drift_scales: Vec<f64>,
    pub magnitudes: Vec<f64>,
    pub zero_point_flux: f64,
    pub variant: EstimatorVariant,
    /// Subtracted from every cell so results show the aberration-driven part
    pub contrast_floor: f64,
}

/// Last running-average contrast above the floor for every grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub exposure_times: Vec<f64>,
    pub drift_scales: Vec<f64>,
    pub magnitudes: Vec<f64>,
    /// `[exposure_times, drift_scales, magnitudes]`
    pub contrast: Array3<f64>,
}

impl SweepResult {
    /// Cells in row-major `[time, scale, magnitude]` order, one per CSV row
    pub fn write_csv(&self, path: impl AsRef<std::path::Path>) -> PastisResult<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["exposure_time", "drift_scale", "magnitude", "contrast"])?;
        for ((t, s, m), c) in self.contrast.indexed_iter() {
            wtr.write_record(&[
                format!("{:.6e}", self.exposure_times[t]),
                format!("{:.6e}", self.drift_scales[s]),
                format!("{:.3}", self.magnitudes[m]),
                format!("{c:.10e}"),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ExposureSweep {
    pub fn num_cells(&self) -> usize {
        self.exposure_times.len() * self.drift_scales.len() * self.magnitudes.len()
    }

    pub fn run(&self, base: &ClosedLoop<'_>) -> PastisResult<SweepResult> {
        self.run_with_progress(base, || {})
    }

    /// Run every cell in parallel, calling `on_cell` as each one finishes
    ///
    /// Each cell keeps the base loop's seed, so a cell's result does not
    /// depend on which other cells are in the grid.
    pub fn run_with_progress<F>(&self, base: &ClosedLoop<'_>, on_cell: F) -> PastisResult<SweepResult>
    where
        F: Fn() + Send + Sync,
    {
        if !(self.zero_point_flux > 0.0) {
            return Err(PastisError::invalid("zero_point_flux", "must be positive"));
        }
        let shape = (
            self.exposure_times.len(),
            self.drift_scales.len(),
            self.magnitudes.len(),
        );
        let cells: Vec<(usize, usize, usize)> = (0..shape.0)
            .flat_map(|t| (0..shape.1).flat_map(move |s| (0..shape.2).map(move |m| (t, s, m))))
            .collect();
        log::info!(
            "Sweeping {} exposure times x {} drift scales x {} magnitudes",
            shape.0,
            shape.1,
            shape.2
        );

        let values = cells
            .par_iter()
            .map(|&(t, s, m)| -> PastisResult<_> {
                let flux = flux_from_magnitude(self.zero_point_flux, self.magnitudes[m]);
                let cell = base
                    .with_exposure(self.exposure_times[t], flux)?
                    .with_drift_scale(self.drift_scales[s])?;
                let history = cell.run(self.variant)?;
                on_cell();
                let value = history.final_average().unwrap_or(f64::NAN) - self.contrast_floor;
                log::debug!(
                    "t_exp {:.3e} scale {:.3e} mag {}: contrast {value:.4e}",
                    self.exposure_times[t],
                    self.drift_scales[s],
                    self.magnitudes[m]
                );
                Ok(((t, s, m), value))
            })
            .collect::<PastisResult<Vec<_>>>()?;

        let mut contrast = Array3::<f64>::zeros(shape);
        for (index, v) in values {
            contrast[index] = v;
        }
        Ok(SweepResult {
            exposure_times: self.exposure_times.clone(),
            drift_scales: self.drift_scales.clone(),
            magnitudes: self.magnitudes.clone(),
            contrast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_logspace() {
        let t = logspace(-2.0, 1.0, 4);
        assert_eq!(t.len(), 4);
        assert_relative_eq!(t[0], 0.01, max_relative = 1e-12);
        assert_relative_eq!(t[1], 0.1, max_relative = 1e-12);
        assert_relative_eq!(t[3], 10.0, max_relative = 1e-12);
        assert_eq!(logspace(0.0, 1.0, 1), vec![1.0]);
        assert!(logspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_flux_from_magnitude() {
        assert_relative_eq!(flux_from_magnitude(1e10, 0.0), 1e10);
        assert_relative_eq!(flux_from_magnitude(1e10, 5.0), 1e8, max_relative = 1e-12);
    }
}
