//! Per-iteration record of a closed-loop run

use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::closed_loop::estimator::{EstimatorVariant, IterationRecord};
use crate::error::PastisResult;

/// Time series produced by [`crate::closed_loop::ClosedLoop`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedLoopHistory {
    pub variant: EstimatorVariant,
    /// Total sensor counts per unit flux, per iteration
    pub intensity_wfs_hist: Array1<f64>,
    /// Mean entry of the information matrix divided by flux
    pub cal_i_hist: Array1<f64>,
    /// Trace of the information matrix
    pub info_trace_hist: Array1<f64>,
    /// Sampled drifts, `[iterations, modes]`
    pub eps_hist: Array2<f64>,
    /// Running mean of `contrasts`
    pub averaged_hist: Array1<f64>,
    pub contrasts: Array1<f64>,
    /// Posterior covariance after the last iteration
    pub final_covariance: Array2<f64>,
}

impl ClosedLoopHistory {
    pub fn from_records(
        variant: EstimatorVariant,
        records: Vec<IterationRecord>,
        final_covariance: Array2<f64>,
    ) -> Self {
        let iterations = records.len();
        let modes = final_covariance.nrows();

        let mut eps_hist = Array2::<f64>::zeros((iterations, modes));
        let mut averaged_hist = Array1::<f64>::zeros(iterations);
        let mut running = 0.0;
        for (k, record) in records.iter().enumerate() {
            eps_hist.row_mut(k).assign(&record.eps);
            running += record.contrast;
            averaged_hist[k] = running / (k + 1) as f64;
        }

        Self {
            variant,
            intensity_wfs_hist: records.iter().map(|r| r.wfs_intensity).collect(),
            cal_i_hist: records.iter().map(|r| r.mean_information).collect(),
            info_trace_hist: records.iter().map(|r| r.information_trace).collect(),
            contrasts: records.iter().map(|r| r.contrast).collect(),
            eps_hist,
            averaged_hist,
            final_covariance,
        }
    }

    pub fn num_iterations(&self) -> usize {
        self.contrasts.len()
    }

    /// Last entry of the running mean
    pub fn final_average(&self) -> Option<f64> {
        self.averaged_hist.iter().last().copied()
    }

    /// Mean of the second half of the running average
    ///
    /// Skips the first iterations, while the loop is still converging.
    pub fn settled_average(&self) -> Option<f64> {
        let n = self.averaged_hist.len();
        self.averaged_hist.slice(ndarray::s![n / 2..]).mean()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> PastisResult<()> {
        crate::io::write_json(path, self)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> PastisResult<Self> {
        crate::io::read_json(path)
    }

    /// One row per iteration: scalars followed by the drift components
    pub fn write_csv(&self, path: impl AsRef<Path>) -> PastisResult<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        let mut header = vec![
            "iteration".to_string(),
            "contrast".to_string(),
            "averaged".to_string(),
            "intensity_wfs".to_string(),
            "cal_i".to_string(),
            "info_trace".to_string(),
        ];
        header.extend((0..self.eps_hist.ncols()).map(|k| format!("eps_{k}")));
        wtr.write_record(&header)?;

        for k in 0..self.num_iterations() {
            let mut row = vec![
                k.to_string(),
                format!("{:.10e}", self.contrasts[k]),
                format!("{:.10e}", self.averaged_hist[k]),
                format!("{:.10e}", self.intensity_wfs_hist[k]),
                format!("{:.10e}", self.cal_i_hist[k]),
                format!("{:.10e}", self.info_trace_hist[k]),
            ];
            row.extend(self.eps_hist.row(k).iter().map(|e| format!("{e:.10e}")));
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn record(contrast: f64) -> IterationRecord {
        IterationRecord {
            eps: array![contrast, -contrast],
            wfs_intensity: 1.0,
            mean_information: 2.0,
            information_trace: 3.0,
            contrast,
        }
    }

    fn history() -> ClosedLoopHistory {
        ClosedLoopHistory::from_records(
            EstimatorVariant::Batch,
            vec![record(1.0), record(3.0), record(5.0)],
            Array2::eye(2),
        )
    }

    #[test]
    fn test_running_average() {
        let h = history();
        assert_relative_eq!(h.averaged_hist[0], 1.0);
        assert_relative_eq!(h.averaged_hist[1], 2.0);
        assert_relative_eq!(h.final_average().unwrap(), 3.0);
        assert_eq!(h.eps_hist[[2, 1]], -5.0);
        // averaged = (1, 2, 3), second half starts at index 1
        assert_relative_eq!(h.settled_average().unwrap(), 2.5);
    }

    #[test]
    fn test_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        history().write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "iteration,contrast,averaged,intensity_wfs,cal_i,info_trace,eps_0,eps_1"
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let h = history();
        h.save_to_file(&path).unwrap();
        assert_eq!(ClosedLoopHistory::load_from_file(&path).unwrap(), h);
    }
}
