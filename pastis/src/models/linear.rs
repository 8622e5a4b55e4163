//! Linearized forward model built from per-plane Jacobians
//!
//! `E(x) = E0 + G·(x / a)` at the science camera and the wavefront sensor,
//! with a mode-independent direct PSF for normalization. This is exact for
//! small aberrations and is what the closed-loop estimator assumes anyway,
//! so a calibration measured once on a full simulator can be replayed here
//! without the simulator.

use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::dark_hole::{DarkHole, DarkHoleData};
use crate::error::{PastisError, PastisResult};
use crate::forward_model::{ForwardModel, Propagation};
use crate::jacobian::{Jacobian, JacobianData};

/// Forward model that is linear in the mode coefficients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "LinearFieldModelData")]
pub struct LinearFieldModel {
    science: Jacobian,
    sensor: Jacobian,
    direct: Array2<Complex64>,
    dark_hole: DarkHole,
}

#[derive(Deserialize)]
struct LinearFieldModelData {
    science: JacobianData,
    sensor: JacobianData,
    direct: Array2<Complex64>,
    dark_hole: DarkHoleData,
}

impl TryFrom<LinearFieldModelData> for LinearFieldModel {
    type Error = PastisError;

    fn try_from(data: LinearFieldModelData) -> PastisResult<Self> {
        Self::new(
            data.science.try_into()?,
            data.sensor.try_into()?,
            data.direct,
            data.dark_hole.try_into()?,
        )
    }
}

impl LinearFieldModel {
    /// Assemble a model from the science and sensor Jacobians
    ///
    /// # Arguments
    /// * `science` - Coronagraphic science-plane Jacobian
    /// * `sensor` - Wavefront-sensor Jacobian, same modes and amplitude
    /// * `direct` - Non-coronagraphic PSF field used for normalization
    /// * `dark_hole` - Mask over the science image
    pub fn new(
        science: Jacobian,
        sensor: Jacobian,
        direct: Array2<Complex64>,
        dark_hole: DarkHole,
    ) -> PastisResult<Self> {
        if science.num_modes() != sensor.num_modes() {
            return Err(PastisError::ShapeMismatch {
                what: "sensor jacobian modes".to_string(),
                expected: vec![science.num_modes()],
                actual: vec![sensor.num_modes()],
            });
        }
        if science.amplitude() != sensor.amplitude() {
            return Err(PastisError::invalid(
                "sensor",
                format!(
                    "science and sensor jacobians measured at different amplitudes ({} vs {})",
                    science.amplitude(),
                    sensor.amplitude()
                ),
            ));
        }
        let (rows, cols) = science.image_shape();
        if dark_hole.shape() != (rows, cols) {
            let (dr, dc) = dark_hole.shape();
            return Err(PastisError::ShapeMismatch {
                what: "dark hole vs science image".to_string(),
                expected: vec![rows, cols],
                actual: vec![dr, dc],
            });
        }
        if direct.dim() != (rows, cols) {
            return Err(PastisError::ShapeMismatch {
                what: "direct PSF vs science image".to_string(),
                expected: vec![rows, cols],
                actual: vec![direct.nrows(), direct.ncols()],
            });
        }
        Ok(Self {
            science,
            sensor,
            direct,
            dark_hole,
        })
    }

    /// Random model for demonstrations and benchmarks
    ///
    /// The coronagraphic reference field is `floor_amplitude` times complex
    /// white noise, so `floor_amplitude = 0` gives a perfect coronagraph.
    pub fn synthetic(layout: &SyntheticLayout, seed: u64) -> PastisResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = layout.image_size;
        let dark_hole = DarkHole::annulus((n, n), layout.iwa, layout.owa, layout.sampling)?;

        let centre = n as f64 / 2.0;
        let width = layout.sampling.max(1.0);
        let direct = Array2::from_shape_fn((n, n), |(y, x)| {
            let r2 = (x as f64 - centre).powi(2) + (y as f64 - centre).powi(2);
            Complex64::new((-r2 / (2.0 * width * width)).exp(), 0.0)
        });

        let science_ref = complex_noise(&mut rng, (n, n), layout.floor_amplitude);
        let science_cols = complex_noise(&mut rng, (n * n, layout.num_modes), layout.mode_amplitude);
        let science = Jacobian::new(science_ref, science_cols, layout.amplitude)?;

        let m = layout.sensor_size;
        let sensor_ref = Array2::from_shape_fn((m, m), |_| {
            Complex64::new(1.0 + 0.1 * rng.gen::<f64>(), 0.1 * rng.gen::<f64>())
        });
        let sensor_cols = complex_noise(&mut rng, (m * m, layout.num_modes), layout.mode_amplitude);
        let sensor = Jacobian::new(sensor_ref, sensor_cols, layout.amplitude)?;

        Self::new(science, sensor, direct, dark_hole)
    }

    pub fn science_jacobian(&self) -> &Jacobian {
        &self.science
    }

    pub fn sensor_jacobian(&self) -> &Jacobian {
        &self.sensor
    }

    pub fn direct(&self) -> &Array2<Complex64> {
        &self.direct
    }

    /// Replace the sensor plane, e.g. with a binned copy
    pub fn with_sensor(mut self, sensor: Jacobian) -> PastisResult<Self> {
        if sensor.num_modes() != self.science.num_modes() {
            return Err(PastisError::ShapeMismatch {
                what: "sensor jacobian modes".to_string(),
                expected: vec![self.science.num_modes()],
                actual: vec![sensor.num_modes()],
            });
        }
        self.sensor = sensor;
        Ok(self)
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> PastisResult<()> {
        crate::io::write_json(path, self)
    }

    /// Read a model written by [`LinearFieldModel::save_to_file`]
    ///
    /// The file is parsed into plain arrays first so that an inconsistent
    /// model fails with the constructor's own error (e.g. `ShapeMismatch`)
    /// rather than a generic serialization error.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> PastisResult<Self> {
        let data: LinearFieldModelData = crate::io::read_json(path)?;
        data.try_into()
    }
}

impl ForwardModel for LinearFieldModel {
    fn num_modes(&self) -> usize {
        self.science.num_modes()
    }

    fn dark_hole(&self) -> &DarkHole {
        &self.dark_hole
    }

    fn propagate(&self, modes: &ArrayView1<f64>) -> PastisResult<Propagation> {
        let eps = modes.mapv(|x| x / self.science.amplitude());
        Ok(Propagation {
            science: to_image(self.science.field(&eps.view())?, self.science.image_shape())?,
            direct: self.direct.clone(),
            sensor: to_image(self.sensor.field(&eps.view())?, self.sensor.image_shape())?,
        })
    }
}

/// Parameters for [`LinearFieldModel::synthetic`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticLayout {
    pub num_modes: usize,
    /// Science image side length in pixels
    pub image_size: usize,
    /// Sensor image side length in pixels
    pub sensor_size: usize,
    pub iwa: f64,
    pub owa: f64,
    /// Pixels per λ/D
    pub sampling: f64,
    /// Calibration amplitude the Jacobian columns correspond to
    pub amplitude: f64,
    /// RMS of each Jacobian entry
    pub mode_amplitude: f64,
    /// RMS of the coronagraphic reference field
    pub floor_amplitude: f64,
}

impl Default for SyntheticLayout {
    fn default() -> Self {
        Self {
            num_modes: 12,
            image_size: 32,
            sensor_size: 8,
            iwa: 3.0,
            owa: 7.0,
            sampling: 2.0,
            amplitude: 1.0,
            mode_amplitude: 1e-4,
            floor_amplitude: 1e-5,
        }
    }
}

fn complex_noise<R: Rng>(rng: &mut R, shape: (usize, usize), scale: f64) -> Array2<Complex64> {
    Array2::from_shape_fn(shape, |_| {
        let re: f64 = StandardNormal.sample(&mut *rng);
        let im: f64 = StandardNormal.sample(&mut *rng);
        Complex64::new(re, im) * (scale / std::f64::consts::SQRT_2)
    })
}

fn to_image(flat: Array1<Complex64>, shape: (usize, usize)) -> PastisResult<Array2<Complex64>> {
    let len = flat.len();
    flat.into_shape(shape).map_err(|_| PastisError::ShapeMismatch {
        what: "field reshape".to_string(),
        expected: vec![shape.0, shape.1],
        actual: vec![len],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward_model::Reference;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn tiny_model() -> LinearFieldModel {
        let reference = Array2::from_elem((2, 2), Complex64::new(0.0, 0.0));
        let columns = array![
            [Complex64::new(1.0, 0.0)],
            [Complex64::new(0.0, 1.0)],
            [Complex64::new(0.0, 0.0)],
            [Complex64::new(2.0, 0.0)]
        ];
        let science = Jacobian::new(reference.clone(), columns.clone(), 0.5).unwrap();
        let sensor = Jacobian::new(reference, columns, 0.5).unwrap();
        let direct = Array2::from_elem((2, 2), Complex64::new(2.0, 0.0));
        let dh = DarkHole::new(Array2::from_elem((2, 2), true)).unwrap();
        LinearFieldModel::new(science, sensor, direct, dh).unwrap()
    }

    #[test]
    fn test_poke_at_calibration_amplitude_reproduces_column() {
        let model = tiny_model();
        let out = model.poke(&[(0, 0.5)]).unwrap();
        assert_eq!(out.science[[0, 1]], Complex64::new(0.0, 1.0));
        assert_eq!(out.science[[1, 1]], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn test_forward_is_linear_in_modes() {
        let model = tiny_model();
        let out = model.forward(&array![1.5].view()).unwrap();
        // three times the calibration poke
        assert_relative_eq!(out.science[[1, 1]].re, 6.0);
    }

    #[test]
    fn test_wrong_length_fails_fast() {
        let model = tiny_model();
        assert!(matches!(
            model.forward(&array![1.0, 2.0].view()),
            Err(PastisError::ModeVectorLength { expected: 1, actual: 2 })
        ));
        assert!(model.poke(&[(3, 1.0)]).is_err());
    }

    #[test]
    fn test_reference_normalization() {
        let model = tiny_model();
        let reference = Reference::compute(&model).unwrap();
        assert_relative_eq!(reference.norm, 4.0);
        assert_relative_eq!(reference.contrast_floor, 0.0);
    }

    #[test]
    fn test_synthetic_model_is_reproducible() {
        let layout = SyntheticLayout {
            num_modes: 3,
            ..Default::default()
        };
        let a = LinearFieldModel::synthetic(&layout, 7).unwrap();
        let b = LinearFieldModel::synthetic(&layout, 7).unwrap();
        assert_eq!(a.science_jacobian(), b.science_jacobian());
        assert_eq!(a.num_modes(), 3);
        assert_eq!(a.sensor_jacobian().image_shape(), (8, 8));

        let reference = Reference::compute(&a).unwrap();
        assert_relative_eq!(reference.norm, 1.0);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let model = tiny_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save_to_file(&path).unwrap();
        let loaded = LinearFieldModel::load_from_file(&path).unwrap();
        assert_eq!(loaded.science_jacobian(), model.science_jacobian());
        assert_eq!(loaded.dark_hole(), model.dark_hole());
    }

    fn corrupted_copy(
        model: &LinearFieldModel,
        edit: impl FnOnce(&mut serde_json::Value),
    ) -> PastisResult<LinearFieldModel> {
        let mut value = serde_json::to_value(model).unwrap();
        edit(&mut value);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, value.to_string()).unwrap();
        LinearFieldModel::load_from_file(&path)
    }

    #[test]
    fn test_load_rejects_truncated_jacobian() {
        let model = tiny_model();
        let result = corrupted_copy(&model, |v| {
            let columns = &mut v["science"]["columns"];
            columns["dim"] = serde_json::json!([3, 1]);
            columns["data"].as_array_mut().unwrap().pop();
        });
        assert!(matches!(
            result,
            Err(PastisError::ShapeMismatch { expected, actual, .. })
                if expected == vec![4] && actual == vec![3]
        ));
    }

    #[test]
    fn test_load_rejects_empty_dark_hole() {
        let model = tiny_model();
        let result = corrupted_copy(&model, |v| {
            v["dark_hole"]["mask"]["data"] = serde_json::json!([false, false, false, false]);
        });
        assert!(matches!(result, Err(PastisError::EmptyDarkHole)));
    }

    #[test]
    fn test_direct_psf_must_match_science_image() {
        let model = tiny_model();
        let result = LinearFieldModel::new(
            model.science_jacobian().clone(),
            model.sensor_jacobian().clone(),
            Array2::from_elem((3, 3), Complex64::new(1.0, 0.0)),
            model.dark_hole().clone(),
        );
        assert!(matches!(result, Err(PastisError::ShapeMismatch { .. })));
    }
}
