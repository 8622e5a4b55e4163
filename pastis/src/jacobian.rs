//! Per-plane sensitivity matrices (Jacobians)
//!
//! A [`Jacobian`] holds, for each mode, the differential field
//! `E_k - E0` obtained by poking that mode alone at the calibration
//! amplitude, flattened to one row per pixel. It also keeps the reference
//! field `E0` and its 2D image shape so the plane can be re-binned.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;
use pastis_math::downsample_field;
use serde::{Deserialize, Serialize};

use crate::error::{PastisError, PastisResult};

/// Sensitivity matrix `G` for one observation plane
///
/// Deserialization goes through [`Jacobian::new`], so a file whose column
/// block does not match its reference image is rejected on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JacobianData")]
pub struct Jacobian {
    /// Reference field with all modes at zero, as an image
    reference: Array2<Complex64>,
    /// Differential fields, `[num_pixels, num_modes]`, row-major pixels
    columns: Array2<Complex64>,
    /// Calibration amplitude the columns were measured at (mode units)
    amplitude: f64,
}

#[derive(Deserialize)]
pub(crate) struct JacobianData {
    reference: Array2<Complex64>,
    columns: Array2<Complex64>,
    amplitude: f64,
}

impl TryFrom<JacobianData> for Jacobian {
    type Error = PastisError;

    fn try_from(data: JacobianData) -> PastisResult<Self> {
        Self::new(data.reference, data.columns, data.amplitude)
    }
}

impl Jacobian {
    /// Wrap a reference image and a `[num_pixels, num_modes]` column block
    pub fn new(
        reference: Array2<Complex64>,
        columns: Array2<Complex64>,
        amplitude: f64,
    ) -> PastisResult<Self> {
        if columns.nrows() != reference.len() {
            return Err(PastisError::ShapeMismatch {
                what: "jacobian rows vs reference pixels".to_string(),
                expected: vec![reference.len()],
                actual: vec![columns.nrows()],
            });
        }
        if !(amplitude > 0.0 && amplitude.is_finite()) {
            return Err(PastisError::invalid(
                "amplitude",
                format!("calibration amplitude must be positive, got {amplitude}"),
            ));
        }
        Ok(Self {
            reference,
            columns,
            amplitude,
        })
    }

    /// Build from per-mode aberrated fields: column `k` is `fields[k] - reference`
    pub fn from_fields(
        reference: Array2<Complex64>,
        fields: &[Array2<Complex64>],
        amplitude: f64,
    ) -> PastisResult<Self> {
        let shape = reference.dim();
        let mut columns = Array2::<Complex64>::zeros((reference.len(), fields.len()));
        for (k, field) in fields.iter().enumerate() {
            if field.dim() != shape {
                return Err(PastisError::ShapeMismatch {
                    what: format!("field for mode {k}"),
                    expected: vec![shape.0, shape.1],
                    actual: vec![field.nrows(), field.ncols()],
                });
            }
            for (dst, (e, e0)) in columns
                .column_mut(k)
                .iter_mut()
                .zip(field.iter().zip(reference.iter()))
            {
                *dst = e - e0;
            }
        }
        Self::new(reference, columns, amplitude)
    }

    /// Rebuild from the real-valued `[num_pixels, 2, num_modes]` layout
    pub fn from_real_parts(
        reference: Array2<Complex64>,
        parts: &Array3<f64>,
        amplitude: f64,
    ) -> PastisResult<Self> {
        let (pixels, two, modes) = parts.dim();
        if two != 2 {
            return Err(PastisError::ShapeMismatch {
                what: "real/imaginary axis".to_string(),
                expected: vec![pixels, 2, modes],
                actual: vec![pixels, two, modes],
            });
        }
        let columns = Array2::from_shape_fn((pixels, modes), |(p, k)| {
            Complex64::new(parts[[p, 0, k]], parts[[p, 1, k]])
        });
        Self::new(reference, columns, amplitude)
    }

    /// Real and imaginary parts as `[num_pixels, 2, num_modes]`
    pub fn to_real_parts(&self) -> Array3<f64> {
        let (pixels, modes) = self.columns.dim();
        Array3::from_shape_fn((pixels, 2, modes), |(p, part, k)| {
            let g = self.columns[[p, k]];
            if part == 0 {
                g.re
            } else {
                g.im
            }
        })
    }

    pub fn num_pixels(&self) -> usize {
        self.columns.nrows()
    }

    pub fn num_modes(&self) -> usize {
        self.columns.ncols()
    }

    /// Image shape `(rows, cols)` of the plane
    pub fn image_shape(&self) -> (usize, usize) {
        self.reference.dim()
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn reference(&self) -> ArrayView2<'_, Complex64> {
        self.reference.view()
    }

    /// Reference field flattened in row-major pixel order
    pub fn reference_flat(&self) -> Array1<Complex64> {
        self.reference.iter().copied().collect()
    }

    /// The `[num_pixels, num_modes]` differential field block
    pub fn columns(&self) -> ArrayView2<'_, Complex64> {
        self.columns.view()
    }

    /// Differential field of one mode, reshaped to the image
    pub fn mode_image(&self, mode: usize) -> Array2<Complex64> {
        let (_, cols) = self.reference.dim();
        Array2::from_shape_fn(self.reference.dim(), |(r, c)| self.columns[[r * cols + c, mode]])
    }

    /// Linearized field `G·ε + E0`, flattened
    ///
    /// `eps` is expressed in units of the calibration amplitude, so `ε_k = 1`
    /// reproduces the calibration poke of mode `k`.
    pub fn field(&self, eps: &ArrayView1<f64>) -> PastisResult<Array1<Complex64>> {
        if eps.len() != self.num_modes() {
            return Err(PastisError::ModeVectorLength {
                expected: self.num_modes(),
                actual: eps.len(),
            });
        }
        let eps_c = eps.mapv(|v| Complex64::new(v, 0.0));
        Ok(self.columns.dot(&eps_c) + &self.reference_flat())
    }

    /// Bin the plane into `factor x factor` blocks
    ///
    /// Reference and aberrated fields are each block-summed and divided by
    /// `factor`, then differenced again, so the result is the Jacobian a
    /// coarser detector would have measured.
    pub fn downsample(&self, factor: usize) -> PastisResult<Self> {
        let reference = downsample_field(&self.reference.view(), factor)?;
        let fields = (0..self.num_modes())
            .map(|k| {
                let aberrated = self.mode_image(k) + &self.reference;
                downsample_field(&aberrated.view(), factor).map_err(PastisError::from)
            })
            .collect::<PastisResult<Vec<_>>>()?;
        Self::from_fields(reference, &fields, self.amplitude)
    }

    /// Keep only the listed modes, in the given order
    pub fn select_modes(&self, modes: &[usize]) -> PastisResult<Self> {
        if let Some(&bad) = modes.iter().find(|&&k| k >= self.num_modes()) {
            return Err(PastisError::invalid(
                "modes",
                format!("mode {bad} out of range for {} modes", self.num_modes()),
            ));
        }
        let columns = self.columns.select(Axis(1), modes);
        Self::new(self.reference.clone(), columns, self.amplitude)
    }
}
