//! Dark-hole masks and contrast evaluation
//!
//! The dark hole is the region of the science image where the coronagraph
//! suppresses starlight. Every contrast number in this crate is a mean over
//! the dark hole of an intensity normalized by the peak of the
//! non-coronagraphic (direct) PSF.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use pastis_math::masked_mean;
use serde::{Deserialize, Serialize};

use crate::error::{PastisError, PastisResult};

/// Boolean mask over the science-plane image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DarkHoleData")]
pub struct DarkHole {
    mask: Array2<bool>,
}

#[derive(Deserialize)]
pub(crate) struct DarkHoleData {
    mask: Array2<bool>,
}

impl TryFrom<DarkHoleData> for DarkHole {
    type Error = PastisError;

    fn try_from(data: DarkHoleData) -> PastisResult<Self> {
        Self::new(data.mask)
    }
}

impl DarkHole {
    /// Wrap an explicit mask, rejecting masks that select no pixels
    pub fn new(mask: Array2<bool>) -> PastisResult<Self> {
        if !mask.iter().any(|&m| m) {
            return Err(PastisError::EmptyDarkHole);
        }
        Ok(Self { mask })
    }

    /// Annular dark hole between inner and outer working angles
    ///
    /// Pixels with `iwa·sampling <= r < owa·sampling` are selected, where `r`
    /// is the distance from `(cols/2, rows/2)`.
    ///
    /// # Arguments
    /// * `shape` - Image shape `(rows, cols)`
    /// * `iwa` - Inner working angle in λ/D
    /// * `owa` - Outer working angle in λ/D
    /// * `sampling` - Pixels per λ/D
    pub fn annulus(shape: (usize, usize), iwa: f64, owa: f64, sampling: f64) -> PastisResult<Self> {
        if !(iwa >= 0.0 && owa > iwa) {
            return Err(PastisError::invalid(
                "owa",
                format!("outer working angle {owa} must exceed inner working angle {iwa}"),
            ));
        }
        if sampling <= 0.0 {
            return Err(PastisError::invalid("sampling", "must be positive"));
        }

        let (rows, cols) = shape;
        let xc = cols as f64 / 2.0;
        let yc = rows as f64 / 2.0;
        let r_in = iwa * sampling;
        let r_out = owa * sampling;

        let mask = Array2::from_shape_fn(shape, |(y, x)| {
            let r2 = (x as f64 - xc).powi(2) + (y as f64 - yc).powi(2);
            r2 < r_out * r_out && r2 >= r_in * r_in
        });

        Self::new(mask)
    }

    /// Image shape `(rows, cols)` the mask applies to
    pub fn shape(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Number of selected pixels
    pub fn num_pixels(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    /// The underlying mask
    pub fn mask(&self) -> ArrayView2<'_, bool> {
        self.mask.view()
    }

    /// Mean of an arbitrary real image over the dark hole
    pub fn mean(&self, image: &ArrayView2<f64>) -> PastisResult<f64> {
        Ok(masked_mean(image, &self.mask.view())?)
    }

    /// Contrast of a complex field: `mean_DH(|E|²) / norm`
    pub fn contrast(&self, field: &ArrayView2<Complex64>, norm: f64) -> PastisResult<f64> {
        let intensity = field.mapv(|e| e.norm_sqr());
        Ok(self.mean(&intensity.view())? / norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_annulus_excludes_centre_and_corners() {
        let dh = DarkHole::annulus((32, 32), 2.0, 6.0, 2.0).unwrap();
        let mask = dh.mask();

        assert!(!mask[[16, 16]], "centre must be inside the IWA");
        assert!(!mask[[0, 0]], "corner must be outside the OWA");
        // 6 px right of centre: r = 6 between 4 and 12
        assert!(mask[[16, 22]]);
        assert!(dh.num_pixels() > 0);
    }

    #[test]
    fn test_annulus_validation() {
        assert!(DarkHole::annulus((16, 16), 5.0, 3.0, 1.0).is_err());
        assert!(DarkHole::annulus((16, 16), 1.0, 3.0, 0.0).is_err());
        // Annulus entirely outside a tiny image selects nothing
        assert!(matches!(
            DarkHole::annulus((4, 4), 10.0, 20.0, 1.0),
            Err(PastisError::EmptyDarkHole)
        ));
    }

    #[test]
    fn test_contrast_of_field() {
        let mask = Array2::from_shape_fn((2, 2), |(r, _)| r == 0);
        let dh = DarkHole::new(mask).unwrap();
        let field = Array2::from_shape_fn((2, 2), |(r, c)| {
            if r == 0 {
                Complex64::new(c as f64 + 1.0, 0.0)
            } else {
                Complex64::new(100.0, 0.0)
            }
        });
        // Row 0 intensities: 1 and 4 -> mean 2.5, normalized by 10
        assert_relative_eq!(dh.contrast(&field.view(), 10.0).unwrap(), 0.25);
    }

    #[test]
    fn test_shape_mismatch() {
        let dh = DarkHole::new(Array2::from_elem((2, 2), true)).unwrap();
        let image = Array2::<f64>::zeros((3, 3));
        assert!(matches!(
            dh.mean(&image.view()),
            Err(PastisError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_deserialize_rejects_empty_mask() {
        let json = r#"{"mask":{"v":1,"dim":[1,2],"data":[false,false]}}"#;
        assert!(serde_json::from_str::<DarkHole>(json).is_err());
        let json = r#"{"mask":{"v":1,"dim":[1,2],"data":[false,true]}}"#;
        let dh: DarkHole = serde_json::from_str(json).unwrap();
        assert_eq!(dh.num_pixels(), 1);
    }
}
