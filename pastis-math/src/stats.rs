//! Statistical functions for dark-hole contrast evaluation

use ndarray::{ArrayView1, ArrayView2};

use crate::MathError;

/// Mean of `values` over the pixels where `mask` is true
///
/// This is the dark-hole mean used for every contrast number in the
/// workspace.
///
/// # Arguments
/// * `values` - Image (intensity, normalized or not)
/// * `mask` - Boolean mask of the same shape
///
/// # Returns
/// * `Ok(f64)` - Mean over selected pixels
/// * `Err(MathError)` - On shape mismatch or an empty mask
pub fn masked_mean(values: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Result<f64, MathError> {
    if values.dim() != mask.dim() {
        let (vr, vc) = values.dim();
        let (mr, mc) = mask.dim();
        return Err(MathError::ShapeMismatch {
            what: "masked mean".to_string(),
            expected: vec![mr, mc],
            actual: vec![vr, vc],
        });
    }

    let (sum, count) = values
        .iter()
        .zip(mask.iter())
        .filter(|(_, m)| **m)
        .fold((0.0, 0usize), |(s, c), (v, _)| (s + v, c + 1));

    if count == 0 {
        return Err(MathError::EmptyMask);
    }

    Ok(sum / count as f64)
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &ArrayView1<f64>) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.sum() / values.len() as f64)
    }
}

/// Root-mean-square about the mean: `sqrt(mean(x²) - mean(x)²)`
///
/// Returns 0.0 for an empty input.
pub fn rms(values: &ArrayView1<f64>) -> f64 {
    let Some(mu) = mean(values) else {
        return 0.0;
    };
    let mean_sq = values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64;
    (mean_sq - mu * mu).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_masked_mean_selects_pixels() {
        let image = array![[1.0, 2.0], [3.0, 10.0]];
        let mask = array![[true, false], [true, false]];
        assert_relative_eq!(masked_mean(&image.view(), &mask.view()).unwrap(), 2.0);
    }

    #[test]
    fn test_masked_mean_counts_zero_valued_pixels() {
        // A zero-intensity pixel inside the mask still counts towards the mean
        let image = array![[0.0, 4.0], [0.0, 0.0]];
        let mask = array![[true, true], [false, false]];
        assert_relative_eq!(masked_mean(&image.view(), &mask.view()).unwrap(), 2.0);
    }

    #[test]
    fn test_masked_mean_errors() {
        let image = array![[1.0, 2.0]];
        let empty = array![[false, false]];
        assert_eq!(
            masked_mean(&image.view(), &empty.view()).unwrap_err(),
            MathError::EmptyMask
        );

        let wrong = array![[true], [true]];
        assert!(matches!(
            masked_mean(&image.view(), &wrong.view()),
            Err(MathError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rms_ignores_offset() {
        let values = array![1.0, 3.0, 1.0, 3.0];
        assert_relative_eq!(rms(&values.view()), 1.0, epsilon = 1e-12);

        let shifted = values.mapv(|v| v + 100.0);
        assert_relative_eq!(rms(&shifted.view()), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mean_empty() {
        let empty = ndarray::Array1::<f64>::zeros(0);
        assert_eq!(mean(&empty.view()), None);
        assert_eq!(rms(&empty.view()), 0.0);
    }
}
