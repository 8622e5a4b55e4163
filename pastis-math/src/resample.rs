//! Block-sum downsampling for 2D fields
//!
//! Used to bin a wavefront-sensor plane down to a coarser pixel grid before
//! building its Jacobian, which shrinks the information-matrix computation
//! by `factor²`.

use std::ops::AddAssign;

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::MathError;

/// Sum an array over non-overlapping `factor x factor` blocks
///
/// # Arguments
/// * `values` - Input array; both sides must be divisible by `factor`
/// * `factor` - Block side length in pixels
///
/// # Returns
/// Array of shape `(rows / factor, cols / factor)`
pub fn block_sum<T>(values: &ArrayView2<T>, factor: usize) -> Result<Array2<T>, MathError>
where
    T: Copy + Default + AddAssign,
{
    let (rows, cols) = values.dim();
    if factor == 0 || rows % factor != 0 || cols % factor != 0 {
        return Err(MathError::IndivisibleShape { rows, cols, factor });
    }

    let mut binned = Array2::<T>::default((rows / factor, cols / factor));
    for ((r, c), v) in values.indexed_iter() {
        binned[[r / factor, c / factor]] += *v;
    }
    Ok(binned)
}

/// Downsample a complex field: block sum divided by `factor`
///
/// Dividing by the linear factor (not its square) keeps the binned
/// intensity equal to the summed intensity of a coherent block.
pub fn downsample_field(
    field: &ArrayView2<Complex64>,
    factor: usize,
) -> Result<Array2<Complex64>, MathError> {
    let binned = block_sum(field, factor)?;
    Ok(binned.mapv(|v| v / factor as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_block_sum_2x2() {
        let values = array![
            [1.0, 2.0, 3.0, 4.0],
            [5.0, 6.0, 7.0, 8.0],
            [9.0, 10.0, 11.0, 12.0],
            [13.0, 14.0, 15.0, 16.0]
        ];
        let binned = block_sum(&values.view(), 2).unwrap();
        assert_eq!(binned, array![[14.0, 22.0], [46.0, 54.0]]);
    }

    #[test]
    fn test_block_sum_factor_one_is_identity() {
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(block_sum(&values.view(), 1).unwrap(), values);
    }

    #[test]
    fn test_indivisible_shape_rejected() {
        let values = Array2::<f64>::zeros((5, 4));
        assert_eq!(
            block_sum(&values.view(), 2).unwrap_err(),
            MathError::IndivisibleShape {
                rows: 5,
                cols: 4,
                factor: 2
            }
        );
        assert!(block_sum(&values.view(), 0).is_err());
    }

    #[test]
    fn test_downsample_complex_field() {
        let field = Array2::from_elem((4, 4), Complex64::new(1.0, -0.5));
        let binned = downsample_field(&field.view(), 2).unwrap();
        assert_eq!(binned.dim(), (2, 2));
        for v in binned.iter() {
            assert_relative_eq!(v.re, 2.0);
            assert_relative_eq!(v.im, -1.0);
        }
    }
}
