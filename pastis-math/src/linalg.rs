//! Dense linear algebra on ndarray matrices using nalgebra
//!
//! Arrays stay in `ndarray` throughout the workspace; the decompositions are
//! delegated to `nalgebra` by copying into a `DMatrix`. The matrices handled
//! here are small (one row/column per telescope mode), so the copy is
//! negligible next to the decomposition itself.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::MathError;

/// Relative cutoff on singular values for the pseudo-inverse (numpy's default)
pub const PINV_RCOND: f64 = 1e-15;

/// Eigenvalues above `-EIGEN_RELATIVE_TOLERANCE * max|λ|` count as non-negative
pub const EIGEN_RELATIVE_TOLERANCE: f64 = 1e-10;

/// Copy an ndarray matrix into an nalgebra `DMatrix`
pub fn to_dmatrix(a: &ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[[i, j]])
}

/// Copy an nalgebra `DMatrix` back into an ndarray matrix
pub fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn ensure_square(a: &ArrayView2<f64>) -> Result<usize, MathError> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(MathError::NotSquare { rows, cols });
    }
    Ok(rows)
}

/// Invert a square matrix
///
/// # Arguments
/// * `a` - The matrix to invert
///
/// # Returns
/// * `Ok(Array2<f64>)` - The inverse matrix
/// * `Err(MathError::SingularMatrix)` - If LU factorization hits a zero pivot
///   or the inverse is not finite
pub fn invert(a: &ArrayView2<f64>) -> Result<Array2<f64>, MathError> {
    let size = ensure_square(a)?;
    if size == 0 {
        return Ok(Array2::zeros((0, 0)));
    }

    let inverse = to_dmatrix(a)
        .try_inverse()
        .ok_or(MathError::SingularMatrix { size })?;

    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(MathError::SingularMatrix { size });
    }

    Ok(from_dmatrix(&inverse))
}

/// Moore-Penrose pseudo-inverse via SVD
///
/// Singular values below `rcond * max(singular values)` are treated as zero,
/// so a rank-deficient or all-zero input still yields a finite result.
///
/// # Arguments
/// * `a` - Matrix to pseudo-invert (any shape)
/// * `rcond` - Relative singular value cutoff, see [`PINV_RCOND`]
pub fn pinv(a: &ArrayView2<f64>, rcond: f64) -> Result<Array2<f64>, MathError> {
    let (rows, cols) = a.dim();
    if rows == 0 || cols == 0 {
        return Ok(Array2::zeros((cols, rows)));
    }

    let svd = to_dmatrix(a).svd(true, true);
    let max_sv = svd.singular_values.max();
    if !max_sv.is_finite() {
        return Err(MathError::NonFinite("pseudo-inverse input".to_string()));
    }

    let pseudo = svd
        .pseudo_inverse(rcond * max_sv)
        .map_err(|e| MathError::SvdFailed(e.to_string()))?;

    Ok(from_dmatrix(&pseudo))
}

/// Eigendecomposition of a real symmetric matrix
///
/// Eigenvalues are sorted in descending order (the order an SVD reports them
/// for a positive semi-definite matrix) and `vectors` holds the matching
/// orthonormal eigenvectors as columns. Each eigenvector is signed so that its
/// largest-magnitude component is positive, which keeps results reproducible
/// across platforms.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues, descending
    pub values: Array1<f64>,
    /// Eigenvectors as columns, `vectors.column(k)` belongs to `values[k]`
    pub vectors: Array2<f64>,
}

/// Compute the eigendecomposition of a symmetric matrix
///
/// Only the lower triangle is read by the underlying solver, so the input
/// should already be exactly symmetric.
pub fn symmetric_eigen(a: &ArrayView2<f64>) -> Result<SymmetricEigen, MathError> {
    let n = ensure_square(a)?;
    if a.iter().any(|v| !v.is_finite()) {
        return Err(MathError::NonFinite("symmetric eigendecomposition input".to_string()));
    }

    let decomposition = to_dmatrix(a).symmetric_eigen();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| {
        decomposition.eigenvalues[y]
            .partial_cmp(&decomposition.eigenvalues[x])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let values = Array1::from_iter(order.iter().map(|&k| decomposition.eigenvalues[k]));
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        let column = decomposition.eigenvectors.column(src);
        let pivot = column
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for row in 0..n {
            vectors[[row, dst]] = sign * column[row];
        }
    }

    Ok(SymmetricEigen { values, vectors })
}

/// Mirror the upper triangle (diagonal included) onto the lower triangle
///
/// Equivalent to `M + Mᵀ - diag(M)` for a matrix whose strict lower triangle
/// is zero, but implemented as a copy so the result is exactly symmetric and
/// the diagonal is never double counted. Any values already present in the
/// strict lower triangle are overwritten.
pub fn symmetrize_upper(half: &ArrayView2<f64>) -> Result<Array2<f64>, MathError> {
    let n = ensure_square(half)?;
    let mut full = half.to_owned();
    for i in 0..n {
        for j in (i + 1)..n {
            full[[j, i]] = full[[i, j]];
        }
    }
    Ok(full)
}

/// Check that `|a[i,j] - a[j,i]| <= tolerance` for every off-diagonal pair
pub fn is_symmetric(a: &ArrayView2<f64>, tolerance: f64) -> bool {
    let (rows, cols) = a.dim();
    if rows != cols {
        return false;
    }
    for i in 0..rows {
        for j in (i + 1)..cols {
            if (a[[i, j]] - a[[j, i]]).abs() > tolerance {
                return false;
            }
        }
    }
    true
}

/// Quadratic form `xᵀ M x`
pub fn quadratic_form(x: &ArrayView1<f64>, m: &ArrayView2<f64>) -> Result<f64, MathError> {
    let (rows, cols) = m.dim();
    if rows != x.len() || cols != x.len() {
        return Err(MathError::ShapeMismatch {
            what: "quadratic form".to_string(),
            expected: vec![x.len(), x.len()],
            actual: vec![rows, cols],
        });
    }
    Ok(x.dot(&m.dot(x)))
}

/// Sum of the diagonal of a square matrix
pub fn trace(m: &ArrayView2<f64>) -> Result<f64, MathError> {
    ensure_square(m)?;
    Ok(m.diag().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_inversion_roundtrip() {
        let matrix = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inverse = invert(&matrix.view()).unwrap();

        let product = matrix.dot(&inverse);
        let identity = Array2::<f64>::eye(3);
        for (p, e) in product.iter().zip(identity.iter()) {
            assert_relative_eq!(*p, *e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_matrix_is_singular() {
        let zeros = Array2::<f64>::zeros((3, 3));
        let err = invert(&zeros.view()).unwrap_err();
        assert_eq!(err, MathError::SingularMatrix { size: 3 });
    }

    #[test]
    fn test_non_square_rejected() {
        let rect = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            invert(&rect.view()).unwrap_err(),
            MathError::NotSquare { rows: 2, cols: 3 }
        );
        assert!(symmetric_eigen(&rect.view()).is_err());
        assert!(symmetrize_upper(&rect.view()).is_err());
    }

    #[test]
    fn test_pinv_matches_inverse_for_full_rank() {
        let matrix = array![[2.0, 1.0], [1.0, 3.0]];
        let inverse = invert(&matrix.view()).unwrap();
        let pseudo = pinv(&matrix.view(), PINV_RCOND).unwrap();
        for (a, b) in inverse.iter().zip(pseudo.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_pinv_of_rank_deficient_matrix() {
        // Rank one: outer product of (1, 2) with itself
        let matrix = array![[1.0, 2.0], [2.0, 4.0]];
        let pseudo = pinv(&matrix.view(), PINV_RCOND).unwrap();

        // Moore-Penrose condition A A⁺ A = A
        let reconstructed = matrix.dot(&pseudo).dot(&matrix);
        for (a, b) in reconstructed.iter().zip(matrix.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_pinv_of_zero_matrix_is_zero() {
        let zeros = Array2::<f64>::zeros((3, 3));
        let pseudo = pinv(&zeros.view(), PINV_RCOND).unwrap();
        assert!(pseudo.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_symmetric_eigen_sorted_and_orthonormal() {
        let matrix = array![[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 5.0]];
        let eig = symmetric_eigen(&matrix.view()).unwrap();

        assert_relative_eq!(eig.values[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(eig.values[1], 3.0, epsilon = 1e-12);
        assert_relative_eq!(eig.values[2], 1.0, epsilon = 1e-12);

        // M v = λ v for each column
        for k in 0..3 {
            let v = eig.vectors.column(k);
            let mv = matrix.dot(&v);
            for row in 0..3 {
                assert_relative_eq!(mv[row], eig.values[k] * v[row], epsilon = 1e-12);
            }
        }

        let gram = eig.vectors.t().dot(&eig.vectors);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(gram[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_symmetrize_upper_copies_without_doubling_diagonal() {
        let half = array![[1.0, 2.0, 3.0], [0.0, 4.0, 5.0], [0.0, 0.0, 6.0]];
        let full = symmetrize_upper(&half.view()).unwrap();

        assert_eq!(
            full,
            array![[1.0, 2.0, 3.0], [2.0, 4.0, 5.0], [3.0, 5.0, 6.0]]
        );
        assert!(is_symmetric(&full.view(), 0.0));
    }

    #[test]
    fn test_is_symmetric_detects_asymmetry() {
        let matrix = array![[1.0, 2.0], [2.5, 1.0]];
        assert!(!is_symmetric(&matrix.view(), 0.1));
        assert!(is_symmetric(&matrix.view(), 1.0));
    }

    #[test]
    fn test_quadratic_form_and_trace() {
        let m = array![[2.0, 1.0], [1.0, 3.0]];
        let x = array![1.0, 2.0];
        // 2*1 + 2*1*1*2 + 3*4 = 2 + 4 + 12
        assert_relative_eq!(quadratic_form(&x.view(), &m.view()).unwrap(), 18.0);
        assert_relative_eq!(trace(&m.view()).unwrap(), 5.0);

        let short = array![1.0];
        assert!(quadratic_form(&short.view(), &m.view()).is_err());
    }
}
