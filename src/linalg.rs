//! Dense linear algebra on `ndarray` matrices, backed by `nalgebra`.
//!
//! Only small systems live here: everything is at most M×M for M thermodynamic states. Matrices are
//! copied into column-major `DMatrix` storage, factorised, and copied back.

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Copy an `ndarray` matrix into a `nalgebra::DMatrix`
pub(crate) fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a `nalgebra::DMatrix` into an `ndarray` matrix
pub(crate) fn from_dmatrix(a: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.nrows(), a.ncols()), |(i, j)| a[(i, j)])
}

/// Solve `A X = B` by LU decomposition with partial pivoting
///
/// Returns `None` if `A` is singular or the solution is not finite.
pub(crate) fn solve(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Option<Array2<f64>> {
    debug_assert_eq!(a.nrows(), a.ncols());
    debug_assert_eq!(a.nrows(), b.nrows());
    if a.nrows() == 0 {
        return Some(Array2::zeros((0, b.ncols())));
    }
    let x = to_dmatrix(a).lu().solve(&to_dmatrix(b))?;
    if x.iter().all(|v| v.is_finite()) {
        Some(from_dmatrix(&x))
    } else {
        None
    }
}

/// Eigendecomposition of a symmetric matrix
///
/// Eigenvalues are returned in ascending order; column `i` of the second matrix is the unit
/// eigenvector belonging to eigenvalue `i`.
pub(crate) fn symmetric_eigen(a: ArrayView2<'_, f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    if n == 0 {
        return (Array1::zeros(0), Array2::zeros((0, 0)));
    }
    let SymmetricEigen {
        eigenvalues,
        eigenvectors,
    } = SymmetricEigen::new(to_dmatrix(a));

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| eigenvalues[i].total_cmp(&eigenvalues[j]));

    let values = order.iter().map(|&i| eigenvalues[i]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(row, col)| eigenvectors[(row, order[col])]);
    (values, vectors)
}

/// Euclidean norm of a vector
pub(crate) fn norm(x: ArrayView1<'_, f64>) -> f64 {
    x.dot(&x).sqrt()
}
