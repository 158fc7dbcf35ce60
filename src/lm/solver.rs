//! Dense solver for the damped normal equations.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

/// Solve `a x = b` for a symmetric `a`.
///
/// A Cholesky factorization is tried first; if `a` is not positive definite
/// the system is solved by LU with partial pivoting. A singular system or a
/// solution with non-finite entries is reported as
/// [`FitError::SingularMatrix`].
pub fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n {
        return Err(FitError::DimensionMismatch(format!(
            "system matrix is {}x{}, right-hand side has {} entries",
            a.nrows(),
            a.ncols(),
            n
        )));
    }
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let a_na = ndarray_to_nalgebra(a);
    let b_na = ndarray_vec_to_nalgebra(b);

    let x = match a_na.clone().cholesky() {
        Some(chol) => chol.solve(&b_na),
        None => {
            log::debug!("cholesky failed, falling back to LU");
            a_na.lu().solve(&b_na).ok_or(FitError::SingularMatrix)?
        }
    };

    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::SingularMatrix);
    }

    Ok(nalgebra_vec_to_ndarray(&x))
}
