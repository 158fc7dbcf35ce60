//! Parallel processing utilities for computationally intensive operations.
//!
//! The Jacobian columns are independent of each other, so for evaluators that
//! declare themselves reentrant they can be computed with Rayon.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::Result;
use crate::parameters::{ParamMap, ParameterSet};
use crate::problem::Problem;
use crate::utils::finite_difference::{central_column, JacobianSteps};

/// Compute the central-difference Jacobian with one Rayon task per column.
///
/// Produces the same matrix as
/// [`central_jacobian`](crate::utils::finite_difference::central_jacobian);
/// only the evaluation order differs.
pub fn central_jacobian_parallel<P: Problem + Sync + ?Sized>(
    problem: &P,
    set: &ParameterSet,
    base: &ParamMap,
    fit_indices: &[usize],
    base_len: usize,
    steps: &JacobianSteps,
) -> Result<Array2<f64>> {
    let columns: Result<Vec<_>> = fit_indices
        .par_iter()
        .map(|&index| central_column(problem, set, base, index, base_len, steps))
        .collect();
    let columns = columns?;

    let mut jac = Array2::zeros((base_len, fit_indices.len()));
    for (col, column) in columns.iter().enumerate() {
        jac.column_mut(col).assign(column);
    }

    Ok(jac)
}
