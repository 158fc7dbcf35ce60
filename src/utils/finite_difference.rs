//! Finite difference methods for numerical differentiation.
//!
//! The Jacobian is taken by central differences, one column per fitted
//! parameter. Scale-sensitive parameters are perturbed in log10 space, the
//! others linearly, and derived parameters are recomputed at every perturbed
//! point.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::parameters::{ParamMap, ParameterSet, StepSpace};
use crate::problem::Problem;

/// Step sizes for the central-difference Jacobian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianSteps {
    /// Step in log10 units for scale-sensitive parameters
    pub log_step: f64,
    /// Absolute step for everything else
    pub linear_step: f64,
    /// Values at or below this are stepped linearly regardless of kind
    pub log_threshold: f64,
}

impl Default for JacobianSteps {
    fn default() -> Self {
        Self {
            log_step: 0.01,
            linear_step: 1e-4,
            log_threshold: 1e-12,
        }
    }
}

impl JacobianSteps {
    /// Step space and size for a parameter of `set` at `value`.
    pub fn for_parameter(&self, set: &ParameterSet, index: usize, value: f64) -> (StepSpace, f64) {
        let space = match set.at(index) {
            Some(param) => StepSpace::for_value(param.kind(), value, self.log_threshold),
            None => StepSpace::Linear,
        };
        let h = match space {
            StepSpace::Log10 => self.log_step,
            StepSpace::Linear => self.linear_step,
        };
        (space, h)
    }
}

/// Compute the Jacobian matrix using central finite differences.
///
/// J[i,j] = (r_i(v_j+) - r_i(v_j-)) / (2h) where `v_j±` is the j-th fitted
/// parameter moved by `±h` in its step space.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `set` - Parameter metadata: kinds, insertion order and derivations
/// * `base` - The parameter map at which to evaluate the Jacobian
/// * `fit_indices` - Insertion indices of the fitted parameters, in column order
/// * `base_len` - Length of the residual vector at `base`
/// * `steps` - Step sizes
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The `base_len x fit_indices.len()` Jacobian
pub fn central_jacobian<P: Problem + ?Sized>(
    problem: &P,
    set: &ParameterSet,
    base: &ParamMap,
    fit_indices: &[usize],
    base_len: usize,
    steps: &JacobianSteps,
) -> Result<Array2<f64>> {
    let mut jac = Array2::zeros((base_len, fit_indices.len()));

    for (col, &index) in fit_indices.iter().enumerate() {
        let column = central_column(problem, set, base, index, base_len, steps)?;
        jac.column_mut(col).assign(&column);
    }

    Ok(jac)
}

/// One Jacobian column by central differences.
pub(crate) fn central_column<P: Problem + ?Sized>(
    problem: &P,
    set: &ParameterSet,
    base: &ParamMap,
    index: usize,
    base_len: usize,
    steps: &JacobianSteps,
) -> Result<Array1<f64>> {
    let name = set
        .at(index)
        .map(|p| p.name().to_string())
        .ok_or_else(|| FitError::InvalidParameter(format!("no parameter at index {}", index)))?;
    let value = base
        .get(&name)
        .ok_or_else(|| FitError::ParameterNotFound(name.clone()))?;

    let (space, h) = steps.for_parameter(set, index, value);

    let (up, down) = (space.apply(value, h), space.apply(value, -h));
    let forward = perturbed_residuals(problem, set, base, &name, up, base_len)?;
    let backward = perturbed_residuals(problem, set, base, &name, down, base_len)?;

    Ok((forward - backward) / (2.0 * h))
}

fn perturbed_residuals<P: Problem + ?Sized>(
    problem: &P,
    set: &ParameterSet,
    base: &ParamMap,
    name: &str,
    value: f64,
    base_len: usize,
) -> Result<Array1<f64>> {
    let mut map = base.clone();
    map.insert(name, value);
    set.recompute_derived(&mut map);

    let residuals = problem.eval(&map)?;
    if residuals.len() != base_len {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals after perturbing '{}', got {}",
            base_len,
            name,
            residuals.len()
        )));
    }
    Ok(residuals)
}
