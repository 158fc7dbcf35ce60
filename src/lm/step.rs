//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! The normal equations `H = JᵀJ`, `g = Jᵀr` are assembled once per outer
//! iteration; every inner trial damps a copy of `H` and solves for a step.

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::lm::solver::solve_symmetric;
use crate::parameters::{ParamMap, ParameterSet, StepSpace};

/// Gauss-Newton normal equations at the current point.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    /// Approximate Hessian `JᵀJ`, exactly symmetric
    pub h: Array2<f64>,

    /// Gradient `Jᵀr`
    pub g: Array1<f64>,
}

impl NormalEquations {
    /// Assemble `H` and `g` from a Jacobian and residual vector.
    ///
    /// Only the lower triangle of `H` is summed; the upper triangle is a copy
    /// of it, so `H[i][j] == H[j][i]` bit for bit.
    pub fn assemble(jacobian: &Array2<f64>, residuals: &Array1<f64>) -> Self {
        let n = jacobian.ncols();
        let mut h = Array2::zeros((n, n));
        for i in 0..n {
            let col_i = jacobian.column(i);
            for j in 0..=i {
                let value = col_i.dot(&jacobian.column(j));
                h[[i, j]] = value;
                h[[j, i]] = value;
            }
        }
        let g = jacobian.t().dot(residuals);
        Self { h, g }
    }

    /// `H` with `lambda * (1 + |H_ii|)` added to each diagonal entry.
    pub fn damped(&self, lambda: f64) -> Array2<f64> {
        let mut damped = self.h.clone();
        for i in 0..damped.nrows() {
            damped[[i, i]] += lambda * (1.0 + self.h[[i, i]].abs());
        }
        damped
    }

    /// Solve `(H + damping) δ = -g`.
    pub fn solve(&self, lambda: f64) -> Result<Array1<f64>> {
        solve_symmetric(&self.damped(lambda), &-&self.g)
    }
}

/// Apply `step` to the fitted parameters of `current`.
///
/// Each fitted parameter moves in its step space and is clamped into its
/// bounds; derived parameters are recomputed afterwards.
pub fn apply_step(
    set: &ParameterSet,
    current: &ParamMap,
    fit_indices: &[usize],
    step: &Array1<f64>,
    log_threshold: f64,
) -> ParamMap {
    let mut trial = current.clone();
    for (&index, &delta) in fit_indices.iter().zip(step.iter()) {
        let Some(param) = set.at(index) else {
            continue;
        };
        let Some(value) = current.get(param.name()) else {
            continue;
        };
        let space = StepSpace::for_value(param.kind(), value, log_threshold);
        trial.insert(param.name(), param.bounds().clamp(space.apply(value, delta)));
    }
    set.recompute_derived(&mut trial);
    trial
}
