//! Problem definition trait and the log-domain residual problem.
//!
//! A [`Problem`] turns a parameter map into a residual vector whose length
//! does not change between evaluations. [`LogResidualProblem`] is the
//! two-channel problem the fitting engine solves: the log misfit of the
//! response curve followed by the log misfit of its derivative.

use ndarray::Array1;

use crate::error::{FitError, Result};
use crate::model::{ModelCurve, ModelEvaluator, ObservedData};
use crate::parameters::ParamMap;

/// Samples at or below this value are excluded from the residual.
pub const DEFAULT_POSITIVE_FLOOR: f64 = 1e-10;

/// A nonlinear least-squares problem over named parameters.
pub trait Problem {
    /// Evaluate the residuals at the given parameter map.
    ///
    /// # Returns
    ///
    /// * A vector of exactly [`Problem::residual_count`] residuals, or an
    ///   error if the evaluation fails
    fn eval(&self, params: &ParamMap) -> Result<Array1<f64>>;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Evaluate the sum of squared residuals at the given parameters.
    fn eval_cost(&self, params: &ParamMap) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(sum_of_squares(&residuals))
    }
}

/// Sum of squared residuals.
pub fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Weighted log-domain misfit between observed data and a model.
///
/// For each sample the primary residual is `(ln obs - ln pred) * weight` and
/// the derivative residual is `(ln obs' - ln pred') * (1 - weight)`. A sample
/// where either side is not above the positive floor contributes `0` but keeps
/// its slot.
pub struct LogResidualProblem<'a, E: ModelEvaluator + ?Sized> {
    evaluator: &'a E,
    observed: &'a ObservedData,
    weight: f64,
    floor: f64,
}

impl<'a, E: ModelEvaluator + ?Sized> LogResidualProblem<'a, E> {
    /// Create a problem, rejecting a weight outside `[0, 1]`.
    pub fn new(evaluator: &'a E, observed: &'a ObservedData, weight: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(FitError::InvalidInput(format!(
                "residual weight must lie in [0, 1], got {}",
                weight
            )));
        }
        Ok(Self {
            evaluator,
            observed,
            weight,
            floor: DEFAULT_POSITIVE_FLOOR,
        })
    }

    /// Set the positive floor below which samples are ignored.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn observed(&self) -> &ObservedData {
        self.observed
    }

    /// Evaluate the model at the observed times, checking the curve lengths.
    pub fn curve(&self, params: &ParamMap) -> Result<ModelCurve> {
        let curve = self.evaluator.evaluate(params, self.observed.time())?;
        let n = self.observed.len();
        if curve.primary.len() != n || curve.derivative.len() != n {
            log::warn!(
                "model returned {} primary and {} derivative samples for {} observations",
                curve.primary.len(),
                curve.derivative.len(),
                n
            );
            return Err(FitError::DimensionMismatch(format!(
                "expected {} predicted samples, got primary {} and derivative {}",
                n,
                curve.primary.len(),
                curve.derivative.len()
            )));
        }
        Ok(curve)
    }

    /// Residuals and the curve they were computed from.
    pub fn eval_with_curve(&self, params: &ParamMap) -> Result<(Array1<f64>, ModelCurve)> {
        let curve = self.curve(params)?;
        let residuals = self.residuals_for(&curve);
        Ok((residuals, curve))
    }

    fn residuals_for(&self, curve: &ModelCurve) -> Array1<f64> {
        let obs_primary = self.observed.primary();
        let obs_derivative = self.observed.derivative();

        let n_primary = obs_primary.len().min(curve.primary.len());
        let n_derivative = obs_derivative
            .len()
            .min(curve.derivative.len())
            .min(n_primary);

        let mut residuals = Array1::zeros(n_primary + n_derivative);
        for i in 0..n_primary {
            residuals[i] = self.log_misfit(obs_primary[i], curve.primary[i]) * self.weight;
        }
        for i in 0..n_derivative {
            residuals[n_primary + i] =
                self.log_misfit(obs_derivative[i], curve.derivative[i]) * (1.0 - self.weight);
        }
        residuals
    }

    fn log_misfit(&self, observed: f64, predicted: f64) -> f64 {
        if observed > self.floor && predicted > self.floor {
            observed.ln() - predicted.ln()
        } else {
            0.0
        }
    }
}

impl<E: ModelEvaluator + ?Sized> Problem for LogResidualProblem<'_, E> {
    fn eval(&self, params: &ParamMap) -> Result<Array1<f64>> {
        let curve = self.curve(params)?;
        Ok(self.residuals_for(&curve))
    }

    fn residual_count(&self) -> usize {
        2 * self.observed.len()
    }
}
