//! Configuration options for the Levenberg-Marquardt driver.
//!
//! The defaults reproduce the reference fitting behaviour: λ starts at 0.01,
//! moves by a factor of ten, at most five trials per iteration and fifty
//! iterations per run.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::problem::DEFAULT_POSITIVE_FLOOR;
use crate::utils::finite_difference::JacobianSteps;

/// Abscissa used for the curves attached to update notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurveGrid {
    /// The observed time samples
    #[default]
    Observed,

    /// [`default_time_grid`](crate::model::default_time_grid)
    LogSpaced,
}

/// Configuration options for the Levenberg-Marquardt driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Maximum number of outer iterations. Default: 50
    pub max_iterations: usize,

    /// Maximum number of damped trials per iteration. Default: 5
    pub max_trials: usize,

    /// Initial value for the damping parameter. Default: 0.01
    pub initial_lambda: f64,

    /// Factor applied to lambda after a rejected trial. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor applied to lambda after an accepted trial. Default: 0.1
    pub lambda_down_factor: f64,

    /// Lambda above which a fruitless iteration ends the run. Default: 1e10
    pub max_lambda: f64,

    /// Mean squared residual below which the fit has converged. Default: 3e-3
    pub mse_tolerance: f64,

    /// Jacobian step for log-space parameters, in log10 units. Default: 0.01
    pub log_step: f64,

    /// Jacobian step for linear parameters. Default: 1e-4
    pub linear_step: f64,

    /// Samples at or below this are ignored in the residual. Default: 1e-10
    pub positive_floor: f64,

    /// Scale-sensitive values at or below this are stepped linearly. Default: 1e-12
    pub log_threshold: f64,

    /// Weight of the primary channel; the derivative gets `1 - weight`. Default: 0.5
    pub weight: f64,

    /// Grid for the curves in update notifications. Default: `Observed`
    pub curve_grid: CurveGrid,

    /// Compute Jacobian columns in parallel for reentrant evaluators. Default: false
    pub parallel_jacobian: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_trials: 5,
            initial_lambda: 0.01,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            max_lambda: 1e10,
            mse_tolerance: 3e-3,
            log_step: 0.01,
            linear_step: 1e-4,
            positive_floor: DEFAULT_POSITIVE_FLOOR,
            log_threshold: 1e-12,
            weight: 0.5,
            curve_grid: CurveGrid::Observed,
            parallel_jacobian: false,
        }
    }
}

impl FitConfig {
    /// Check the option values.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(FitError::InvalidInput(format!(
                "weight must lie in [0, 1], got {}",
                self.weight
            )));
        }
        let positive = [
            ("initial_lambda", self.initial_lambda),
            ("lambda_up_factor", self.lambda_up_factor),
            ("lambda_down_factor", self.lambda_down_factor),
            ("max_lambda", self.max_lambda),
            ("log_step", self.log_step),
            ("linear_step", self.linear_step),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FitError::InvalidInput(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        let non_negative = [
            ("mse_tolerance", self.mse_tolerance),
            ("positive_floor", self.positive_floor),
            ("log_threshold", self.log_threshold),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FitError::InvalidInput(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        // λ must grow on rejection and shrink on acceptance
        if self.lambda_up_factor <= 1.0 {
            return Err(FitError::InvalidInput(format!(
                "lambda_up_factor must exceed 1, got {}",
                self.lambda_up_factor
            )));
        }
        if self.lambda_down_factor >= 1.0 {
            return Err(FitError::InvalidInput(format!(
                "lambda_down_factor must be below 1, got {}",
                self.lambda_down_factor
            )));
        }
        if self.max_trials == 0 {
            return Err(FitError::InvalidInput(
                "max_trials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Step sizes for the Jacobian.
    pub fn jacobian_steps(&self) -> JacobianSteps {
        JacobianSteps {
            log_step: self.log_step,
            linear_step: self.linear_step,
            log_threshold: self.log_threshold,
        }
    }
}
