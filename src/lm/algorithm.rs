//! Implementation of the damped log-domain Levenberg-Marquardt driver.
//!
//! The driver works on a name/value [`ParamMap`] instead of a raw vector:
//! every trial point is materialized with its derived parameters so the model
//! evaluator always sees a consistent set. Progress and accepted steps are
//! reported through a [`FitObserver`] in the order they happen.

use ndarray::{Array1, Array2};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::error::Result;
use crate::model::{default_time_grid, ModelCurve, ModelEvaluator, ObservedData, PrecisionGuard};
use crate::parameters::{ParamMap, ParameterSet};
use crate::problem::{sum_of_squares, LogResidualProblem};
use crate::utils::finite_difference::central_jacobian;
use crate::utils::parallel::central_jacobian_parallel;

use super::config::{CurveGrid, FitConfig};
use super::convergence::{Exhaustion, FitStatus};
use super::step::{apply_step, NormalEquations};

/// Point in the run an update was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    /// The starting point, before any step
    Initial,

    /// A trial step was accepted
    Accepted,

    /// The run has ended; this is the last update
    Final,
}

/// Snapshot of the committed state handed to the observer.
#[derive(Debug, Clone)]
pub struct FitUpdate {
    pub stage: UpdateStage,

    /// Outer iterations completed so far
    pub iteration: usize,

    /// Mean squared residual of `params`
    pub mse: f64,

    /// Committed parameter values with derived parameters applied
    pub params: ParamMap,

    /// Model curves at `params`
    pub curve: ModelCurve,
}

/// Receives notifications from a running fit.
pub trait FitObserver {
    /// Called once per outer iteration with a percentage in `0..100`.
    fn on_progress(&mut self, percent: u32);

    /// Called with the initial point, every accepted step, and the final state.
    fn on_update(&mut self, update: FitUpdate);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl FitObserver for NullObserver {
    fn on_progress(&mut self, _percent: u32) {}

    fn on_update(&mut self, _update: FitUpdate) {}
}

/// Result of a fitting run.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// How the run ended
    pub status: FitStatus,

    /// Final parameter values with derived parameters applied
    pub params: ParamMap,

    /// Sum of squared residuals at `params` (NaN if nothing was evaluated)
    pub sse: f64,

    /// `sse / residual_count`
    pub mse: f64,

    /// Length of the residual vector
    pub residual_count: usize,

    /// Number of outer iterations performed
    pub iterations: usize,

    /// Number of model evaluations
    pub func_evals: usize,

    /// Damping factor when the run ended
    pub lambda: f64,

    /// MSE at the start followed by the MSE after every accepted step
    pub error_trace: Vec<f64>,
}

impl FitReport {
    fn without_evaluation(params: ParamMap, lambda: f64) -> Self {
        Self {
            status: FitStatus::NoFreeParameters,
            params,
            sse: f64::NAN,
            mse: f64::NAN,
            residual_count: 0,
            iterations: 0,
            func_evals: 0,
            lambda,
            error_trace: Vec::new(),
        }
    }
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fit Result:")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  SSE: {:.6e}", self.sse)?;
        writeln!(f, "  MSE: {:.6e} over {} residuals", self.mse, self.residual_count)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Lambda: {:.3e}", self.lambda)?;
        writeln!(f, "  Parameters:")?;
        for (name, value) in self.params.iter() {
            writeln!(f, "    {} = {:.6e}", name, value)?;
        }
        Ok(())
    }
}

/// Committed state of one run.
struct FitState {
    params: ParamMap,
    residuals: Array1<f64>,
    sse: f64,
    lambda: f64,
    iterations: usize,
    func_evals: usize,
    error_trace: Vec<f64>,
}

impl FitState {
    fn mse(&self) -> f64 {
        self.sse / self.residuals.len() as f64
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: FitConfig,
}

impl LevenbergMarquardt {
    /// Create a new optimizer with default configuration.
    pub fn new() -> Self {
        Self {
            config: FitConfig::default(),
        }
    }

    /// Create a new optimizer with the given configuration.
    pub fn with_config(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Set the maximum number of outer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the maximum number of damped trials per iteration.
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.config.max_trials = max_trials;
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the factor by which to increase lambda.
    pub fn with_lambda_up_factor(mut self, factor: f64) -> Self {
        self.config.lambda_up_factor = factor;
        self
    }

    /// Set the factor by which to decrease lambda.
    pub fn with_lambda_down_factor(mut self, factor: f64) -> Self {
        self.config.lambda_down_factor = factor;
        self
    }

    /// Set the maximum value for lambda.
    pub fn with_max_lambda(mut self, max_lambda: f64) -> Self {
        self.config.max_lambda = max_lambda;
        self
    }

    /// Set the convergence tolerance on the mean squared residual.
    pub fn with_mse_tolerance(mut self, tolerance: f64) -> Self {
        self.config.mse_tolerance = tolerance;
        self
    }

    /// Set the weight of the primary channel.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.config.weight = weight;
        self
    }

    /// Set the grid used for notification curves.
    pub fn with_curve_grid(mut self, grid: CurveGrid) -> Self {
        self.config.curve_grid = grid;
        self
    }

    /// Allow parallel Jacobian columns for reentrant evaluators.
    pub fn with_parallel_jacobian(mut self, parallel: bool) -> Self {
        self.config.parallel_jacobian = parallel;
        self
    }

    /// Fit without notifications or cancellation.
    pub fn minimize<E: ModelEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        params: &ParameterSet,
        observed: &ObservedData,
    ) -> Result<FitReport> {
        let stop = AtomicBool::new(false);
        self.fit(evaluator, params, observed, &mut NullObserver, &stop)
    }

    /// Fit the enabled parameters of `params` to `observed`.
    ///
    /// `params` is only read. The fitted values are returned in the report
    /// and streamed to `observer`; applying them to a parameter set is up to
    /// the caller. `stop` is checked at the top of every outer iteration.
    ///
    /// # Arguments
    ///
    /// * `evaluator` - The forward model
    /// * `params` - Starting values, bounds, fit flags and derivations
    /// * `observed` - The measured curves
    /// * `observer` - Receives progress and updates
    /// * `stop` - Cooperative cancellation flag
    ///
    /// # Returns
    ///
    /// * `Result<FitReport>` - The result of the run. Errors are reserved for
    ///   invalid input and evaluator failures; running out of iterations or
    ///   damping is reported through [`FitReport::status`].
    pub fn fit<E: ModelEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        params: &ParameterSet,
        observed: &ObservedData,
        observer: &mut dyn FitObserver,
        stop: &AtomicBool,
    ) -> Result<FitReport> {
        self.config.validate()?;

        let fit_indices = params.fit_indices();
        if fit_indices.is_empty() {
            info!("no parameter is enabled for fitting");
            return Ok(FitReport::without_evaluation(
                params.to_map(),
                self.config.initial_lambda,
            ));
        }
        params.validate_for_fit()?;

        let problem = LogResidualProblem::new(evaluator, observed, self.config.weight)?
            .with_floor(self.config.positive_floor);
        let grid = match self.config.curve_grid {
            CurveGrid::Observed => None,
            CurveGrid::LogSpaced => Some(default_time_grid()),
        };

        let guard = PrecisionGuard::acquire(evaluator);
        let outcome = self.iterate(
            &problem,
            evaluator,
            params,
            &fit_indices,
            grid.as_ref(),
            observer,
            stop,
        );
        drop(guard);
        let (status, mut state) = outcome?;

        info!(
            "fit finished after {} iterations: {} (mse {:.4e})",
            state.iterations,
            status,
            state.mse()
        );

        params.recompute_derived(&mut state.params);
        let curve = match grid.as_ref() {
            Some(grid) => evaluator.evaluate(&state.params, grid)?,
            None => problem.curve(&state.params)?,
        };
        state.func_evals += 1;

        observer.on_update(FitUpdate {
            stage: UpdateStage::Final,
            iteration: state.iterations,
            mse: state.mse(),
            params: state.params.clone(),
            curve,
        });

        Ok(FitReport {
            status,
            residual_count: state.residuals.len(),
            mse: state.mse(),
            sse: state.sse,
            params: state.params,
            iterations: state.iterations,
            func_evals: state.func_evals,
            lambda: state.lambda,
            error_trace: state.error_trace,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn iterate<E: ModelEvaluator + ?Sized>(
        &self,
        problem: &LogResidualProblem<'_, E>,
        evaluator: &E,
        set: &ParameterSet,
        fit_indices: &[usize],
        grid: Option<&Array1<f64>>,
        observer: &mut dyn FitObserver,
        stop: &AtomicBool,
    ) -> Result<(FitStatus, FitState)> {
        let config = &self.config;

        let start = set.to_map();
        let (residuals, curve) = problem.eval_with_curve(&start)?;
        let sse = sum_of_squares(&residuals);
        let mut state = FitState {
            params: start,
            residuals,
            sse,
            lambda: config.initial_lambda,
            iterations: 0,
            func_evals: 1,
            error_trace: Vec::new(),
        };
        state.error_trace.push(state.mse());

        let curve = self.notification_curve(evaluator, &state, grid, curve)?;
        observer.on_update(FitUpdate {
            stage: UpdateStage::Initial,
            iteration: 0,
            mse: state.mse(),
            params: state.params.clone(),
            curve,
        });

        let status = loop {
            if stop.load(Ordering::SeqCst) {
                break FitStatus::Cancelled;
            }
            if state.iterations >= config.max_iterations {
                break if state.mse() < config.mse_tolerance {
                    FitStatus::Converged
                } else {
                    FitStatus::Exhausted(Exhaustion::IterationLimit)
                };
            }
            if state.mse() < config.mse_tolerance {
                break FitStatus::Converged;
            }

            observer.on_progress((state.iterations * 100 / config.max_iterations) as u32);
            debug!(
                "iteration {}: lambda {:.3e}, sse {:.6e}",
                state.iterations, state.lambda, state.sse
            );

            let jacobian = self.jacobian(problem, evaluator, set, &state, fit_indices)?;
            state.func_evals += 2 * fit_indices.len();
            let equations = NormalEquations::assemble(&jacobian, &state.residuals);

            let mut accepted = false;
            for trial in 0..config.max_trials {
                let delta = match equations.solve(state.lambda) {
                    Ok(delta) => delta,
                    Err(e) => {
                        warn!("damped system not solvable at lambda {:.3e}: {}", state.lambda, e);
                        state.lambda *= config.lambda_up_factor;
                        continue;
                    }
                };

                let candidate =
                    apply_step(set, &state.params, fit_indices, &delta, config.log_threshold);
                if candidate == state.params {
                    // TODO: skip the evaluation when clamping leaves the point unchanged
                    debug!("trial {} clamps back onto the current point", trial);
                }

                let (trial_residuals, trial_curve) = problem.eval_with_curve(&candidate)?;
                state.func_evals += 1;
                let trial_sse = sum_of_squares(&trial_residuals);

                if trial_sse < state.sse {
                    state.params = candidate;
                    state.residuals = trial_residuals;
                    state.sse = trial_sse;
                    state.lambda *= config.lambda_down_factor;
                    state.error_trace.push(state.mse());

                    let curve = self.notification_curve(evaluator, &state, grid, trial_curve)?;
                    observer.on_update(FitUpdate {
                        stage: UpdateStage::Accepted,
                        iteration: state.iterations + 1,
                        mse: state.mse(),
                        params: state.params.clone(),
                        curve,
                    });
                    accepted = true;
                    break;
                }

                debug!(
                    "trial {} rejected: sse {:.6e} >= {:.6e}",
                    trial, trial_sse, state.sse
                );
                state.lambda *= config.lambda_up_factor;
            }

            state.iterations += 1;
            if !accepted && state.lambda > config.max_lambda {
                break FitStatus::Exhausted(Exhaustion::DampingLimit);
            }
        };

        Ok((status, state))
    }

    fn jacobian<E: ModelEvaluator + ?Sized>(
        &self,
        problem: &LogResidualProblem<'_, E>,
        evaluator: &E,
        set: &ParameterSet,
        state: &FitState,
        fit_indices: &[usize],
    ) -> Result<Array2<f64>> {
        let steps = self.config.jacobian_steps();
        let base_len = state.residuals.len();
        if self.config.parallel_jacobian && evaluator.is_reentrant() {
            central_jacobian_parallel(problem, set, &state.params, fit_indices, base_len, &steps)
        } else {
            central_jacobian(problem, set, &state.params, fit_indices, base_len, &steps)
        }
    }

    fn notification_curve<E: ModelEvaluator + ?Sized>(
        &self,
        evaluator: &E,
        state: &FitState,
        grid: Option<&Array1<f64>>,
        observed_curve: ModelCurve,
    ) -> Result<ModelCurve> {
        match grid {
            Some(grid) => evaluator.evaluate(&state.params, grid),
            None => Ok(observed_curve),
        }
    }
}
