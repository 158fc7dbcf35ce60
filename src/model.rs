//! Model evaluator contract and observed data.
//!
//! The forward model is an external collaborator. This module defines the
//! interface the fitting engine needs from it ([`ModelEvaluator`]), the curve
//! it returns ([`ModelCurve`]) and the measured data a fit is run against
//! ([`ObservedData`]).

use ndarray::Array1;

use crate::error::{FitError, Result};
use crate::parameters::ParamMap;

/// Predicted response and log-derivative curves at a set of times.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCurve {
    pub time: Array1<f64>,
    pub primary: Array1<f64>,
    pub derivative: Array1<f64>,
}

impl ModelCurve {
    pub fn new(time: Array1<f64>, primary: Array1<f64>, derivative: Array1<f64>) -> Self {
        Self {
            time,
            primary,
            derivative,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// A forward model that can be calibrated.
///
/// Implementations must be pure for a given parameter map and time vector:
/// the same inputs give the same curve. Evaluation may be expensive.
///
/// # Example
///
/// ```
/// use ndarray::Array1;
/// use welltest_lm::model::{ModelCurve, ModelEvaluator};
/// use welltest_lm::parameters::ParamMap;
/// use welltest_lm::Result;
///
/// struct Radial;
///
/// impl ModelEvaluator for Radial {
///     fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
///         let k = params.get("k").unwrap_or(1.0);
///         let primary = time.mapv(|t| (1.0 + t).ln() / k);
///         let derivative = time.mapv(|t| t / (1.0 + t) / k);
///         Ok(ModelCurve::new(time.clone(), primary, derivative))
///     }
/// }
/// ```
pub trait ModelEvaluator: Send + Sync {
    /// Evaluate both curves at `time`.
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve>;

    /// Switch between the evaluator's fast and accurate modes.
    fn set_high_precision(&self, _high: bool) {}

    /// Whether `evaluate` may be called from several threads at once.
    fn is_reentrant(&self) -> bool {
        false
    }
}

/// Measured data a fit runs against.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedData {
    time: Array1<f64>,
    primary: Array1<f64>,
    derivative: Array1<f64>,
}

impl ObservedData {
    /// Build observed data, rejecting empty, ragged or non-finite inputs.
    pub fn new(time: Array1<f64>, primary: Array1<f64>, derivative: Array1<f64>) -> Result<Self> {
        if time.is_empty() {
            return Err(FitError::InvalidInput(
                "observed data must not be empty".to_string(),
            ));
        }
        if primary.len() != time.len() || derivative.len() != time.len() {
            return Err(FitError::DimensionMismatch(format!(
                "observed time has {} samples, primary {}, derivative {}",
                time.len(),
                primary.len(),
                derivative.len()
            )));
        }
        let channels = [("time", &time), ("primary", &primary), ("derivative", &derivative)];
        for (name, samples) in channels {
            if let Some(i) = samples.iter().position(|v| !v.is_finite()) {
                return Err(FitError::InvalidInput(format!(
                    "observed {} sample {} is not finite: {}",
                    name, i, samples[i]
                )));
            }
        }
        Ok(Self {
            time,
            primary,
            derivative,
        })
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn primary(&self) -> &Array1<f64> {
        &self.primary
    }

    pub fn derivative(&self) -> &Array1<f64> {
        &self.derivative
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Holds an evaluator in low-precision mode; restores high precision on drop.
pub struct PrecisionGuard<'a, E: ModelEvaluator + ?Sized> {
    evaluator: &'a E,
}

impl<'a, E: ModelEvaluator + ?Sized> PrecisionGuard<'a, E> {
    pub fn acquire(evaluator: &'a E) -> Self {
        evaluator.set_high_precision(false);
        Self { evaluator }
    }
}

impl<E: ModelEvaluator + ?Sized> Drop for PrecisionGuard<'_, E> {
    fn drop(&mut self) {
        self.evaluator.set_high_precision(true);
    }
}

/// Logarithmic time grid `10^e` for `e = -4.0, -3.9, ..., 4.0` (81 points).
pub fn default_time_grid() -> Array1<f64> {
    Array1::from_iter((-40..=40).map(|i| 10f64.powf(i as f64 / 10.0)))
}
