//! # welltest-lm
//!
//! `welltest-lm` calibrates the named parameters of a forward model against a
//! measured response curve and its logarithmic derivative with a damped
//! Levenberg-Marquardt iteration in log space.
//!
//! The library provides:
//! - A parameter system with bounds, fit flags, log/linear step classes and
//!   derived ratios
//! - A weighted log-domain residual over both curves
//! - A central-difference Jacobian and a damped normal-equation solver
//! - A cancellable background runner with in-order progress notifications
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::Array1;
//! use welltest_lm::model::{ModelCurve, ModelEvaluator, ObservedData};
//! use welltest_lm::parameters::{ParamMap, ParameterSet};
//! use welltest_lm::{LevenbergMarquardt, Result};
//!
//! struct Radial;
//!
//! impl ModelEvaluator for Radial {
//!     fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
//!         let k = params.get("k").unwrap_or(1.0);
//!         let primary = time.mapv(|t| (1.0 + t).ln() / k);
//!         let derivative = time.mapv(|t| t / (1.0 + t) / k);
//!         Ok(ModelCurve::new(time.clone(), primary, derivative))
//!     }
//! }
//!
//! let time = Array1::from_vec(vec![1.0, 2.0, 4.0, 8.0]);
//! let primary = time.mapv(|t: f64| (1.0 + t).ln() / 4.0);
//! let derivative = time.mapv(|t: f64| t / (1.0 + t) / 4.0);
//! let observed = ObservedData::new(time, primary, derivative).unwrap();
//!
//! let mut params = ParameterSet::new();
//! params.add_fitted("k", 1.0, 0.01, 100.0).unwrap();
//!
//! let report = LevenbergMarquardt::new()
//!     .minimize(&Radial, &params, &observed)
//!     .unwrap();
//! assert!(report.status.is_converged());
//! params.apply_map(&report.params);
//! ```

pub mod error;
pub mod lm;
pub mod model;
pub mod parameters;
pub mod problem;
pub mod runner;
pub mod utils;

// Re-exports for convenience
pub use error::{FitError, Result};
pub use lm::{FitConfig, FitReport, FitStatus, LevenbergMarquardt};
pub use model::{ModelCurve, ModelEvaluator, ObservedData};
pub use parameters::{ParamMap, ParameterSet};
pub use problem::{LogResidualProblem, Problem};
pub use runner::{FitEvent, FitHandle, FitRunner};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
