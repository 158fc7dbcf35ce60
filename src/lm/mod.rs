//! Levenberg-Marquardt fitting driver.
//!
//! This module provides the damped Gauss-Newton iteration that calibrates the
//! fitted parameters of a [`ParameterSet`](crate::parameters::ParameterSet)
//! against observed data, minimizing the weighted log misfit of both curves.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod solver;
pub mod step;

// Re-export key types
pub use algorithm::{
    FitObserver, FitReport, FitUpdate, LevenbergMarquardt, NullObserver, UpdateStage,
};
pub use config::{CurveGrid, FitConfig};
pub use convergence::{Exhaustion, FitStatus};
pub use solver::solve_symmetric;
pub use step::{apply_step, NormalEquations};
