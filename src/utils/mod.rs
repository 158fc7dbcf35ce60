//! Numerical helpers for the fitting engine.

pub mod finite_difference;
pub mod matrix_convert;
pub mod parallel;

pub use finite_difference::{central_jacobian, JacobianSteps};
pub use matrix_convert::{nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra};
pub use parallel::central_jacobian_parallel;
