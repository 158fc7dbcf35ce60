//! # Parameter System
//!
//! Named model parameters with fit flags, bounds and a step classification,
//! collected in an insertion-ordered [`ParameterSet`].
//!
//! ## Core Components
//!
//! - [`Parameter`]: one scalar with its value, bounds, fit flag and [`ParameterKind`]
//! - [`ParameterSet`]: ordered, uniquely named parameters plus derivation rules
//! - [`ParamMap`]: the name/value view handed to the model evaluator
//! - [`DerivedParameter`]: ratios recomputed from other parameters, never fitted
//! - [`Bounds`]: the closed interval every accepted value must stay in
//!
//! ## Example Usage
//!
//! ```rust
//! use welltest_lm::parameters::{Parameter, ParameterSet};
//!
//! let mut params = ParameterSet::new();
//! params.add_fitted("k", 10.0, 0.01, 1000.0).unwrap();
//! params.add(Parameter::new("S", 0.0)).unwrap();
//!
//! let map = params.to_map();
//! assert_eq!(map.get("k"), Some(10.0));
//! assert_eq!(params.fit_indices(), vec![0]);
//! ```

pub mod bounds;
pub mod derived;
pub mod parameter;
pub mod parameters;


// Re-export key types
pub use bounds::{Bounds, BoundsError};
pub use derived::DerivedParameter;
pub use parameter::{Parameter, ParameterError, ParameterKind, StepSpace};
pub use parameters::{ParamMap, ParameterSet};
