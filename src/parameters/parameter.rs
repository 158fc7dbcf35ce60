//! Parameter definition and implementation
//!
//! A [`Parameter`] is one named scalar of the physical model: its current value,
//! whether the optimizer may move it, its bounds, and its [`ParameterKind`].
//! The kind decides how the optimizer perturbs and updates the value and is
//! fixed when the parameter is built.

use crate::parameters::bounds::{Bounds, BoundsError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameters that are naturally additive or integer-like. They are stepped
/// linearly even when positive: a skin factor and a fracture count.
pub const ADDITIVE_PARAMETERS: &[&str] = &["S", "nf"];

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Parameter name must not be empty")]
    EmptyName,

    #[error("Parameter '{name}' has non-finite value {value}")]
    NonFiniteValue { name: String, value: f64 },

    #[error("Bounds error: {0}")]
    BoundsError(#[from] BoundsError),
}

/// How the optimizer moves a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Spans orders of magnitude; stepped and updated in log10 space while
    /// the value is positive.
    ScaleSensitive,
    /// Near-linear or integer-like; always stepped and updated linearly.
    Additive,
}

impl ParameterKind {
    /// Classify a parameter by its model name.
    pub fn classify(name: &str) -> Self {
        if ADDITIVE_PARAMETERS.contains(&name) {
            ParameterKind::Additive
        } else {
            ParameterKind::ScaleSensitive
        }
    }
}

/// The space a single step is taken in, for the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSpace {
    /// `value' = 10^(log10(value) + delta)`
    Log10,
    /// `value' = value + delta`
    Linear,
}

impl StepSpace {
    /// Pick the step space for `value` of a parameter of `kind`.
    ///
    /// Scale-sensitive parameters fall back to linear steps at or below
    /// `log_threshold` where the logarithm is meaningless.
    pub fn for_value(kind: ParameterKind, value: f64, log_threshold: f64) -> Self {
        match kind {
            ParameterKind::ScaleSensitive if value > log_threshold => StepSpace::Log10,
            _ => StepSpace::Linear,
        }
    }

    /// Move `value` by `delta` in this space.
    pub fn apply(self, value: f64, delta: f64) -> f64 {
        match self {
            StepSpace::Log10 => 10f64.powf(value.log10() + delta),
            StepSpace::Linear => value + delta,
        }
    }
}

/// A model parameter taking part in (or excluded from) a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter, unique within a set
    name: String,

    /// Current value of the parameter
    value: f64,

    /// Whether the optimizer varies this parameter
    #[serde(rename = "isFit")]
    fit: bool,

    /// Minimum and maximum bounds for the parameter value
    #[serde(flatten)]
    bounds: Bounds,

    /// How the optimizer steps this parameter
    kind: ParameterKind,
}

impl Parameter {
    /// Create a new unbounded parameter, not fitted, classified by name.
    ///
    /// # Examples
    ///
    /// ```
    /// use welltest_lm::parameters::{Parameter, ParameterKind};
    ///
    /// let k = Parameter::new("k", 10.0);
    /// assert_eq!(k.name(), "k");
    /// assert!(!k.is_fit());
    /// assert_eq!(k.kind(), ParameterKind::ScaleSensitive);
    ///
    /// let skin = Parameter::new("S", 0.5);
    /// assert_eq!(skin.kind(), ParameterKind::Additive);
    /// ```
    pub fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            fit: false,
            bounds: Bounds::default(),
            kind: ParameterKind::classify(name),
        }
    }

    /// Create a parameter with explicit bounds. The value is clamped into them.
    ///
    /// # Examples
    ///
    /// ```
    /// use welltest_lm::parameters::Parameter;
    ///
    /// let k = Parameter::with_bounds("k", 500.0, 0.01, 100.0).unwrap();
    /// assert_eq!(k.value(), 100.0);
    /// ```
    pub fn with_bounds(name: &str, value: f64, min: f64, max: f64) -> Result<Self, ParameterError> {
        let bounds = Bounds::new(min, max)?;
        let mut param = Self::new(name, value);
        param.value = bounds.clamp(value);
        param.bounds = bounds;
        param.validate()?;
        Ok(param)
    }

    /// Create a parameter from a model default with [`Bounds::around_default`].
    ///
    /// The value is clamped into those bounds, so a negative default starts
    /// at `0`.
    pub fn from_default(name: &str, value: f64) -> Self {
        let mut param = Self::new(name, value);
        param.bounds = Bounds::around_default(value);
        param.value = param.bounds.clamp(value);
        param
    }

    /// Builder-style fit flag.
    pub fn fitted(mut self, fit: bool) -> Self {
        self.fit = fit;
        self
    }

    /// Builder-style kind override.
    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ParameterError> {
        if self.name.is_empty() {
            return Err(ParameterError::EmptyName);
        }
        if !self.value.is_finite() {
            return Err(ParameterError::NonFiniteValue {
                name: self.name.clone(),
                value: self.value,
            });
        }
        if !self.bounds.is_within_bounds(self.value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value: self.value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value of the parameter
    ///
    /// Returns an error if the value is outside bounds; the stored value is
    /// left untouched in that case.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !self.bounds.is_within_bounds(value) {
            return Err(ParameterError::BoundsError(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }));
        }

        self.value = value;
        Ok(())
    }

    /// Set the value, clamping it into bounds.
    pub fn set_value_clamped(&mut self, value: f64) {
        self.value = self.bounds.clamp(value);
    }

    pub fn is_fit(&self) -> bool {
        self.fit
    }

    pub fn set_fit(&mut self, fit: bool) {
        self.fit = fit;
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ParameterKind) {
        self.kind = kind;
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Set the bounds for the parameter, clamping the current value into them.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        let bounds = Bounds::new(min, max)?;
        self.bounds = bounds;
        self.value = bounds.clamp(self.value);
        Ok(())
    }

    /// Step space for the current value.
    pub fn step_space(&self, log_threshold: f64) -> StepSpace {
        StepSpace::for_value(self.kind, self.value, log_threshold)
    }
}
