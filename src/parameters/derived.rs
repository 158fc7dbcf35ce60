//! Derived (dependent) parameters.
//!
//! A derived parameter is a deterministic function of two independent
//! parameters. It is recomputed every time a parameter map is materialized or
//! perturbed and is never fitted on its own.

use serde::{Deserialize, Serialize};

use crate::parameters::ParamMap;

/// Smallest denominator for which a ratio is recomputed.
pub const DEFAULT_MIN_DENOMINATOR: f64 = 1e-9;

/// `target = numerator / denominator`, recomputed when both inputs are
/// present and `denominator > min_denominator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameter {
    pub target: String,
    pub numerator: String,
    pub denominator: String,
    pub min_denominator: f64,
}

impl DerivedParameter {
    pub fn ratio(target: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            target: target.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            min_denominator: DEFAULT_MIN_DENOMINATOR,
        }
    }

    /// Dimensionless fracture penetration `LfD = Lf / L`.
    pub fn fracture_penetration() -> Self {
        Self::ratio("LfD", "Lf", "L")
    }

    /// Evaluate the rule against `map`, if its inputs allow it.
    pub fn evaluate(&self, map: &ParamMap) -> Option<f64> {
        let numerator = map.get(&self.numerator)?;
        let denominator = map.get(&self.denominator)?;
        if denominator > self.min_denominator {
            Some(numerator / denominator)
        } else {
            None
        }
    }

    /// Write the derived value into `map`; leaves `map` unchanged when the
    /// inputs are missing or the denominator is too small.
    pub fn apply(&self, map: &mut ParamMap) {
        if let Some(value) = self.evaluate(map) {
            map.insert(&self.target, value);
        }
    }
}

/// Rules attached to every parameter set built from model defaults.
pub fn standard_derivations() -> Vec<DerivedParameter> {
    vec![DerivedParameter::fracture_penetration()]
}

/// Apply every rule in order.
pub fn apply_all(rules: &[DerivedParameter], map: &mut ParamMap) {
    for rule in rules {
        rule.apply(map);
    }
}
