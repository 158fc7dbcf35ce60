//! Parameters collection implementation
//!
//! [`ParameterSet`] keeps parameters in insertion order, which is the column
//! order of the Jacobian. [`ParamMap`] is the name/value view handed to the
//! model evaluator, materialized fresh for every trial point with the derived
//! parameters applied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FitError, Result};
use crate::parameters::derived::{self, DerivedParameter};
use crate::parameters::parameter::Parameter;

/// Name to value mapping passed to the model evaluator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamMap {
    values: BTreeMap<String, f64>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.values.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<'a> FromIterator<(&'a str, f64)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// An ordered collection of uniquely named parameters plus the rules that
/// derive dependent values from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,

    #[serde(default)]
    derived: Vec<DerivedParameter>,
}

impl ParameterSet {
    /// Create a new empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from model defaults.
    ///
    /// Every parameter starts unfitted with [`Bounds::around_default`]
    /// bounds, and the standard derivations are attached.
    ///
    /// [`Bounds::around_default`]: crate::parameters::Bounds::around_default
    ///
    /// # Examples
    ///
    /// ```
    /// use welltest_lm::parameters::ParameterSet;
    ///
    /// let set = ParameterSet::from_defaults(&[("k", 10.0), ("L", 1000.0), ("Lf", 50.0)]).unwrap();
    /// assert_eq!(set.len(), 3);
    /// assert_eq!(set.fit_count(), 0);
    /// assert_eq!(set.to_map().get("LfD"), Some(0.05));
    /// ```
    pub fn from_defaults(defaults: &[(&str, f64)]) -> Result<Self> {
        let mut set = Self::new();
        for &(name, value) in defaults {
            set.add(Parameter::from_default(name, value))?;
        }
        for rule in derived::standard_derivations() {
            set.add_derived(rule);
        }
        Ok(set)
    }

    /// Add a parameter to the end of the set
    ///
    /// Fails if a parameter with the same name already exists.
    pub fn add(&mut self, param: Parameter) -> Result<()> {
        param.validate()?;
        if self.contains(param.name()) {
            return Err(FitError::DuplicateParameter(param.name().to_string()));
        }
        self.parameters.push(param);
        Ok(())
    }

    /// Add a fitted parameter with bounds.
    pub fn add_fitted(&mut self, name: &str, value: f64, min: f64, max: f64) -> Result<()> {
        let param = Parameter::with_bounds(name, value, min, max)?.fitted(true);
        self.add(param)
    }

    /// Attach a derivation rule.
    pub fn add_derived(&mut self, rule: DerivedParameter) {
        self.derived.push(rule);
    }

    pub fn derived(&self) -> &[DerivedParameter] {
        &self.derived
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name() == name)
    }

    /// Parameter at insertion position `index`.
    pub fn at(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    /// Mark a parameter for fitting (or release it).
    pub fn set_fit(&mut self, name: &str, fit: bool) -> Result<()> {
        self.get_mut(name)
            .ok_or_else(|| FitError::ParameterNotFound(name.to_string()))?
            .set_fit(fit);
        Ok(())
    }

    /// Insertion indices of the fit-enabled parameters.
    pub fn fit_indices(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_fit())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn fit_count(&self) -> usize {
        self.parameters.iter().filter(|p| p.is_fit()).count()
    }

    /// Reject fitted parameters that are also derivation targets.
    pub fn validate_for_fit(&self) -> Result<()> {
        for rule in &self.derived {
            if let Some(param) = self.get(&rule.target) {
                if param.is_fit() {
                    return Err(FitError::DerivedParameterFit(rule.target.clone()));
                }
            }
        }
        Ok(())
    }

    /// Recompute every derived parameter in `map`.
    pub fn recompute_derived(&self, map: &mut ParamMap) {
        derived::apply_all(&self.derived, map);
    }

    /// Materialize the current values, derived parameters included.
    pub fn to_map(&self) -> ParamMap {
        let mut map: ParamMap = self
            .parameters
            .iter()
            .map(|p| (p.name(), p.value()))
            .collect();
        self.recompute_derived(&mut map);
        map
    }

    /// Write values from `map` back into same-named parameters, clamped into
    /// their bounds. Names not in the set are ignored.
    pub fn apply_map(&mut self, map: &ParamMap) {
        for param in &mut self.parameters {
            if let Some(value) = map.get(param.name()) {
                param.set_value_clamped(value);
            }
        }
    }

    /// Copy values of same-named parameters from `other`, keeping this set's
    /// bounds, fit flags and kinds. Carried values are clamped into this
    /// set's bounds.
    pub fn carry_over_values(&mut self, other: &ParameterSet) {
        for param in &mut self.parameters {
            if let Some(source) = other.get(param.name()) {
                param.set_value_clamped(source.value());
            }
        }
    }

    /// Restore value, fit flag, bounds and kind by name from a snapshot.
    /// Parameters unknown to this set are skipped.
    pub fn restore_from(&mut self, snapshot: &ParameterSet) {
        for param in &mut self.parameters {
            if let Some(source) = snapshot.get(param.name()) {
                *param = source.clone();
            }
        }
    }

    /// Serialize the set as a JSON snapshot.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON snapshot, re-checking name uniqueness and values.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: ParameterSet = serde_json::from_str(json)?;
        let mut set = ParameterSet::new();
        for param in raw.parameters {
            set.add(param)?;
        }
        set.derived = raw.derived;
        Ok(set)
    }
}
