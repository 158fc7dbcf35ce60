//! Shared models and data generators for the integration tests.

use ndarray::Array1;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use welltest_lm::model::{ModelCurve, ModelEvaluator, ObservedData};
use welltest_lm::parameters::{ParamMap, ParameterSet};
use welltest_lm::{FitError, Result};

/// primary = a * t^b, derivative = a * b * t^b
pub struct PowerLawModel;

impl ModelEvaluator for PowerLawModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let a = params.get("a").unwrap_or(1.0);
        let b = params.get("b").unwrap_or(1.0);
        let primary = time.mapv(|t| a * t.powf(b));
        let derivative = &primary * b;
        Ok(ModelCurve::new(time.clone(), primary, derivative))
    }
}

/// Same curves as [`PowerLawModel`], but safe to evaluate concurrently.
pub struct ReentrantPowerLaw;

impl ModelEvaluator for ReentrantPowerLaw {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        PowerLawModel.evaluate(params, time)
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}

/// primary = ln(1 + t) / k, derivative = t / (1 + t) / k
pub struct RadialModel;

impl ModelEvaluator for RadialModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let k = params.get("k").unwrap_or(1.0);
        let primary = time.mapv(|t| (1.0 + t).ln() / k);
        let derivative = time.mapv(|t| t / (1.0 + t) / k);
        Ok(ModelCurve::new(time.clone(), primary, derivative))
    }
}

/// primary = a * sqrt(t) * (1 + LfD), derivative = primary / 2
pub struct FractureModel;

impl ModelEvaluator for FractureModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let a = params.get("a").unwrap_or(1.0);
        let lfd = params.get("LfD").unwrap_or(0.0);
        let primary = time.mapv(|t| a * t.sqrt() * (1.0 + lfd));
        let derivative = &primary * 0.5;
        Ok(ModelCurve::new(time.clone(), primary, derivative))
    }
}

/// Ignores its parameters; every step is a no-op.
pub struct ConstantModel(pub f64);

impl ModelEvaluator for ConstantModel {
    fn evaluate(&self, _params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let curve = Array1::from_elem(time.len(), self.0);
        Ok(ModelCurve::new(time.clone(), curve.clone(), curve))
    }
}

/// Power law that panics anywhere but `a = 1`.
pub struct PanickingModel;

impl ModelEvaluator for PanickingModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let a = params.get("a").unwrap_or(1.0);
        if a != 1.0 {
            panic!("model diverged at a = {}", a);
        }
        PowerLawModel.evaluate(params, time)
    }
}

/// Power law whose primary curve is `+inf` wherever `a > 1`.
pub struct OverflowingModel;

impl ModelEvaluator for OverflowingModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let mut curve = PowerLawModel.evaluate(params, time)?;
        if params.get("a").unwrap_or(1.0) > 1.0 {
            curve.primary.fill(f64::INFINITY);
        }
        Ok(curve)
    }
}

/// Records precision switches and the mode each evaluation ran in. Fails
/// every evaluation from `fail_after` on, if set.
pub struct PrecisionRecorder {
    pub switches: Mutex<Vec<bool>>,
    pub evaluations: Mutex<Vec<bool>>,
    high: Mutex<bool>,
    fail_after: Option<usize>,
}

impl PrecisionRecorder {
    pub fn new(fail_after: Option<usize>) -> Self {
        Self {
            switches: Mutex::new(Vec::new()),
            evaluations: Mutex::new(Vec::new()),
            high: Mutex::new(true),
            fail_after,
        }
    }
}

impl ModelEvaluator for PrecisionRecorder {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let mut evaluations = self.evaluations.lock().unwrap();
        if let Some(limit) = self.fail_after {
            if evaluations.len() >= limit {
                return Err(FitError::ModelEvaluation("solver diverged".to_string()));
            }
        }
        evaluations.push(*self.high.lock().unwrap());
        PowerLawModel.evaluate(params, time)
    }

    fn set_high_precision(&self, high: bool) {
        *self.high.lock().unwrap() = high;
        self.switches.lock().unwrap().push(high);
    }
}

/// A power-law model whose evaluation number `block_at` waits until
/// [`GatedModel::release`] is called.
pub struct GatedModel {
    block_at: usize,
    calls: AtomicUsize,
    state: Mutex<GateState>,
    signal: Condvar,
}

#[derive(Default)]
struct GateState {
    blocked: bool,
    released: bool,
}

impl GatedModel {
    pub fn new(block_at: usize) -> Self {
        Self {
            block_at,
            calls: AtomicUsize::new(0),
            state: Mutex::new(GateState::default()),
            signal: Condvar::new(),
        }
    }

    /// Wait until the worker is parked in the gated evaluation.
    pub fn wait_until_blocked(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.blocked {
            state = self.signal.wait(state).unwrap();
        }
    }

    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.released = true;
        self.signal.notify_all();
    }
}

impl ModelEvaluator for GatedModel {
    fn evaluate(&self, params: &ParamMap, time: &Array1<f64>) -> Result<ModelCurve> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == self.block_at {
            let mut state = self.state.lock().unwrap();
            state.blocked = true;
            self.signal.notify_all();
            while !state.released {
                state = self.signal.wait(state).unwrap();
            }
        }
        PowerLawModel.evaluate(params, time)
    }
}

/// Log-spaced sample times over `decades` decades starting at 0.1.
pub fn log_times(n: usize, decades: f64) -> Array1<f64> {
    Array1::from_iter((0..n).map(|i| 10f64.powf(-1.0 + decades * i as f64 / (n - 1) as f64)))
}

/// Observations produced by `model` at `params`.
pub fn synthetic<E: ModelEvaluator>(
    model: &E,
    params: &[(&str, f64)],
    time: Array1<f64>,
) -> ObservedData {
    let map: ParamMap = params.iter().copied().collect();
    let curve = model.evaluate(&map, &time).unwrap();
    ObservedData::new(time, curve.primary, curve.derivative).unwrap()
}

/// Observations with multiplicative log-normal noise from a fixed seed.
pub fn noisy<E: ModelEvaluator>(
    model: &E,
    params: &[(&str, f64)],
    time: Array1<f64>,
    sigma: f64,
    seed: u64,
) -> ObservedData {
    let clean = synthetic(model, params, time);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, sigma).unwrap();
    let mut perturb = |v: &Array1<f64>| v.mapv(|x| x * normal.sample(&mut rng).exp());
    let primary = perturb(clean.primary());
    let derivative = perturb(clean.derivative());
    ObservedData::new(clean.time().clone(), primary, derivative).unwrap()
}

/// `a` and `b` fitted, starting at the given values.
pub fn power_law_start(a: f64, b: f64) -> ParameterSet {
    let mut set = ParameterSet::new();
    set.add_fitted("a", a, 0.01, 100.0).unwrap();
    set.add_fitted("b", b, 0.01, 10.0).unwrap();
    set
}
