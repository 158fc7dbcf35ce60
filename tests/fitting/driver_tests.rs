use approx::assert_relative_eq;
use ndarray::Array1;
use std::sync::atomic::AtomicBool;

use welltest_lm::lm::{
    Exhaustion, FitObserver, FitStatus, FitUpdate, LevenbergMarquardt, UpdateStage,
};
use welltest_lm::model::ObservedData;
use welltest_lm::parameters::{Parameter, ParameterSet};
use welltest_lm::{FitConfig, FitError};

use crate::common::*;

#[derive(Default)]
struct Collect {
    updates: Vec<FitUpdate>,
    progress: Vec<u32>,
}

impl FitObserver for Collect {
    fn on_progress(&mut self, percent: u32) {
        self.progress.push(percent);
    }

    fn on_update(&mut self, update: FitUpdate) {
        self.updates.push(update);
    }
}

/// Cancels the run from inside the first accepted update.
struct CancelOnAccept<'a> {
    stop: &'a AtomicBool,
    updates: Vec<UpdateStage>,
}

impl FitObserver for CancelOnAccept<'_> {
    fn on_progress(&mut self, _percent: u32) {}

    fn on_update(&mut self, update: FitUpdate) {
        if update.stage == UpdateStage::Accepted {
            self.stop.store(true, std::sync::atomic::Ordering::SeqCst);
        }
        self.updates.push(update.stage);
    }
}

#[test]
fn test_perfect_fit_converges() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(30, 4.0));
    let report = LevenbergMarquardt::new()
        .with_mse_tolerance(1e-10)
        .minimize(&PowerLawModel, &power_law_start(1.0, 0.4), &data)
        .unwrap();

    assert_eq!(report.status, FitStatus::Converged);
    assert!(report.iterations <= 50);
    assert_relative_eq!(report.params.get("a").unwrap(), 2.0, max_relative = 0.05);
    assert_relative_eq!(report.params.get("b").unwrap(), 0.5, max_relative = 0.05);
}

#[test]
fn test_noisy_fit_stays_close() {
    let data = noisy(
        &PowerLawModel,
        &[("a", 5.0), ("b", 0.8)],
        log_times(40, 3.0),
        0.02,
        7,
    );
    let report = LevenbergMarquardt::new()
        .with_mse_tolerance(1e-9)
        .minimize(&PowerLawModel, &power_law_start(2.0, 0.5), &data)
        .unwrap();

    assert!(matches!(report.status, FitStatus::Exhausted(_)));
    assert_relative_eq!(report.params.get("a").unwrap(), 5.0, max_relative = 0.05);
    assert_relative_eq!(report.params.get("b").unwrap(), 0.8, max_relative = 0.05);
}

#[test]
fn test_radial_example_decreases_error_within_bounds() {
    let time = Array1::from_vec(vec![1.0, 2.0, 4.0, 8.0]);
    let primary = Array1::from_vec(vec![0.5, 0.8, 1.1, 1.4]);
    let data = ObservedData::new(time, primary.clone(), primary).unwrap();

    let mut set = ParameterSet::new();
    set.add_fitted("k", 1.0, 0.01, 100.0).unwrap();

    let report = LevenbergMarquardt::new()
        .with_weight(1.0)
        .minimize(&RadialModel, &set, &data)
        .unwrap();

    let k = report.params.get("k").unwrap();
    assert!((0.01..=100.0).contains(&k));
    assert!(report.error_trace.len() >= 2);
    assert!(report.error_trace.last().unwrap() < report.error_trace.first().unwrap());
    assert!(k > 1.0);
}

#[test]
fn test_accepted_updates_monotone_bounded_and_consistent() {
    let data = synthetic(&FractureModel, &[("a", 2.0), ("LfD", 0.1)], log_times(25, 3.0));

    let mut set = ParameterSet::from_defaults(&[("Lf", 50.0)]).unwrap();
    set.add(Parameter::with_bounds("a", 1.0, 0.1, 3.0).unwrap().fitted(true))
        .unwrap();
    set.add(Parameter::with_bounds("L", 1000.0, 200.0, 5000.0).unwrap().fitted(true))
        .unwrap();

    let mut observer = Collect::default();
    let stop = AtomicBool::new(false);
    LevenbergMarquardt::new()
        .with_mse_tolerance(1e-8)
        .fit(&FractureModel, &set, &data, &mut observer, &stop)
        .unwrap();

    let accepted: Vec<&FitUpdate> = observer
        .updates
        .iter()
        .filter(|u| u.stage == UpdateStage::Accepted)
        .collect();
    assert!(!accepted.is_empty());

    let mut previous = observer.updates[0].mse;
    for update in &accepted {
        assert!(update.mse < previous);
        previous = update.mse;

        let a = update.params.get("a").unwrap();
        let l = update.params.get("L").unwrap();
        assert!((0.1..=3.0).contains(&a));
        assert!((200.0..=5000.0).contains(&l));
    }

    for update in &observer.updates {
        let expected = update.params.get("Lf").unwrap() / update.params.get("L").unwrap();
        assert_eq!(update.params.get("LfD"), Some(expected));
    }
}

#[test]
fn test_no_free_parameters_is_a_no_op() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(10, 2.0));
    let set = ParameterSet::from_defaults(&[("a", 1.3), ("b", 0.7), ("L", 800.0), ("Lf", 20.0)])
        .unwrap();

    let mut observer = Collect::default();
    let stop = AtomicBool::new(false);
    let report = LevenbergMarquardt::new()
        .fit(&PowerLawModel, &set, &data, &mut observer, &stop)
        .unwrap();

    assert_eq!(report.status, FitStatus::NoFreeParameters);
    assert_eq!(report.iterations, 0);
    assert!(observer.updates.is_empty());
    assert!(observer.progress.is_empty());
    for param in set.iter() {
        let value = report.params.get(param.name()).unwrap();
        assert_eq!(value.to_bits(), param.value().to_bits());
    }
}

#[test]
fn test_constant_model_exhausts_damping() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(10, 2.0));
    let set = power_law_start(1.0, 1.0);

    let report = LevenbergMarquardt::new()
        .minimize(&ConstantModel(100.0), &set, &data)
        .unwrap();

    // five rejections per iteration: 0.01 -> 1e3 -> 1e8 -> 1e13
    assert_eq!(report.status, FitStatus::Exhausted(Exhaustion::DampingLimit));
    assert_eq!(report.iterations, 3);
    assert_eq!(report.error_trace.len(), 1);
    assert_eq!(report.params, set.to_map());
}

#[test]
fn test_unsolvable_damped_system_exhausts_damping() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(10, 2.0));
    let set = power_law_start(1.0, 0.4);

    let report = LevenbergMarquardt::new()
        .minimize(&OverflowingModel, &set, &data)
        .unwrap();

    // the forward a-column is infinite, so every damped solve fails
    assert_eq!(report.status, FitStatus::Exhausted(Exhaustion::DampingLimit));
    assert_eq!(report.iterations, 3);
    assert_relative_eq!(report.lambda, 1e13, max_relative = 1e-9);
    assert_eq!(report.error_trace.len(), 1);
    assert_eq!(report.params, set.to_map());
    assert!(report.sse.is_finite());
}

#[test]
fn test_iteration_cap_reports_limit() {
    let data = noisy(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(20, 3.0), 0.3, 11);
    let report = LevenbergMarquardt::new()
        .with_max_iterations(1)
        .with_mse_tolerance(1e-12)
        .minimize(&PowerLawModel, &power_law_start(0.1, 2.0), &data)
        .unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(
        report.status,
        FitStatus::Exhausted(Exhaustion::IterationLimit)
    );
}

#[test]
fn test_cancellation_observed_at_next_iteration() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(20, 3.0));
    let stop = AtomicBool::new(false);
    let mut observer = CancelOnAccept {
        stop: &stop,
        updates: Vec::new(),
    };

    let report = LevenbergMarquardt::new()
        .with_mse_tolerance(1e-12)
        .fit(&PowerLawModel, &power_law_start(0.5, 1.5), &data, &mut observer, &stop)
        .unwrap();

    assert_eq!(report.status, FitStatus::Cancelled);
    assert_eq!(report.iterations, 1);
    assert_eq!(
        observer.updates,
        vec![UpdateStage::Initial, UpdateStage::Accepted, UpdateStage::Final]
    );
}

#[test]
fn test_cancellation_wins_over_iteration_cap() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(20, 3.0));
    let stop = AtomicBool::new(false);
    let mut observer = CancelOnAccept {
        stop: &stop,
        updates: Vec::new(),
    };

    let report = LevenbergMarquardt::new()
        .with_max_iterations(1)
        .with_mse_tolerance(1e-12)
        .fit(&PowerLawModel, &power_law_start(0.5, 1.5), &data, &mut observer, &stop)
        .unwrap();

    assert_eq!(report.iterations, 1);
    assert_eq!(report.status, FitStatus::Cancelled);
}

#[test]
fn test_precision_restored_on_success() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(15, 2.0));
    let recorder = PrecisionRecorder::new(None);

    LevenbergMarquardt::new()
        .minimize(&recorder, &power_law_start(1.0, 0.4), &data)
        .unwrap();

    let switches = recorder.switches.lock().unwrap();
    assert_eq!(switches.first(), Some(&false));
    assert_eq!(switches.last(), Some(&true));

    // every evaluation but the final curve runs in low precision
    let evaluations = recorder.evaluations.lock().unwrap();
    assert_eq!(evaluations.last(), Some(&true));
    assert!(evaluations[..evaluations.len() - 1].iter().all(|high| !high));
}

#[test]
fn test_precision_restored_on_error() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(15, 2.0));
    let recorder = PrecisionRecorder::new(Some(2));

    let result = LevenbergMarquardt::new().minimize(&recorder, &power_law_start(1.0, 0.4), &data);

    assert!(matches!(result, Err(FitError::ModelEvaluation(_))));
    assert_eq!(*recorder.switches.lock().unwrap(), vec![false, true]);
}

#[test]
fn test_parallel_jacobian_matches_sequential() {
    let data = synthetic(&PowerLawModel, &[("a", 2.0), ("b", 0.5)], log_times(20, 3.0));
    let start = power_law_start(1.0, 0.3);
    let config = FitConfig {
        mse_tolerance: 1e-10,
        ..FitConfig::default()
    };

    let sequential = LevenbergMarquardt::with_config(config.clone())
        .minimize(&ReentrantPowerLaw, &start, &data)
        .unwrap();
    let parallel = LevenbergMarquardt::with_config(config)
        .with_parallel_jacobian(true)
        .minimize(&ReentrantPowerLaw, &start, &data)
        .unwrap();

    assert_eq!(sequential.params, parallel.params);
    assert_eq!(sequential.error_trace, parallel.error_trace);
}

#[test]
fn test_fitted_derived_target_rejected() {
    let data = synthetic(&FractureModel, &[("a", 2.0), ("LfD", 0.1)], log_times(10, 2.0));
    let mut set =
        ParameterSet::from_defaults(&[("a", 1.0), ("L", 500.0), ("Lf", 50.0), ("LfD", 0.1)])
            .unwrap();
    set.set_fit("LfD", true).unwrap();

    let result = LevenbergMarquardt::new().minimize(&FractureModel, &set, &data);
    assert!(matches!(result, Err(FitError::DerivedParameterFit(_))));
}
