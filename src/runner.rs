//! Background execution of a fit.
//!
//! [`FitRunner::start`] moves a private copy of the parameters onto a worker
//! thread and returns a [`FitHandle`] at once. Notifications arrive on a
//! channel in the order the driver produced them; the last event of every
//! run is exactly one [`FitEvent::Finished`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use crate::error::{FitError, Result};
use crate::lm::{FitConfig, FitObserver, FitReport, FitUpdate, LevenbergMarquardt};
use crate::model::{ModelEvaluator, ObservedData};
use crate::parameters::ParameterSet;

/// Name of the worker thread.
pub const WORKER_THREAD_NAME: &str = "lm-fit";

/// Notification from a running fit.
#[derive(Debug)]
pub enum FitEvent {
    /// Percentage of the iteration budget used
    Progress(u32),

    /// Initial point, accepted step or final state
    IterationUpdated(FitUpdate),

    /// The run is over; no further events follow
    Finished(Result<FitReport>),
}

struct ChannelObserver {
    tx: Sender<FitEvent>,
}

impl FitObserver for ChannelObserver {
    fn on_progress(&mut self, percent: u32) {
        // the handle may already be gone; the run still finishes
        let _ = self.tx.send(FitEvent::Progress(percent));
    }

    fn on_update(&mut self, update: FitUpdate) {
        let _ = self.tx.send(FitEvent::IterationUpdated(update));
    }
}

/// Clears the runner's active flag when the worker finishes or panics.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Starts fits for one parameter set, at most one at a time.
#[derive(Debug, Clone, Default)]
pub struct FitRunner {
    active: Arc<AtomicBool>,
}

impl FitRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a run started by this runner is still in progress.
    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a fit on a background thread.
    ///
    /// Fails with [`FitError::AlreadyRunning`] if a previous run of this
    /// runner has not finished, and with [`FitError::InvalidInput`] if the
    /// configuration is invalid. Every other failure, a panicking evaluator
    /// included, is delivered as `Finished(Err(..))`.
    pub fn start<E>(
        &self,
        evaluator: Arc<E>,
        params: ParameterSet,
        observed: ObservedData,
        config: FitConfig,
    ) -> Result<FitHandle>
    where
        E: ModelEvaluator + ?Sized + 'static,
    {
        config.validate()?;

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FitError::AlreadyRunning);
        }
        let active = ActiveGuard(Arc::clone(&self.active));

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut observer = ChannelObserver { tx: tx.clone() };
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    LevenbergMarquardt::with_config(config).fit(
                        evaluator.as_ref(),
                        &params,
                        &observed,
                        &mut observer,
                        &worker_stop,
                    )
                }))
                .unwrap_or_else(|payload| {
                    Err(FitError::WorkerPanicked(panic_message(payload.as_ref())))
                });
                if let Err(e) = &result {
                    warn!("fit failed: {}", e);
                }
                // cleared before Finished so the caller may restart on receipt
                drop(active);
                if tx.send(FitEvent::Finished(result)).is_err() {
                    debug!("fit finished after its handle was dropped");
                }
            })?;

        Ok(FitHandle {
            events: rx,
            stop,
            worker: Some(worker),
        })
    }
}

/// Caller's side of a running fit.
pub struct FitHandle {
    events: Receiver<FitEvent>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FitHandle {
    /// Ask the worker to stop at the start of its next iteration.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the worker thread is still running.
    pub fn is_active(&self) -> bool {
        self.worker
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    /// Next event if one is ready.
    ///
    /// Returns [`FitError::WorkerDisconnected`] once the run is over and all
    /// events have been read.
    pub fn try_next(&self) -> Result<Option<FitEvent>> {
        match self.events.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(FitError::WorkerDisconnected),
        }
    }

    /// Block until the next event arrives.
    ///
    /// Returns [`FitError::WorkerDisconnected`] once the run is over and all
    /// events have been read.
    pub fn next_event(&self) -> Result<FitEvent> {
        self.events.recv().map_err(|_| FitError::WorkerDisconnected)
    }

    /// Forward every remaining event to `on_event` and return the outcome of
    /// the run.
    pub fn wait<F>(mut self, mut on_event: F) -> Result<FitReport>
    where
        F: FnMut(&FitEvent),
    {
        loop {
            let event = self.next_event()?;
            on_event(&event);
            if let FitEvent::Finished(result) = event {
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        warn!("fit worker panicked after finishing");
                    }
                }
                return result;
            }
        }
    }
}
