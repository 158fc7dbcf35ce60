//! Terminal states of a fitting run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run stopped without reaching the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exhaustion {
    /// The outer iteration cap was reached.
    IterationLimit,

    /// No trial step was accepted and the damping factor passed its ceiling.
    DampingLimit,
}

/// Final status of a fitting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// The mean squared residual fell below the tolerance.
    Converged,

    /// The run gave up; the best parameters found are kept.
    Exhausted(Exhaustion),

    /// The stop flag was observed; the best parameters found are kept.
    Cancelled,

    /// No parameter was marked for fitting; nothing was evaluated.
    NoFreeParameters,
}

impl FitStatus {
    /// Returns true if the run met the tolerance.
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }

    /// Returns a description of the status.
    pub fn description(&self) -> String {
        match self {
            FitStatus::Converged => "Converged: mean squared residual below tolerance".to_string(),
            FitStatus::Exhausted(Exhaustion::IterationLimit) => {
                "Terminated: maximum iterations reached".to_string()
            }
            FitStatus::Exhausted(Exhaustion::DampingLimit) => {
                "Terminated: damping factor exceeded its limit".to_string()
            }
            FitStatus::Cancelled => "Cancelled by request".to_string(),
            FitStatus::NoFreeParameters => "Nothing to fit: no parameter is enabled".to_string(),
        }
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
