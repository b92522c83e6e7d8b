//! Plan validation errors.
//!
//! A plan that fails validation means the planner itself is wrong; the
//! driver treats every variant as fatal.

use stiff_core::ProcessId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("send fraction {amount} to process {target} is outside [0, 1]")]
    FractionOutOfRange { target: ProcessId, amount: f64 },

    #[error("negative cost budget {amount} for process {target}")]
    NegativeBudget { target: ProcessId, amount: f64 },

    #[error("plan names unknown process {process} (group size {n_processes})")]
    UnknownProcess {
        process: ProcessId,
        n_processes: usize,
    },

    #[error("process {0} is planned to exchange work with itself")]
    SelfTransfer(ProcessId),
}

pub type PlanResult<T> = Result<T, PlanError>;
