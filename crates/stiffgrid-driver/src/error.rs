//! Driver error types.

use stiff_core::{CellId, ProcessId};
use thiserror::Error;

/// Errors that abort a balanced step.
///
/// Per-cell integration failures are not errors at this level; they are
/// absorbed and counted in the step report.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("transport error: {0}")]
    Transport(#[from] stiffgrid_transport::TransportError),

    #[error("invalid plan: {0}")]
    Plan(#[from] stiffgrid_planner::PlanError),

    #[error("tabulation error: {0}")]
    Table(#[from] stiffgrid_chemistry::TableError),

    #[error("solver registry error: {0}")]
    Registry(#[from] stiffgrid_chemistry::RegistryError),

    #[error("work item codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("conservation violated on process {process}: {reason}")]
    Conservation { process: ProcessId, reason: String },

    #[error("cell {cell} out of range for a field of {n_cells} cells")]
    UnknownCell { cell: CellId, n_cells: usize },

    #[error("field has {found} species, solver expects {expected}")]
    SpeciesMismatch { expected: usize, found: usize },

    #[error("macro time step field covers {found} cells, field has {expected}")]
    DeltaTLength { expected: usize, found: usize },
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub(crate) fn conservation(process: ProcessId, reason: impl Into<String>) -> Self {
        Self::Conservation {
            process,
            reason: reason.into(),
        }
    }
}
