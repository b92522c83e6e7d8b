//! Chemistry error types.

use stiff_core::{CellId, ProcessId, SolverKind, ThermoKind};
use thiserror::Error;

/// A single cell's integration could not be completed.
///
/// Local to the cell: the driver keeps the cell's previous state and
/// carries on with the batch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("non-finite value for species {species}")]
    NonFinite { species: usize },

    #[error("no convergence within {steps} internal steps")]
    MaxSteps { steps: u32 },

    #[error("step size underflow ({h:e} s)")]
    StepUnderflow { h: f64 },

    #[error("invalid step size {0:e}")]
    InvalidStep(f64),

    #[error("state has {found} species, mechanism has {expected}")]
    SpeciesMismatch { expected: usize, found: usize },
}

/// Tabulation refused an operation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error(
        "cell {cell} of process {owner} was reduced on {reduced_on:?}, not on table owner {table_owner}"
    )]
    StaleReducedMechanism {
        owner: ProcessId,
        cell: CellId,
        reduced_on: Option<ProcessId>,
        table_owner: ProcessId,
    },

    #[error("cell {cell} of process {owner} failed integration and cannot be tabulated")]
    FailedItem { owner: ProcessId, cell: CellId },

    #[error("table expects {expected} species, item has {found}")]
    SpeciesMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("no solver registered for ({solver:?}, {thermo:?})")]
    NotRegistered {
        solver: SolverKind,
        thermo: ThermoKind,
    },
}
