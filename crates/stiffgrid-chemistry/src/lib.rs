//! stiffgrid-chemistry — the chemistry side of the balancer.
//!
//! The balancer treats integration and tabulation as collaborators behind
//! traits. This crate defines those traits and ships reference
//! implementations so a balancing run is self-contained.
//!
//! # Components
//!
//! - **`mechanism`** — reference decay-chain mechanism and rate models
//! - **`solver`** — `ChemistrySolver` trait (one sub-step of one cell)
//! - **`solvers`** — `NoChemistry`, `EulerImplicit`, `Ode`
//! - **`registry`** — factory keyed by (solver kind, thermo kind)
//! - **`reduction`** — active-species selection for the reduced mechanism
//! - **`tabulation`** — `Tabulation` trait and the in-memory `IsatTable`

pub mod error;
pub mod mechanism;
pub mod reduction;
pub mod registry;
pub mod solver;
pub mod solvers;
pub mod tabulation;

pub use error::{IntegrationError, RegistryError, TableError};
pub use mechanism::{ArrheniusRates, ConstantRates, MechanismSpec, RateModel};
pub use reduction::Reducer;
pub use registry::{SolverFactory, SolverRegistry};
pub use solver::ChemistrySolver;
pub use solvers::{EulerImplicit, NoChemistry, Ode};
pub use tabulation::{InsertKind, InsertOutcome, IsatTable, TableHit, TableStats, Tabulation};
