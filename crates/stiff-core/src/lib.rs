//! stiff-core — shared types for the stiffgrid chemistry load balancer.
//!
//! Every other stiffgrid crate builds on the types defined here:
//!
//! - **`types`** — process/cell identifiers, owned cell state, chemical state
//! - **`work_item`** — the serializable unit of migration (plain and TDAC)
//! - **`cost`** — profiling phases and per-phase cost breakdowns
//! - **`config`** — `BalanceConfig` parsed from TOML

pub mod config;
pub mod cost;
pub mod error;
pub mod types;
pub mod work_item;

pub use config::{
    AmountPolicy, BalanceConfig, SolverConfig, SolverKind, TabulationConfig, ThermoKind, Variant,
};
pub use cost::{CostBreakdown, Phase};
pub use error::{ConfigError, ConfigResult, FieldError};
pub use types::*;
pub use work_item::{Balanced, TdacWorkItem, WorkItem};
