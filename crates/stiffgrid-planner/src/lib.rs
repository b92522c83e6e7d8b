//! stiffgrid-planner — decides which process sends how much work to whom.
//!
//! Every process runs the planner over the same gathered cost report, so
//! every process arrives at the same plan without negotiating. The planner
//! never moves data itself; the driver applies the plan.
//!
//! # Components
//!
//! - **`report`** — per-process `CostReport` and the deterministic ranking
//! - **`planner`** — two-pointer greedy `compute_plan` and the plan types
//! - **`error`** — plan validation errors

pub mod error;
pub mod planner;
pub mod report;

pub use error::{PlanError, PlanResult};
pub use planner::{GlobalPlan, SendEntry, Transfer, TransferPlan, compute_plan};
pub use report::{CostReport, rank_by_cost};
