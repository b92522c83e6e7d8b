//! stiffgrid-driver — the per-step balancing state machine.
//!
//! Ties the other crates together: the profiler measures, the planner
//! decides, the transport moves items, the chemistry solves them, and the
//! driver merges results back into the owned cells.
//!
//! # Architecture
//!
//! ```text
//! BalancingDriver<M: Messenger, S: SolveStrategy>
//!   ├── CostProfiler (per-phase cost of this batch)
//!   ├── cached GlobalPlan (refreshed every max_iter_update steps)
//!   ├── TransferSession (one per batch, borrowed from M)
//!   └── SolveStrategy
//!       ├── PlainStrategy (integrate every item)
//!       └── TdacStrategy (local/remote tables, reduction, integrate)
//! ```

pub mod driver;
pub mod error;
pub mod partition;
pub mod plain;
pub mod strategy;
pub mod tdac;

pub use driver::{BalancingDriver, DriverState, StepReport};
pub use error::{DriverError, DriverResult};
pub use partition::cells_to_send;
pub use plain::PlainStrategy;
pub use strategy::{ItemStatus, Prepared, SolveStrategy, TableSummary, integrate_item};
pub use tdac::TdacStrategy;
