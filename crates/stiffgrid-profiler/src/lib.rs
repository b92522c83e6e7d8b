//! stiffgrid-profiler — wall-clock cost measurement.
//!
//! The balancer ranks processes by how long their chemistry took. This
//! crate provides the clock capability and a lightweight profiler that
//! accumulates per-phase costs for one batch.
//!
//! - **`clock`** — `Clock` trait, monotonic and manually driven clocks
//! - **`profiler`** — `CostProfiler` with scoped phase timers

pub mod clock;
pub mod profiler;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use profiler::{CostProfiler, Stamp};
