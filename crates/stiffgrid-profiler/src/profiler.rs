//! Cost profiler — accumulates per-phase wall-clock cost for one batch.
//!
//! The profiler only reads a clock and adds floats, so wrapping it around
//! a cell's integration does not perturb the measured cost.

use std::sync::Arc;

use stiff_core::{CostBreakdown, Phase};
use tracing::debug;

use crate::clock::{Clock, MonotonicClock};

/// A point in time taken from the profiler's clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Stamp(f64);

/// Running per-phase cost totals of one process.
pub struct CostProfiler {
    clock: Arc<dyn Clock>,
    totals: CostBreakdown,
    /// Number of recorded measurements since the last reset.
    samples: u64,
}

impl CostProfiler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            totals: CostBreakdown::default(),
            samples: 0,
        }
    }

    /// Profiler on the wall clock.
    pub fn monotonic() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }

    pub fn start(&self) -> Stamp {
        Stamp(self.clock.now())
    }

    /// Seconds elapsed since `start`.
    pub fn measure(&self, start: Stamp) -> f64 {
        (self.clock.now() - start.0).max(0.0)
    }

    /// Add a measurement to the running totals.
    pub fn record(&mut self, phase: Phase, seconds: f64) {
        self.totals.add(phase, seconds);
        self.samples += 1;
    }

    /// Run `f`, recording its elapsed time under `phase`.
    ///
    /// Returns the closure's output together with the elapsed seconds so the
    /// caller can also charge the cost to an individual work item.
    pub fn time<R>(&mut self, phase: Phase, f: impl FnOnce() -> R) -> (R, f64) {
        let start = self.start();
        let out = f();
        let elapsed = self.measure(start);
        self.record(phase, elapsed);
        (out, elapsed)
    }

    pub fn totals(&self) -> CostBreakdown {
        self.totals
    }

    pub fn total(&self) -> f64 {
        self.totals.total()
    }

    /// Clear the totals at the start of a new batch.
    pub fn reset(&mut self) {
        debug!(
            samples = self.samples,
            total = self.totals.total(),
            "profiler reset"
        );
        self.totals = CostBreakdown::default();
        self.samples = 0;
    }
}
