//! Cost reports and the deterministic cost ranking.

use serde::{Deserialize, Serialize};
use stiff_core::{CostBreakdown, ProcessId};

/// What one process measured for its owned cells in the previous batch.
///
/// `cost` covers the owned cells wherever they were solved, so moving work
/// around does not change a process's reported cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub process: ProcessId,
    /// Total cost of the owned cells, seconds.
    pub cost: f64,
    /// Number of owned cells that were candidates for migration.
    pub n_cells: usize,
    /// Per-phase split (tabulation variant only; zero otherwise).
    pub breakdown: CostBreakdown,
}

impl CostReport {
    pub fn new(process: ProcessId, cost: f64, n_cells: usize) -> Self {
        Self {
            process,
            cost,
            n_cells,
            breakdown: CostBreakdown::default(),
        }
    }

    pub fn with_breakdown(mut self, breakdown: CostBreakdown) -> Self {
        self.breakdown = breakdown;
        self
    }

    /// Part of `cost` that follows a cell when it migrates. Table search
    /// and reduction stay with the owner.
    pub fn movable_cost(&self) -> f64 {
        (self.cost - self.breakdown.pinned()).max(0.0)
    }
}

/// Rank reports by cost, most expensive first.
///
/// Ties are broken by process id so the order is total and identical on
/// every process, regardless of the order the reports arrived in.
pub fn rank_by_cost(reports: &[CostReport]) -> Vec<&CostReport> {
    let mut ranked: Vec<&CostReport> = reports.iter().collect();
    ranked.sort_by(|a, b| {
        b.cost
            .total_cmp(&a.cost)
            .then_with(|| a.process.cmp(&b.process))
    });
    ranked
}
