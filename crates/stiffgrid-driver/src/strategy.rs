//! Solve strategies — what an item is and how one item gets solved.
//!
//! The driver owns the protocol (planning, transfer, merge). A strategy
//! owns the chemistry: how owned cells become work items, which of them
//! are worth migrating, and what solving one item means.

use stiff_core::{AmountPolicy, Balanced, CostBreakdown, ProcessId, WorkItem};
use stiffgrid_chemistry::{ChemistrySolver, IntegrationError, TableStats};
use stiffgrid_profiler::CostProfiler;
use tracing::warn;

use crate::error::DriverResult;

/// Outcome of solving one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Integrated,
    /// Result came out of a table.
    Retrieved,
    /// Integration failed; the previous state was kept.
    Failed,
}

/// Items of one step after the strategy has looked at them.
pub struct Prepared<T> {
    /// Items that still need solving and may migrate, in cell order.
    pub candidates: Vec<T>,
    /// Items already solved on the owner.
    pub settled: Vec<T>,
}

/// Tabulation counters of a strategy that keeps tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub local: TableStats,
    pub remote: TableStats,
}

pub trait SolveStrategy: Send {
    type Item: Balanced;

    fn name(&self) -> &'static str;

    /// Species count of the mechanism behind the solver.
    fn n_species(&self) -> usize;

    /// How transfer amounts are expressed when the config does not say.
    fn default_policy(&self) -> AmountPolicy;

    /// Turn this step's owned snapshots into items.
    fn prepare(
        &mut self,
        process: ProcessId,
        items: Vec<WorkItem>,
        profiler: &mut CostProfiler,
    ) -> DriverResult<Prepared<Self::Item>>;

    /// Solve one item of the local batch, owned or foreign.
    fn solve_item(
        &mut self,
        process: ProcessId,
        item: &mut Self::Item,
        profiler: &mut CostProfiler,
    ) -> DriverResult<ItemStatus>;

    /// An owned item came back from the process that solved it.
    fn on_returned(
        &mut self,
        _process: ProcessId,
        _item: &mut Self::Item,
        _profiler: &mut CostProfiler,
    ) -> DriverResult<()> {
        Ok(())
    }

    /// Per-phase cost charged to one item.
    fn breakdown(&self, _item: &Self::Item) -> CostBreakdown {
        CostBreakdown::default()
    }

    fn table_summary(&self) -> Option<TableSummary> {
        None
    }
}

// ── Shared integration ─────────────────────────────────────────────

/// Advance one item over its macro step with adaptive sub-steps.
///
/// On success `y`, `rr` and `delta_t_chem` hold the solved values. On
/// failure the item keeps its previous composition, its rates are zeroed
/// and `failed` is set.
pub fn integrate_item(
    solver: &dyn ChemistrySolver,
    item: &mut WorkItem,
    delta_t_chem_max: f64,
) -> ItemStatus {
    match advance(solver, item, delta_t_chem_max) {
        Ok((y, sub_delta_t)) => {
            let delta_t = item.delta_t;
            for ((rr, new), old) in item.rr.iter_mut().zip(&y).zip(&item.y) {
                *rr = item.rho * (new - old) / delta_t;
            }
            item.y = y;
            item.delta_t_chem = sub_delta_t.min(delta_t_chem_max);
            item.failed = false;
            ItemStatus::Integrated
        }
        Err(error) => {
            warn!(
                owner = item.owner,
                cell = item.cell,
                %error,
                "integration failed, keeping previous state"
            );
            item.rr.iter_mut().for_each(|r| *r = 0.0);
            item.failed = true;
            ItemStatus::Failed
        }
    }
}

/// Sub-stepping loop. Returns the new composition and the last
/// recommended sub-step.
fn advance(
    solver: &dyn ChemistrySolver,
    item: &WorkItem,
    delta_t_chem_max: f64,
) -> Result<(Vec<f64>, f64), IntegrationError> {
    let delta_t = item.delta_t;
    if !(delta_t.is_finite() && delta_t > 0.0) {
        return Err(IntegrationError::InvalidStep(delta_t));
    }

    let mut state = item.chem_state();
    let mut sub_delta_t = item.delta_t_chem.min(delta_t_chem_max);
    if !(sub_delta_t.is_finite() && sub_delta_t > 0.0) {
        sub_delta_t = delta_t;
    }

    let mut time_left = delta_t;
    while time_left > 0.0 {
        let dt = sub_delta_t.min(time_left);
        sub_delta_t = solver.step(&mut state, dt, sub_delta_t)?;
        if !(sub_delta_t.is_finite() && sub_delta_t > 0.0) {
            return Err(IntegrationError::InvalidStep(sub_delta_t));
        }
        sub_delta_t = sub_delta_t.min(delta_t_chem_max);
        time_left -= dt;
    }
    Ok((state.y, sub_delta_t))
}
