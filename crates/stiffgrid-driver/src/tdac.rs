//! Tabulation strategy (TDAC): table lookup, reduction, integration, insert.
//!
//! Before balancing, the owner looks every cell up in its local table.
//! Hits are settled on the spot; misses are reduced and become the only
//! migration candidates. Results solved for another process go to a
//! separate remote table, whose entries get their reduced mechanism
//! recomputed here. Returned results are tabulated locally by their owner.

use stiff_core::{
    AmountPolicy, CostBreakdown, Phase, ProcessId, TabulationConfig, TdacWorkItem, WorkItem,
};
use stiffgrid_chemistry::{ChemistrySolver, InsertKind, IsatTable, Reducer, TableHit, Tabulation};
use stiffgrid_profiler::CostProfiler;
use tracing::debug;

use crate::error::DriverResult;
use crate::strategy::{ItemStatus, Prepared, SolveStrategy, TableSummary, integrate_item};

pub struct TdacStrategy {
    solver: Box<dyn ChemistrySolver>,
    reducer: Reducer,
    local: IsatTable,
    remote: IsatTable,
    delta_t_chem_max: f64,
}

impl TdacStrategy {
    pub fn new(
        process: ProcessId,
        solver: Box<dyn ChemistrySolver>,
        tabulation: &TabulationConfig,
        delta_t_chem_max: f64,
    ) -> Self {
        let n_species = solver.n_species();
        Self {
            solver,
            reducer: Reducer::new(tabulation.reduction_tolerance),
            local: IsatTable::new(process, n_species, tabulation),
            remote: IsatTable::new(process, n_species, tabulation),
            delta_t_chem_max,
        }
    }

    pub fn local_table(&self) -> &IsatTable {
        &self.local
    }

    pub fn remote_table(&self) -> &IsatTable {
        &self.remote
    }
}

fn insert_phase(kind: InsertKind) -> Phase {
    match kind {
        InsertKind::Grew => Phase::Grow,
        InsertKind::AddedLeaf => Phase::AddLeaf,
        InsertKind::Refreshed => Phase::AddToTable,
    }
}

/// Apply a retrieved result and derive rates from the change it implies.
fn settle_hit(item: &mut TdacWorkItem, hit: &TableHit) {
    hit.apply(item);
    let base = &mut item.base;
    for ((rr, new), old) in base.rr.iter_mut().zip(&base.y).zip(&item.phi_q) {
        *rr = base.rho * (new - old) / base.delta_t;
    }
    base.failed = false;
}

/// Time `f` under `phase`, charging it to both the profiler and the item.
fn charge<R>(
    profiler: &mut CostProfiler,
    item: &mut TdacWorkItem,
    phase: Phase,
    f: impl FnOnce(&mut TdacWorkItem) -> R,
) -> R {
    let start = profiler.start();
    let out = f(item);
    let elapsed = profiler.measure(start);
    profiler.record(phase, elapsed);
    item.breakdown.add(phase, elapsed);
    out
}

/// Time a table insert and charge it under the phase of its outcome.
fn tabulate(
    profiler: &mut CostProfiler,
    table: &mut IsatTable,
    item: &mut TdacWorkItem,
    is_local: bool,
) -> DriverResult<()> {
    let start = profiler.start();
    let outcome = table.insert(item, is_local, !is_local)?;
    let elapsed = profiler.measure(start);
    let phase = insert_phase(outcome.kind);
    profiler.record(phase, elapsed);
    item.breakdown.add(phase, elapsed);
    Ok(())
}

impl SolveStrategy for TdacStrategy {
    type Item = TdacWorkItem;

    fn name(&self) -> &'static str {
        "tdac"
    }

    fn n_species(&self) -> usize {
        self.solver.n_species()
    }

    fn default_policy(&self) -> AmountPolicy {
        AmountPolicy::CostBudget
    }

    fn prepare(
        &mut self,
        process: ProcessId,
        items: Vec<WorkItem>,
        profiler: &mut CostProfiler,
    ) -> DriverResult<Prepared<TdacWorkItem>> {
        let mut candidates = Vec::new();
        let mut settled = Vec::new();

        for base in items {
            let mut item = TdacWorkItem::new(base);

            let local = &mut self.local;
            let hit = charge(profiler, &mut item, Phase::Search, |it| local.lookup(it));
            if let Some(hit) = hit {
                settle_hit(&mut item, &hit);
                item.base.cost = item.breakdown.total();
                settled.push(item);
                continue;
            }

            let (solver, reducer) = (self.solver.as_ref(), self.reducer);
            charge(profiler, &mut item, Phase::Reduce, |it| {
                let rates = solver.production_rates(&it.base.chem_state());
                reducer.reduce(it, process, &rates);
            });
            candidates.push(item);
        }

        debug!(
            process,
            retrieved = settled.len(),
            candidates = candidates.len(),
            "local table search complete"
        );
        Ok(Prepared {
            candidates,
            settled,
        })
    }

    fn solve_item(
        &mut self,
        process: ProcessId,
        item: &mut TdacWorkItem,
        profiler: &mut CostProfiler,
    ) -> DriverResult<ItemStatus> {
        let is_local = item.base.owner == process;

        if !is_local {
            let remote = &mut self.remote;
            let hit = charge(profiler, item, Phase::Search, |it| remote.lookup(it));
            if let Some(hit) = hit {
                settle_hit(item, &hit);
                item.base.cost = item.breakdown.total();
                return Ok(ItemStatus::Retrieved);
            }
        }

        let (solver, max) = (self.solver.as_ref(), self.delta_t_chem_max);
        let status = charge(profiler, item, Phase::Integrate, |it| {
            integrate_item(solver, &mut it.base, max)
        });

        if status == ItemStatus::Integrated {
            let table = if is_local { &mut self.local } else { &mut self.remote };
            tabulate(profiler, table, item, is_local)?;
        }
        item.base.cost = item.breakdown.total();
        Ok(status)
    }

    fn on_returned(
        &mut self,
        _process: ProcessId,
        item: &mut TdacWorkItem,
        profiler: &mut CostProfiler,
    ) -> DriverResult<()> {
        if item.base.failed || item.retrieved {
            return Ok(());
        }
        tabulate(profiler, &mut self.local, item, true)?;
        item.base.cost = item.breakdown.total();
        Ok(())
    }

    fn breakdown(&self, item: &TdacWorkItem) -> CostBreakdown {
        item.breakdown
    }

    fn table_summary(&self) -> Option<TableSummary> {
        Some(TableSummary {
            local: self.local.stats(),
            remote: self.remote.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stiff_core::{CellState, SolverConfig, SolverKind};
    use stiffgrid_chemistry::{MechanismSpec, SolverRegistry, TableError};

    use crate::error::DriverError;

    fn strategy(process: ProcessId) -> TdacStrategy {
        let config = SolverConfig {
            kind: SolverKind::EulerImplicit,
            ..SolverConfig::default()
        };
        let solver = SolverRegistry::with_builtins()
            .create(&MechanismSpec::reference(4), &config)
            .unwrap();
        TdacStrategy::new(process, solver, &TabulationConfig::default(), f64::MAX)
    }

    fn snapshot(owner: ProcessId, cell: usize) -> WorkItem {
        let state = CellState::new(vec![0.7, 0.2, 0.1, 0.0], 1800.0, 101_325.0, 1.1, 1e-7);
        WorkItem::from_cell(owner, cell, &state, 1e-6, 0.0)
    }

    #[test]
    fn misses_are_reduced_on_the_owner() {
        let mut s = strategy(0);
        let mut profiler = CostProfiler::monotonic();

        let prepared = s.prepare(0, vec![snapshot(0, 0)], &mut profiler).unwrap();
        assert!(prepared.settled.is_empty());
        assert_eq!(prepared.candidates.len(), 1);
        assert_eq!(prepared.candidates[0].reduced_on, Some(0));
        assert_eq!(s.local_table().stats().lookups, 1);
    }

    #[test]
    fn solved_cells_are_retrieved_next_time() {
        let mut s = strategy(0);
        let mut profiler = CostProfiler::monotonic();

        let mut prepared = s.prepare(0, vec![snapshot(0, 0)], &mut profiler).unwrap();
        let mut item = prepared.candidates.remove(0);
        let status = s.solve_item(0, &mut item, &mut profiler).unwrap();
        assert_eq!(status, ItemStatus::Integrated);
        assert_eq!(s.local_table().len(), 1);

        let again = s.prepare(0, vec![snapshot(0, 0)], &mut profiler).unwrap();
        assert_eq!(again.settled.len(), 1);
        let hit = &again.settled[0];
        assert!(hit.retrieved);
        assert_eq!(hit.base.y, item.base.y);
        assert_eq!(hit.base.rr, item.base.rr);
    }

    #[test]
    fn foreign_items_use_the_remote_table() {
        let mut owner = strategy(0);
        let mut helper = strategy(1);
        let mut profiler = CostProfiler::monotonic();

        let mut prepared = owner.prepare(0, vec![snapshot(0, 5)], &mut profiler).unwrap();
        let mut item = prepared.candidates.remove(0);
        item.base.local = false;

        helper.solve_item(1, &mut item, &mut profiler).unwrap();
        assert_eq!(helper.remote_table().len(), 1);
        assert!(helper.local_table().is_empty());
        assert_eq!(item.reduced_on, Some(0));

        owner.on_returned(0, &mut item, &mut profiler).unwrap();
        assert_eq!(owner.local_table().len(), 1);
    }

    #[test]
    fn mask_from_elsewhere_is_refused_by_the_local_table() {
        let mut s = strategy(0);
        let mut profiler = CostProfiler::monotonic();

        let mut item = TdacWorkItem::new(snapshot(0, 2));
        item.reduced_on = Some(3);
        let err = s.on_returned(0, &mut item, &mut profiler).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Table(TableError::StaleReducedMechanism { table_owner: 0, .. })
        ));
    }
}
