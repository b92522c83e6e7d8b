//! Plain strategy: every owned cell is integrated, wherever it ends up.

use stiff_core::{AmountPolicy, Phase, ProcessId, WorkItem};
use stiffgrid_chemistry::ChemistrySolver;
use stiffgrid_profiler::CostProfiler;

use crate::error::DriverResult;
use crate::strategy::{ItemStatus, Prepared, SolveStrategy, integrate_item};

pub struct PlainStrategy {
    solver: Box<dyn ChemistrySolver>,
    delta_t_chem_max: f64,
}

impl PlainStrategy {
    pub fn new(solver: Box<dyn ChemistrySolver>, delta_t_chem_max: f64) -> Self {
        Self {
            solver,
            delta_t_chem_max,
        }
    }
}

impl SolveStrategy for PlainStrategy {
    type Item = WorkItem;

    fn name(&self) -> &'static str {
        "plain"
    }

    fn n_species(&self) -> usize {
        self.solver.n_species()
    }

    fn default_policy(&self) -> AmountPolicy {
        AmountPolicy::FractionOfCells
    }

    fn prepare(
        &mut self,
        _process: ProcessId,
        items: Vec<WorkItem>,
        _profiler: &mut CostProfiler,
    ) -> DriverResult<Prepared<WorkItem>> {
        Ok(Prepared {
            candidates: items,
            settled: Vec::new(),
        })
    }

    fn solve_item(
        &mut self,
        _process: ProcessId,
        item: &mut WorkItem,
        profiler: &mut CostProfiler,
    ) -> DriverResult<ItemStatus> {
        let solver = self.solver.as_ref();
        let max = self.delta_t_chem_max;
        let (status, elapsed) = profiler.time(Phase::Integrate, || integrate_item(solver, item, max));
        item.cost = elapsed;
        Ok(status)
    }
}
