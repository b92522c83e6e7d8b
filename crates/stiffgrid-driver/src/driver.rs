//! Balancing driver — one balanced chemistry step per call.
//!
//! Every process runs the same driver in lockstep. A step walks through:
//!
//! ```text
//! Idle → BuildingWorkItems → Planning | UsingCachedPlan → Sending
//!      → SolvingLocalBatch → Returning → Merging → Idle
//! ```
//!
//! Planning all-gathers the cost reports and recomputes the group plan; it
//! happens on the first step and then every `max_iter_update` steps. In
//! between, the cached plan is reused verbatim.
//!
//! Owned cells are only written during Merging. Everything that was sent
//! away must come back exactly once before that, or the step fails. The
//! step closes with a group minimum of the chemical time scale.

use stiff_core::{
    AmountPolicy, Balanced, BalanceConfig, CellField, CellId, CostBreakdown, DeltaTField,
    ProcessId, WorkItem,
    work_item::{decode_items, encode_items},
};
use stiffgrid_chemistry::{MechanismSpec, SolverRegistry};
use stiffgrid_planner::{CostReport, GlobalPlan, TransferPlan, compute_plan};
use stiffgrid_profiler::CostProfiler;
use stiffgrid_transport::{
    Messenger, SessionStats, Tag, TransferSession, all_gather, all_reduce_min,
};
use tracing::{debug, info, trace};

use crate::error::{DriverError, DriverResult};
use crate::partition::cells_to_send;
use crate::plain::PlainStrategy;
use crate::strategy::{ItemStatus, Prepared, SolveStrategy, TableSummary};
use crate::tdac::TdacStrategy;

/// Where the driver is within a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    BuildingWorkItems,
    Planning,
    UsingCachedPlan,
    Sending,
    SolvingLocalBatch,
    Returning,
    Merging,
}

/// What happened during one step on one process.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Batch number, starting at 1.
    pub step: u64,
    /// True when the plan was recomputed this step.
    pub replanned: bool,
    /// This process's view of the plan used this step.
    pub plan: TransferPlan,
    pub n_cells: usize,
    /// Owned items that were eligible for migration.
    pub candidates: usize,
    /// Owned items sent to other processes.
    pub sent: usize,
    /// Foreign items solved here.
    pub received: usize,
    /// Items solved here by integration.
    pub integrated: usize,
    /// Items solved here from a table, including owner-side hits.
    pub retrieved: usize,
    /// Owned items whose integration failed; they kept their previous state.
    pub failed_items: usize,
    /// Cost of the owned cells, wherever they were solved.
    pub owned_cost: f64,
    /// Cost of the work done on this process.
    pub local_cost: f64,
    /// Per-phase split of `local_cost`.
    pub local_breakdown: CostBreakdown,
    /// Minimum chemical time scale over the cells of every process.
    pub characteristic_time: f64,
    /// Minimum chemical time scale over the owned cells.
    pub local_characteristic_time: f64,
    pub transfer: SessionStats,
    pub tables: Option<TableSummary>,
}

fn transition(state: &mut DriverState, next: DriverState, process: ProcessId) {
    trace!(process, from = ?*state, to = ?next, "driver state");
    *state = next;
}

/// Per-process balancing driver, generic over the transport and the solve
/// strategy.
pub struct BalancingDriver<M: Messenger, S: SolveStrategy> {
    messenger: M,
    strategy: S,
    profiler: CostProfiler,
    config: BalanceConfig,
    policy: AmountPolicy,
    state: DriverState,
    first_step: bool,
    steps_since_plan: u32,
    plan: Option<GlobalPlan>,
    /// Last measured cost per owned cell, used as next step's weights.
    carried_costs: Vec<f64>,
    carried_breakdown: CostBreakdown,
    batch: u64,
    last_report: Option<StepReport>,
}

impl<M: Messenger> BalancingDriver<M, PlainStrategy> {
    /// Driver that integrates every cell, with the solver picked from `registry`.
    pub fn plain(
        messenger: M,
        mechanism: &MechanismSpec,
        registry: &SolverRegistry,
        config: BalanceConfig,
        profiler: CostProfiler,
    ) -> DriverResult<Self> {
        let solver = registry.create(mechanism, &config.solver)?;
        let strategy = PlainStrategy::new(solver, config.delta_t_chem_max);
        Ok(Self::new(messenger, strategy, config, profiler))
    }
}

impl<M: Messenger> BalancingDriver<M, TdacStrategy> {
    /// Driver with tabulation and reduction, with the solver picked from `registry`.
    pub fn tdac(
        messenger: M,
        mechanism: &MechanismSpec,
        registry: &SolverRegistry,
        config: BalanceConfig,
        profiler: CostProfiler,
    ) -> DriverResult<Self> {
        let solver = registry.create(mechanism, &config.solver)?;
        let strategy = TdacStrategy::new(
            messenger.rank(),
            solver,
            &config.tabulation,
            config.delta_t_chem_max,
        );
        Ok(Self::new(messenger, strategy, config, profiler))
    }
}

impl<M: Messenger, S: SolveStrategy> BalancingDriver<M, S> {
    pub fn new(messenger: M, strategy: S, config: BalanceConfig, profiler: CostProfiler) -> Self {
        let policy = config
            .amount_policy
            .unwrap_or_else(|| strategy.default_policy());
        debug!(
            process = messenger.rank(),
            strategy = strategy.name(),
            ?policy,
            max_iter_update = config.max_iter_update,
            "balancing driver created"
        );
        Self {
            messenger,
            strategy,
            profiler,
            config,
            policy,
            state: DriverState::Idle,
            first_step: true,
            steps_since_plan: 0,
            plan: None,
            carried_costs: Vec::new(),
            carried_breakdown: CostBreakdown::default(),
            batch: 0,
            last_report: None,
        }
    }

    pub fn process(&self) -> ProcessId {
        self.messenger.rank()
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn policy(&self) -> AmountPolicy {
        self.policy
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// The cached group plan, if one has been computed.
    pub fn plan(&self) -> Option<&GlobalPlan> {
        self.plan.as_ref()
    }

    pub fn steps_since_plan(&self) -> u32 {
        self.steps_since_plan
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Solve every owned cell over a uniform macro step. Returns the
    /// characteristic chemical time of the whole group.
    pub async fn solve(&mut self, cells: &mut CellField, delta_t: f64) -> DriverResult<f64> {
        Ok(self.step(cells, &delta_t).await?.characteristic_time)
    }

    /// Solve every owned cell with its own macro step.
    pub async fn solve_field(&mut self, cells: &mut CellField, delta_t: &[f64]) -> DriverResult<f64> {
        Ok(self.step(cells, delta_t).await?.characteristic_time)
    }

    /// Run one balanced step and return its report.
    ///
    /// The field is checked against the solver before anything is sent, so
    /// a rejected step leaves the driver where it was.
    pub async fn step<D>(&mut self, cells: &mut CellField, delta_t: &D) -> DriverResult<StepReport>
    where
        D: DeltaTField + Sync + ?Sized,
    {
        let expected = self.strategy.n_species();
        if cells.n_species() != expected {
            return Err(DriverError::SpeciesMismatch {
                expected,
                found: cells.n_species(),
            });
        }
        if let Some(found) = delta_t.covered_cells().filter(|n| *n != cells.len()) {
            return Err(DriverError::DeltaTLength {
                expected: cells.len(),
                found,
            });
        }

        let rank = self.messenger.rank();
        let n_processes = self.messenger.size();
        self.batch += 1;
        let batch = self.batch;
        self.profiler.reset();

        // ── Build ──────────────────────────────────────────────────
        transition(&mut self.state, DriverState::BuildingWorkItems, rank);
        self.carried_costs.resize(cells.len(), 0.0);
        let snapshots: Vec<WorkItem> = cells
            .iter()
            .enumerate()
            .map(|(cell, state)| {
                WorkItem::from_cell(rank, cell, state, delta_t.delta_t(cell), self.carried_costs[cell])
            })
            .collect();

        let Prepared {
            mut candidates,
            settled,
        } = self.strategy.prepare(rank, snapshots, &mut self.profiler)?;
        let n_candidates = candidates.len();
        let mut retrieved = settled.len();

        // ── Plan ───────────────────────────────────────────────────
        let replanned = self.first_step || self.steps_since_plan >= self.config.max_iter_update;
        if replanned {
            transition(&mut self.state, DriverState::Planning, rank);
            let report = CostReport::new(rank, self.carried_costs.iter().sum(), n_candidates)
                .with_breakdown(self.carried_breakdown);
            let gathered =
                all_gather(&mut self.messenger, Tag::CostReport, batch, serde_json::to_vec(&report)?)
                    .await?;
            let reports = gathered
                .iter()
                .map(|bytes| serde_json::from_slice::<CostReport>(bytes))
                .collect::<Result<Vec<_>, _>>()?;

            let plan = compute_plan(&reports, self.config.min_fraction_of_cells_to_send, self.policy);
            info!(
                process = rank,
                step = batch,
                transfers = plan.transfers.len(),
                dropped = plan.dropped.len(),
                "transfer plan refreshed"
            );
            self.plan = Some(plan);
            self.steps_since_plan = 0;
            self.first_step = false;
        } else {
            transition(&mut self.state, DriverState::UsingCachedPlan, rank);
        }

        let plan = match &self.plan {
            Some(global) => global.for_process(rank),
            None => TransferPlan::empty(rank, self.policy),
        };
        plan.validate(n_processes)?;

        // ── Send ───────────────────────────────────────────────────
        transition(&mut self.state, DriverState::Sending, rank);
        let outgoing = cells_to_send(&mut candidates, &plan);
        let expected: Vec<(ProcessId, Vec<CellId>)> = outgoing
            .iter()
            .map(|(target, items)| (*target, items.iter().map(|i| i.base().cell).collect()))
            .collect();
        let sent: usize = expected.iter().map(|(_, c)| c.len()).sum();

        let mut session = TransferSession::open(&mut self.messenger, batch);
        for (target, items) in &outgoing {
            session.declare_and_send(*target, encode_items(items)?).await?;
        }
        drop(outgoing);

        let mut foreign: Vec<(ProcessId, Vec<S::Item>)> = Vec::new();
        for (source, bytes) in session.declare_and_receive(&plan.receive_from).await? {
            let items: Vec<S::Item> = decode_items(&bytes)?;
            if let Some(stray) = items.iter().find(|i| i.base().owner != source) {
                return Err(DriverError::conservation(
                    rank,
                    format!(
                        "item for cell {} of process {} arrived from process {source}",
                        stray.base().cell,
                        stray.base().owner
                    ),
                ));
            }
            foreign.push((source, items));
        }
        let received: usize = foreign.iter().map(|(_, items)| items.len()).sum();

        // ── Solve ──────────────────────────────────────────────────
        transition(&mut self.state, DriverState::SolvingLocalBatch, rank);
        let mut integrated = 0;
        let batch_items = candidates
            .iter_mut()
            .chain(foreign.iter_mut().flat_map(|(_, items)| items.iter_mut()));
        for item in batch_items {
            match self.strategy.solve_item(rank, item, &mut self.profiler)? {
                ItemStatus::Integrated => integrated += 1,
                ItemStatus::Retrieved => retrieved += 1,
                ItemStatus::Failed => {}
            }
        }

        // ── Return ─────────────────────────────────────────────────
        transition(&mut self.state, DriverState::Returning, rank);
        for (owner, items) in &foreign {
            session.return_and_send(*owner, encode_items(items)?).await?;
        }
        let targets: Vec<ProcessId> = expected.iter().map(|(target, _)| *target).collect();
        let returned = session.return_and_receive(&targets).await?;
        let transfer = session.finish()?;

        let mut owned = settled;
        owned.append(&mut candidates);
        for ((source, bytes), (_, sent_cells)) in returned.into_iter().zip(&expected) {
            let items: Vec<S::Item> = decode_items(&bytes)?;
            let back: Vec<CellId> = items.iter().map(|i| i.base().cell).collect();
            if &back != sent_cells {
                return Err(DriverError::conservation(
                    rank,
                    format!(
                        "process {source} returned cells {back:?}, {sent_cells:?} were sent"
                    ),
                ));
            }
            for mut item in items {
                self.strategy.on_returned(rank, &mut item, &mut self.profiler)?;
                owned.push(item);
            }
        }

        // ── Merge ──────────────────────────────────────────────────
        transition(&mut self.state, DriverState::Merging, rank);
        let n_cells = cells.len();
        let mut seen = vec![false; n_cells];
        let mut breakdown = CostBreakdown::default();
        let mut failed_items = 0;

        for item in &owned {
            let base = item.base();
            if base.owner != rank {
                return Err(DriverError::conservation(
                    rank,
                    format!("merged an item owned by process {}", base.owner),
                ));
            }
            let cell = base.cell;
            let state = cells
                .get_mut(cell)
                .ok_or(DriverError::UnknownCell { cell, n_cells })?;
            if std::mem::replace(&mut seen[cell], true) {
                return Err(DriverError::conservation(rank, format!("cell {cell} merged twice")));
            }
            base.write_back(state);
            if base.failed {
                failed_items += 1;
            }
            self.carried_costs[cell] = item.cost();
            breakdown.merge(&self.strategy.breakdown(item));
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(DriverError::conservation(rank, format!("cell {missing} never came back")));
        }
        self.carried_breakdown = breakdown;

        let local_characteristic_time = cells
            .min_delta_t_chem()
            .unwrap_or(self.config.delta_t_chem_max);
        let characteristic_time =
            all_reduce_min(&mut self.messenger, batch, local_characteristic_time).await?;
        self.steps_since_plan += 1;
        transition(&mut self.state, DriverState::Idle, rank);

        let report = StepReport {
            step: batch,
            replanned,
            plan,
            n_cells,
            candidates: n_candidates,
            sent,
            received,
            integrated,
            retrieved,
            failed_items,
            owned_cost: self.carried_costs.iter().sum(),
            local_cost: self.profiler.total(),
            local_breakdown: self.profiler.totals(),
            characteristic_time,
            local_characteristic_time,
            transfer,
            tables: self.strategy.table_summary(),
        };
        debug!(
            process = rank,
            step = batch,
            sent,
            received,
            failed_items,
            owned_cost = report.owned_cost,
            local_cost = report.local_cost,
            characteristic_time,
            "balanced step complete"
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }
}
