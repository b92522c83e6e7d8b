//! Multi-process balancing scenarios.
//!
//! Every process is a tokio task holding one endpoint of an in-process
//! channel mesh. Each process also has its own manual clock, advanced by
//! the test solver according to the temperature of the cell it solves, so
//! costs (and therefore plans) are deterministic.

use std::sync::Arc;

use stiff_core::work_item::{decode_items, encode_items};
use stiff_core::{
    AmountPolicy, BalanceConfig, CellField, CellState, ChemState, TabulationConfig, WorkItem,
};
use stiffgrid_chemistry::{ChemistrySolver, IntegrationError, Tabulation};
use stiffgrid_driver::{
    BalancingDriver, DriverError, DriverState, PlainStrategy, StepReport, TdacStrategy,
};
use stiffgrid_planner::CostReport;
use stiffgrid_profiler::{CostProfiler, ManualClock};
use stiffgrid_transport::{ChannelMesh, Envelope, MeshEndpoint, Messenger, Tag};

const N_SPECIES: usize = 5;
const CELLS: usize = 6;
const DT: f64 = 1e-6;

// ── Test solver ────────────────────────────────────────────────────

/// Costs `(T - 1000) / 100` seconds of its process's clock per call and
/// moves half of species 0 into species 1. Recommends `(T + rho) * 1e-9`
/// as the next sub-step.
struct ClockedSolver {
    clock: Arc<ManualClock>,
    frozen: bool,
    /// Cells with a density below this fail to integrate.
    fail_below_rho: f64,
}

impl ClockedSolver {
    fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            frozen: false,
            fail_below_rho: 0.0,
        }
    }
}

impl ChemistrySolver for ClockedSolver {
    fn name(&self) -> String {
        "clocked".into()
    }

    fn n_species(&self) -> usize {
        N_SPECIES
    }

    fn step(
        &self,
        state: &mut ChemState,
        _delta_t: f64,
        _sub_delta_t: f64,
    ) -> Result<f64, IntegrationError> {
        self.clock.advance_secs((state.t - 1000.0) / 100.0);
        if state.rho < self.fail_below_rho {
            return Err(IntegrationError::MaxSteps { steps: 1 });
        }
        if !self.frozen {
            let moved = 0.5 * state.y[0];
            state.y[0] -= moved;
            state.y[1] += moved;
        }
        Ok((state.t + state.rho) * 1e-9)
    }

    fn production_rates(&self, state: &ChemState) -> Vec<f64> {
        let mut rates = vec![0.0; N_SPECIES];
        rates[0] = -state.y[0];
        rates[1] = state.y[0];
        rates
    }
}

// ── Harness ────────────────────────────────────────────────────────

fn temperature(process: usize) -> f64 {
    [1500.0, 1250.0, 1000.0][process % 3]
}

fn field(process: usize) -> CellField {
    let cells = (0..CELLS)
        .map(|c| {
            CellState::new(
                vec![1.0, 0.0, 0.0, 0.0, 0.0],
                temperature(process),
                101_325.0,
                1.0 + c as f64 * 0.1,
                DT,
            )
        })
        .collect();
    CellField::from_cells(N_SPECIES, cells).unwrap()
}

#[derive(Clone, Copy)]
enum Kind {
    Plain,
    Tdac,
}

async fn run_group(
    n: usize,
    kind: Kind,
    config: BalanceConfig,
    solver: fn(Arc<ManualClock>) -> ClockedSolver,
    steps: usize,
) -> Vec<(CellField, Vec<StepReport>)> {
    let mut handles = Vec::new();
    for endpoint in ChannelMesh::build(n) {
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            let process = endpoint.rank();
            let clock = Arc::new(ManualClock::new());
            let profiler = CostProfiler::new(clock.clone());
            let mut cells = field(process);
            let mut reports = Vec::new();

            match kind {
                Kind::Plain => {
                    let strategy = PlainStrategy::new(Box::new(solver(clock)), config.delta_t_chem_max);
                    let mut driver = BalancingDriver::new(endpoint, strategy, config, profiler);
                    for _ in 0..steps {
                        reports.push(driver.step(&mut cells, &DT).await.unwrap());
                        assert_eq!(driver.state(), DriverState::Idle);
                    }
                }
                Kind::Tdac => {
                    let tabulation = config.tabulation.clone();
                    let strategy = TdacStrategy::new(
                        process,
                        Box::new(solver(clock)),
                        &tabulation,
                        config.delta_t_chem_max,
                    );
                    let mut driver = BalancingDriver::new(endpoint, strategy, config, profiler);
                    for _ in 0..steps {
                        reports.push(driver.step(&mut cells, &DT).await.unwrap());
                    }
                }
            }
            (cells, reports)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

// ── Plain variant ──────────────────────────────────────────────────

#[tokio::test]
async fn three_processes_balance_and_return_every_cell() {
    let results = run_group(3, Kind::Plain, BalanceConfig::default(), ClockedSolver::new, 2).await;

    // Nothing has been measured before the first step.
    for (_, reports) in &results {
        assert!(reports[0].replanned);
        assert!(reports[0].plan.is_empty());
        assert_eq!(reports[0].sent, 0);
    }

    // Costs 30 / 15 / 0: process 0 sends half its cells to process 2.
    let r0 = &results[0].1[1];
    assert!(r0.replanned);
    assert_eq!(r0.plan.send.len(), 1);
    assert_eq!(r0.plan.send[0].target, 2);
    assert_eq!(r0.plan.send[0].amount, 0.5);
    assert_eq!(r0.sent, 3);

    assert!(results[1].1[1].plan.is_empty());

    let r2 = &results[2].1[1];
    assert_eq!(r2.plan.receive_from, vec![0]);
    assert_eq!(r2.received, 3);
    assert_eq!(r2.local_cost, 15.0);
    assert_eq!(r2.owned_cost, 0.0);

    // Cost follows the cell, not the process that solved it.
    assert_eq!(r0.owned_cost, 30.0);
    assert_eq!(r0.local_cost, 15.0);
    assert_eq!(r0.local_breakdown.integrate, r0.local_cost);
    assert_eq!(r2.local_breakdown.search, 0.0);

    for (process, (cells, reports)) in results.iter().enumerate() {
        assert_eq!(cells.len(), CELLS);
        for cell in cells.iter() {
            // Solved exactly once per step.
            assert_eq!(cell.y[0], 0.25);
            assert_eq!(cell.y[1], 0.75);
        }
        let last = &reports[1];
        assert_eq!(last.failed_items, 0);
        assert_eq!(last.local_characteristic_time, (temperature(process) + 1.0) * 1e-9);
    }
}

#[tokio::test]
async fn characteristic_time_is_the_group_minimum() {
    let results = run_group(3, Kind::Plain, BalanceConfig::default(), ClockedSolver::new, 2).await;

    // The coolest process (1000 K, rho 1.0) sets the pace for everyone.
    for (_, reports) in &results {
        for r in reports {
            assert_eq!(r.characteristic_time, 1001.0 * 1e-9);
        }
    }
    assert_eq!(results[0].1[1].local_characteristic_time, 1501.0 * 1e-9);
    assert_eq!(results[1].1[1].local_characteristic_time, 1251.0 * 1e-9);
}

#[tokio::test]
async fn plan_is_reused_between_refreshes() {
    let config = BalanceConfig {
        max_iter_update: 5,
        ..BalanceConfig::default()
    };
    let results = run_group(3, Kind::Plain, config, ClockedSolver::new, 10).await;

    for (_, reports) in &results {
        let refreshed: Vec<u64> = reports.iter().filter(|r| r.replanned).map(|r| r.step).collect();
        assert_eq!(refreshed, vec![1, 6]);

        for r in &reports[1..5] {
            assert_eq!(r.plan, reports[0].plan);
        }
        for r in &reports[6..10] {
            assert_eq!(r.plan, reports[5].plan);
        }
    }

    // The first plan saw no costs; the refresh on step 6 did.
    let p0 = &results[0].1;
    assert!(p0[4].plan.is_empty());
    assert_eq!(p0[5].sent, 3);
    assert_eq!(p0[9].sent, 3);
}

#[tokio::test]
async fn failed_cells_keep_their_state_wherever_solved() {
    fn failing(clock: Arc<ManualClock>) -> ClockedSolver {
        ClockedSolver {
            fail_below_rho: 1.05,
            ..ClockedSolver::new(clock)
        }
    }
    let results = run_group(3, Kind::Plain, BalanceConfig::default(), failing, 2).await;

    // Cell 0 of process 0 was solved on process 2 during step 2.
    assert_eq!(results[0].1[1].sent, 3);

    for (cells, reports) in &results {
        for r in reports {
            assert_eq!(r.failed_items, 1);
        }
        let cell0 = cells.get(0).unwrap();
        assert_eq!(cell0.y, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(cell0.rr, vec![0.0; N_SPECIES]);
        assert_eq!(cells.get(1).unwrap().y[0], 0.25);
    }
}

#[tokio::test]
async fn per_cell_time_steps_are_accepted() {
    let mut endpoints = ChannelMesh::build(1);
    let endpoint = endpoints.remove(0);
    let clock = Arc::new(ManualClock::new());
    let strategy = PlainStrategy::new(Box::new(ClockedSolver::new(clock.clone())), f64::MAX);
    let mut driver = BalancingDriver::new(
        endpoint,
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );

    let mut cells = field(0);
    let steps = vec![DT; CELLS];
    let tau = driver.solve_field(&mut cells, &steps).await.unwrap();
    assert_eq!(tau, 1501.0 * 1e-9);

    let short = vec![DT; CELLS - 1];
    assert!(matches!(
        driver.solve_field(&mut cells, &short).await,
        Err(DriverError::DeltaTLength { expected: 6, found: 5 })
    ));
}

#[tokio::test]
async fn short_time_step_field_is_rejected_before_the_step() {
    let mut endpoints = ChannelMesh::build(1);
    let clock = Arc::new(ManualClock::new());
    let strategy = PlainStrategy::new(Box::new(ClockedSolver::new(clock.clone())), f64::MAX);
    let mut driver = BalancingDriver::new(
        endpoints.remove(0),
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );

    let mut cells = field(0);
    let short = vec![DT; 2];
    let err = driver.step(&mut cells, &short).await.unwrap_err();
    assert!(matches!(err, DriverError::DeltaTLength { expected: 6, found: 2 }));
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(driver.last_report().is_none());
    assert_eq!(cells.get(0).unwrap().y[0], 1.0);

    // The rejected call did not consume a batch.
    let report = driver.step(&mut cells, &vec![DT; CELLS]).await.unwrap();
    assert_eq!(report.step, 1);
}

#[test]
fn amount_policy_defaults_to_the_strategy_unless_overridden() {
    let plain = |config: BalanceConfig| {
        let clock = Arc::new(ManualClock::new());
        let strategy = PlainStrategy::new(Box::new(ClockedSolver::new(clock.clone())), f64::MAX);
        BalancingDriver::new(ChannelMesh::build(1).remove(0), strategy, config, CostProfiler::new(clock))
    };
    assert_eq!(plain(BalanceConfig::default()).policy(), AmountPolicy::FractionOfCells);

    let config = BalanceConfig {
        amount_policy: Some(AmountPolicy::CostBudget),
        ..BalanceConfig::default()
    };
    assert_eq!(plain(config).policy(), AmountPolicy::CostBudget);

    let clock = Arc::new(ManualClock::new());
    let strategy = TdacStrategy::new(
        0,
        Box::new(ClockedSolver::new(clock.clone())),
        &TabulationConfig::default(),
        f64::MAX,
    );
    let tdac = BalancingDriver::new(
        ChannelMesh::build(1).remove(0),
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );
    assert_eq!(tdac.policy(), AmountPolicy::CostBudget);
}

// ── Species checks ─────────────────────────────────────────────────

/// A field with one species more than the test solver knows.
fn wide_field() -> CellField {
    let cells = (0..CELLS)
        .map(|_| CellState::new(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1500.0, 101_325.0, 1.0, DT))
        .collect();
    CellField::from_cells(N_SPECIES + 1, cells).unwrap()
}

#[tokio::test]
async fn plain_rejects_a_field_with_the_wrong_species_count() {
    let mut endpoints = ChannelMesh::build(1);
    let clock = Arc::new(ManualClock::new());
    let strategy = PlainStrategy::new(Box::new(ClockedSolver::new(clock.clone())), f64::MAX);
    let mut driver = BalancingDriver::new(
        endpoints.remove(0),
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );

    let mut cells = wide_field();
    let err = driver.step(&mut cells, &DT).await.unwrap_err();
    assert!(matches!(err, DriverError::SpeciesMismatch { expected: 5, found: 6 }));
    assert!(cells.iter().all(|c| c.y[0] == 1.0 && c.rr.iter().all(|r| *r == 0.0)));
    assert!(driver.last_report().is_none());
}

#[tokio::test]
async fn tdac_rejects_a_field_with_the_wrong_species_count() {
    let mut endpoints = ChannelMesh::build(1);
    let clock = Arc::new(ManualClock::new());
    let strategy = TdacStrategy::new(
        0,
        Box::new(ClockedSolver::new(clock.clone())),
        &TabulationConfig::default(),
        f64::MAX,
    );
    let mut driver = BalancingDriver::new(
        endpoints.remove(0),
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );

    let mut cells = wide_field();
    let err = driver.solve(&mut cells, DT).await.unwrap_err();
    assert!(matches!(err, DriverError::SpeciesMismatch { expected: 5, found: 6 }));
    assert_eq!(driver.strategy().local_table().stats().lookups, 0);
    assert!(driver.plan().is_none());
}

// ── Conservation ───────────────────────────────────────────────────

/// Exchange one tagged message with process 0, sending first.
async fn swap(endpoint: &mut MeshEndpoint, tag: Tag, batch: u64, data: Vec<u8>) {
    endpoint.send(0, Envelope::new(tag, batch, data)).await.unwrap();
    let reply = endpoint.recv(0).await.unwrap();
    assert_eq!(reply.tag, tag);
}

/// Plays process 1 by hand and returns one item fewer than it received.
async fn lossy_peer(mut endpoint: MeshEndpoint) {
    let report = serde_json::to_vec(&CostReport::new(1, 0.0, 0)).unwrap();

    // Batch 1 moves nothing and closes with the time scale minimum.
    swap(&mut endpoint, Tag::CostReport, 1, report.clone()).await;
    swap(&mut endpoint, Tag::GroupMinimum, 1, 1.0f64.to_le_bytes().to_vec()).await;

    swap(&mut endpoint, Tag::CostReport, 2, report).await;

    let _size = endpoint.recv(0).await.unwrap();
    let payload = endpoint.recv(0).await.unwrap();
    let mut items: Vec<WorkItem> = decode_items(&payload.data).unwrap();
    assert_eq!(items.len(), 3);
    items.pop();

    let bytes = encode_items(&items).unwrap();
    endpoint
        .send(0, Envelope::size_declaration(Tag::ResultSize, 2, bytes.len() as u64))
        .await
        .unwrap();
    endpoint
        .send(0, Envelope::new(Tag::ResultPayload, 2, bytes))
        .await
        .unwrap();
}

#[tokio::test]
async fn lost_items_fail_the_step() {
    let mut endpoints = ChannelMesh::build(2);
    let peer = tokio::spawn(lossy_peer(endpoints.pop().unwrap()));
    let endpoint = endpoints.pop().unwrap();

    let clock = Arc::new(ManualClock::new());
    let strategy = PlainStrategy::new(Box::new(ClockedSolver::new(clock.clone())), f64::MAX);
    let mut driver = BalancingDriver::new(
        endpoint,
        strategy,
        BalanceConfig::default(),
        CostProfiler::new(clock),
    );
    let mut cells = field(0);

    driver.solve(&mut cells, DT).await.unwrap();
    let err = driver.solve(&mut cells, DT).await.unwrap_err();
    assert!(matches!(err, DriverError::Conservation { process: 0, .. }));

    peer.await.unwrap();
}

// ── Tabulation variant ─────────────────────────────────────────────

#[tokio::test]
async fn tdac_migrates_table_misses_by_cost_budget() {
    let results = run_group(2, Kind::Tdac, BalanceConfig::default(), ClockedSolver::new, 2).await;

    let (first, second) = (&results[0].1[0], &results[0].1[1]);
    assert_eq!(first.plan.policy, AmountPolicy::CostBudget);
    assert_eq!(first.candidates, CELLS);
    assert_eq!(first.sent, 0);

    // Costs 30 / 15: a budget of 7.5 seconds is two cells of 5.
    assert_eq!(second.plan.send[0].amount, 7.5);
    assert_eq!(second.sent, 2);

    // Both foreign cells share a composition: the second one is served
    // from the remote table filled by the first.
    let helper = &results[1].1[1];
    assert_eq!(helper.received, 2);
    assert_eq!(helper.retrieved, 1);
    let tables = helper.tables.unwrap();
    assert_eq!(tables.remote.foreign_inserts, 1);
    assert_eq!(tables.remote.hits, 1);
    assert_eq!(tables.local.foreign_inserts, 0);

    let owner_tables = second.tables.unwrap();
    assert_eq!(owner_tables.local.lookups, 2 * CELLS as u64);
    assert_eq!(owner_tables.local.hits, 0);

    for (cells, _) in &results {
        for cell in cells.iter() {
            assert_eq!(cell.y[0], 0.25);
        }
    }
}

#[tokio::test]
async fn tdac_retrieves_unchanged_cells_from_the_table() {
    fn frozen(clock: Arc<ManualClock>) -> ClockedSolver {
        ClockedSolver {
            frozen: true,
            ..ClockedSolver::new(clock)
        }
    }
    let config = BalanceConfig {
        tabulation: TabulationConfig {
            max_entries: 4,
            ..TabulationConfig::default()
        },
        ..BalanceConfig::default()
    };
    let results = run_group(1, Kind::Tdac, config, frozen, 2).await;
    let (cells, reports) = &results[0];

    assert_eq!(reports[0].candidates, CELLS);
    assert_eq!(reports[0].integrated, CELLS);

    assert_eq!(reports[1].candidates, 0);
    assert_eq!(reports[1].retrieved, CELLS);
    assert_eq!(reports[1].integrated, 0);
    assert_eq!(reports[1].tables.unwrap().local.hits, CELLS as u64);

    for cell in cells.iter() {
        assert_eq!(cell.y[0], 1.0);
        assert_eq!(cell.rr, vec![0.0; N_SPECIES]);
    }
}
