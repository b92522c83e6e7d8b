//! In-process simulation of a balanced process group.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};
use serde::Serialize;
use stiff_core::{BalanceConfig, CellField, CellState, ProcessId, Variant};
use stiffgrid_chemistry::{MechanismSpec, SolverRegistry};
use stiffgrid_driver::{BalancingDriver, SolveStrategy, StepReport};
use stiffgrid_profiler::CostProfiler;
use stiffgrid_transport::{ChannelMesh, MeshEndpoint, Messenger};
use tracing::{debug, info};

const COLD_TEMPERATURE: f64 = 900.0;
const HOT_TEMPERATURE: f64 = 2200.0;
const PRESSURE: f64 = 101_325.0;
const GAS_CONSTANT: f64 = 287.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
    Plain,
    Tdac,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Plain => Variant::Plain,
            VariantArg::Tdac => Variant::Tdac,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of processes in the group.
    #[arg(long, default_value = "4")]
    pub procs: usize,

    /// Cells owned by each process.
    #[arg(long, default_value = "64")]
    pub cells: usize,

    /// Species in the reference mechanism.
    #[arg(long, default_value = "6")]
    pub species: usize,

    /// Number of balanced steps.
    #[arg(long, default_value = "10")]
    pub steps: usize,

    /// Flow time step in seconds.
    #[arg(long, default_value = "1e-5")]
    pub delta_t: f64,

    /// Balancing configuration file (TOML).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured variant.
    #[arg(long, value_enum)]
    pub variant: Option<VariantArg>,

    /// Overrides the configured plan refresh interval.
    #[arg(long)]
    pub max_iter_update: Option<u32>,

    /// Overrides the configured minimum transfer fraction.
    #[arg(long)]
    pub min_fraction: Option<f64>,

    /// Print one JSON summary line per step on stdout.
    #[arg(long)]
    pub summary_json: bool,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            procs: 4,
            cells: 64,
            species: 6,
            steps: 10,
            delta_t: 1e-5,
            config: None,
            variant: None,
            max_iter_update: None,
            min_fraction: None,
            summary_json: false,
        }
    }
}

/// Group-wide view of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub step: u64,
    pub replanned: bool,
    /// Minimum characteristic time over all processes.
    pub characteristic_time: f64,
    /// Largest local cost over the mean local cost; 1.0 is perfect balance.
    pub imbalance: f64,
    pub sent: usize,
    pub integrated: usize,
    pub retrieved: usize,
    pub failed_items: usize,
    pub bytes_moved: u64,
    /// Owner-side table hit rate, TDAC only.
    pub local_hit_rate: Option<f64>,
}

/// Applies command-line overrides on top of the file or default config.
pub fn load_config(args: &SimulateArgs) -> anyhow::Result<BalanceConfig> {
    let mut config = match &args.config {
        Some(path) => BalanceConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BalanceConfig::default(),
    };
    if let Some(variant) = args.variant {
        config.variant = variant.into();
    }
    if let Some(max_iter_update) = args.max_iter_update {
        config.max_iter_update = max_iter_update;
    }
    if let Some(min_fraction) = args.min_fraction {
        config.min_fraction_of_cells_to_send = min_fraction;
    }
    config.validate()?;
    Ok(config)
}

/// Initial field of one process. Temperature falls linearly with the global
/// cell position, so low ranks own the hot and expensive cells.
pub fn synthetic_field(
    process: ProcessId,
    n_processes: usize,
    n_cells: usize,
    n_species: usize,
) -> anyhow::Result<CellField> {
    let total = (n_processes * n_cells).max(1) as f64;
    let cells = (0..n_cells)
        .map(|c| {
            let position = (process * n_cells + c) as f64 / total;
            let t = HOT_TEMPERATURE - (HOT_TEMPERATURE - COLD_TEMPERATURE) * position;
            let mut y = vec![0.0; n_species];
            y[0] = 1.0;
            CellState::new(y, t, PRESSURE, PRESSURE / (GAS_CONSTANT * t), 1e-7)
        })
        .collect();
    Ok(CellField::from_cells(n_species, cells)?)
}

pub async fn run(args: &SimulateArgs) -> anyhow::Result<Vec<StepSummary>> {
    anyhow::ensure!(args.procs >= 1, "--procs must be at least 1");
    anyhow::ensure!(args.species >= 2, "--species must be at least 2");
    anyhow::ensure!(
        args.delta_t.is_finite() && args.delta_t > 0.0,
        "--delta-t must be positive"
    );

    let config = load_config(args)?;
    let mechanism = MechanismSpec::reference(args.species);
    info!(
        procs = args.procs,
        cells = args.cells,
        species = args.species,
        steps = args.steps,
        variant = ?config.variant,
        amount_policy = ?config.amount_policy,
        max_iter_update = config.max_iter_update,
        "simulation starting"
    );

    let mut handles = Vec::with_capacity(args.procs);
    for endpoint in ChannelMesh::build(args.procs) {
        let process = endpoint.rank();
        let cells = synthetic_field(process, args.procs, args.cells, args.species)?;
        handles.push(tokio::spawn(run_process(
            endpoint,
            cells,
            config.clone(),
            mechanism.clone(),
            args.steps,
            args.delta_t,
        )));
    }

    let mut per_process = Vec::with_capacity(handles.len());
    for handle in handles {
        per_process.push(handle.await??);
    }

    let summaries = summarize(&per_process);
    for summary in &summaries {
        info!(
            step = summary.step,
            replanned = summary.replanned,
            characteristic_time = summary.characteristic_time,
            imbalance = summary.imbalance,
            sent = summary.sent,
            retrieved = summary.retrieved,
            failed = summary.failed_items,
            hit_rate = ?summary.local_hit_rate,
            "step complete"
        );
    }
    info!(steps = summaries.len(), "simulation finished");
    Ok(summaries)
}

async fn run_process(
    endpoint: MeshEndpoint,
    cells: CellField,
    config: BalanceConfig,
    mechanism: MechanismSpec,
    steps: usize,
    delta_t: f64,
) -> anyhow::Result<Vec<StepReport>> {
    let registry = SolverRegistry::with_builtins();
    let profiler = CostProfiler::monotonic();
    match config.variant {
        Variant::Plain => {
            let driver = BalancingDriver::plain(endpoint, &mechanism, &registry, config, profiler)?;
            drive(driver, cells, steps, delta_t).await
        }
        Variant::Tdac => {
            let driver = BalancingDriver::tdac(endpoint, &mechanism, &registry, config, profiler)?;
            drive(driver, cells, steps, delta_t).await
        }
    }
}

async fn drive<S: SolveStrategy>(
    mut driver: BalancingDriver<MeshEndpoint, S>,
    mut cells: CellField,
    steps: usize,
    delta_t: f64,
) -> anyhow::Result<Vec<StepReport>> {
    let mut reports = Vec::with_capacity(steps);
    for _ in 0..steps {
        let report = driver.step(&mut cells, &delta_t).await?;
        debug!(
            process = driver.process(),
            step = report.step,
            sent = report.sent,
            received = report.received,
            local_cost = report.local_cost,
            "process step"
        );
        reports.push(report);
    }
    Ok(reports)
}

/// Folds per-process reports into one summary per step.
pub fn summarize(per_process: &[Vec<StepReport>]) -> Vec<StepSummary> {
    let n_steps = per_process.iter().map(Vec::len).min().unwrap_or(0);
    (0..n_steps)
        .map(|i| {
            let reports: Vec<&StepReport> = per_process.iter().map(|r| &r[i]).collect();
            let costs: Vec<f64> = reports.iter().map(|r| r.local_cost).collect();
            let mean = costs.iter().sum::<f64>() / costs.len() as f64;
            let max = costs.iter().copied().fold(0.0, f64::max);
            let imbalance = if mean > 0.0 { max / mean } else { 1.0 };

            let tables: Vec<_> = reports.iter().filter_map(|r| r.tables).collect();
            let local_hit_rate = (!tables.is_empty()).then(|| {
                let lookups: u64 = tables.iter().map(|t| t.local.lookups).sum();
                let hits: u64 = tables.iter().map(|t| t.local.hits).sum();
                if lookups == 0 {
                    0.0
                } else {
                    hits as f64 / lookups as f64
                }
            });

            StepSummary {
                step: reports[0].step,
                replanned: reports.iter().any(|r| r.replanned),
                characteristic_time: reports[0].characteristic_time,
                imbalance,
                sent: reports.iter().map(|r| r.sent).sum(),
                integrated: reports.iter().map(|r| r.integrated).sum(),
                retrieved: reports.iter().map(|r| r.retrieved).sum(),
                failed_items: reports.iter().map(|r| r.failed_items).sum(),
                bytes_moved: reports.iter().map(|r| r.transfer.bytes_sent).sum(),
                local_hit_rate,
            }
        })
        .collect()
}
