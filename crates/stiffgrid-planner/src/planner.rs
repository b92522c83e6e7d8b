//! Balance planner — turns a gathered cost report into a transfer plan.
//!
//! Given the cost of every process, the planner decides:
//! 1. The target load (mean cost across processes)
//! 2. Which processes donate work (above target) and which receive (below)
//! 3. How much each donor sends to each receiver, greedily pairing the
//!    most loaded donor with the least loaded receiver
//!
//! A donor never gives away more than its movable cost, the part of its
//! load that travels with the cells. Transfers too small to pay for their
//! transport are dropped.

use serde::{Deserialize, Serialize};
use stiff_core::{AmountPolicy, ProcessId};
use tracing::{debug, info};

use crate::error::{PlanError, PlanResult};
use crate::report::{CostReport, rank_by_cost};

/// One planned movement of work between two processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: ProcessId,
    pub to: ProcessId,
    /// Fraction of the donor's cells or cost budget, per the plan's policy.
    pub amount: f64,
}

/// The plan for the whole process group.
///
/// Computed identically on every process; each process then extracts its
/// own view with `for_process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalPlan {
    pub policy: AmountPolicy,
    pub n_processes: usize,
    /// Transfers that survived threshold filtering, in planning order.
    pub transfers: Vec<Transfer>,
    /// Transfers dropped for falling under the minimum fraction.
    pub dropped: Vec<Transfer>,
}

impl GlobalPlan {
    pub fn empty(policy: AmountPolicy, n_processes: usize) -> Self {
        Self {
            policy,
            n_processes,
            transfers: Vec::new(),
            dropped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// The send entries and receive set of one process.
    pub fn for_process(&self, process: ProcessId) -> TransferPlan {
        let send = self
            .transfers
            .iter()
            .filter(|t| t.from == process)
            .map(|t| SendEntry {
                target: t.to,
                amount: t.amount,
            })
            .collect();

        let mut receive_from: Vec<ProcessId> = self
            .transfers
            .iter()
            .filter(|t| t.to == process)
            .map(|t| t.from)
            .collect();
        receive_from.sort_unstable();
        receive_from.dedup();

        TransferPlan {
            process,
            policy: self.policy,
            send,
            receive_from,
        }
    }
}

/// An outbound entry of a process's plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEntry {
    pub target: ProcessId,
    pub amount: f64,
}

/// One process's view of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub process: ProcessId,
    pub policy: AmountPolicy,
    /// Outbound transfers in the order work is cut from the local list.
    pub send: Vec<SendEntry>,
    /// Processes this process receives work from, ascending.
    pub receive_from: Vec<ProcessId>,
}

impl TransferPlan {
    pub fn empty(process: ProcessId, policy: AmountPolicy) -> Self {
        Self {
            process,
            policy,
            send: Vec::new(),
            receive_from: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.send.is_empty() && self.receive_from.is_empty()
    }

    pub fn send_targets(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.send.iter().map(|s| s.target)
    }

    /// Check the plan against the size of the process group.
    pub fn validate(&self, n_processes: usize) -> PlanResult<()> {
        let check = |process: ProcessId| -> PlanResult<()> {
            if process >= n_processes {
                return Err(PlanError::UnknownProcess {
                    process,
                    n_processes,
                });
            }
            if process == self.process {
                return Err(PlanError::SelfTransfer(process));
            }
            Ok(())
        };

        for entry in &self.send {
            check(entry.target)?;
            match self.policy {
                AmountPolicy::FractionOfCells => {
                    if !(0.0..=1.0).contains(&entry.amount) {
                        return Err(PlanError::FractionOutOfRange {
                            target: entry.target,
                            amount: entry.amount,
                        });
                    }
                }
                AmountPolicy::CostBudget => {
                    if entry.amount.is_nan() || entry.amount < 0.0 {
                        return Err(PlanError::NegativeBudget {
                            target: entry.target,
                            amount: entry.amount,
                        });
                    }
                }
            }
        }
        for source in &self.receive_from {
            check(*source)?;
        }
        Ok(())
    }
}

/// Compute the group-wide transfer plan from every process's cost report.
///
/// Deterministic: the same reports, in any order, produce the same plan.
pub fn compute_plan(
    reports: &[CostReport],
    min_fraction: f64,
    policy: AmountPolicy,
) -> GlobalPlan {
    let n_processes = reports.len();
    let mut plan = GlobalPlan::empty(policy, n_processes);
    if n_processes < 2 {
        return plan;
    }

    let ranked = rank_by_cost(reports);
    let total: f64 = ranked.iter().map(|r| r.cost).sum();
    if total <= 0.0 {
        return plan;
    }
    let target = total / n_processes as f64;

    // Highest cost first.
    let donors: Vec<&CostReport> = ranked
        .iter()
        .copied()
        .filter(|r| r.cost > target && r.n_cells > 0 && r.movable_cost() > 0.0)
        .collect();
    // Lowest cost first.
    let receivers: Vec<&CostReport> = ranked
        .iter()
        .rev()
        .copied()
        .filter(|r| r.cost < target)
        .collect();

    debug!(
        target,
        donors = donors.len(),
        receivers = receivers.len(),
        "planning transfers"
    );

    let (mut d, mut r) = (0, 0);
    let surplus_of = |x: &CostReport| (x.cost - target).min(x.movable_cost());
    let mut surplus = donors.first().map_or(0.0, |x| surplus_of(*x));
    let mut deficit = receivers.first().map_or(0.0, |x| target - x.cost);

    while d < donors.len() && r < receivers.len() {
        let donor = donors[d];
        let receiver = receivers[r];
        let moved = surplus.min(deficit);
        let fraction = moved / donor.movable_cost();

        let amount = match policy {
            AmountPolicy::FractionOfCells => fraction,
            AmountPolicy::CostBudget => moved,
        };
        let transfer = Transfer {
            from: donor.process,
            to: receiver.process,
            amount,
        };

        if fraction >= min_fraction && moved > 0.0 {
            debug!(
                from = donor.process,
                to = receiver.process,
                fraction,
                cost = moved,
                "planned transfer"
            );
            plan.transfers.push(transfer);
        } else {
            debug!(
                from = donor.process,
                to = receiver.process,
                fraction,
                "transfer below threshold, dropped"
            );
            plan.dropped.push(transfer);
        }

        // `moved` is exactly one of the two operands, so the exhausted side
        // lands on zero without rounding.
        let donor_done = moved == surplus;
        let receiver_done = moved == deficit;
        surplus -= moved;
        deficit -= moved;

        if donor_done {
            d += 1;
            surplus = donors.get(d).map_or(0.0, |x| surplus_of(*x));
        }
        if receiver_done {
            r += 1;
            deficit = receivers.get(r).map_or(0.0, |x| target - x.cost);
        }
    }

    info!(
        transfers = plan.transfers.len(),
        dropped = plan.dropped.len(),
        target,
        "transfer plan computed"
    );

    plan
}
