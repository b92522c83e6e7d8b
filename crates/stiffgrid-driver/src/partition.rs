//! Cutting the candidate list into per-target batches.
//!
//! Batches are contiguous prefixes of the candidate list, cut in plan
//! order. What is left after every cut stays local.

use stiff_core::{AmountPolicy, Balanced, ProcessId};
use stiffgrid_planner::TransferPlan;

/// Split `candidates` per the plan's send entries.
///
/// Returns one batch per send entry, in entry order; a batch may be empty.
/// The items that stay local remain in `candidates`, in their original
/// order.
pub fn cells_to_send<T: Balanced>(
    candidates: &mut Vec<T>,
    plan: &TransferPlan,
) -> Vec<(ProcessId, Vec<T>)> {
    let n_local = candidates.len();
    let mut batches = Vec::with_capacity(plan.send.len());

    for entry in &plan.send {
        let count = match plan.policy {
            AmountPolicy::FractionOfCells => {
                let target = (entry.amount * n_local as f64).round() as usize;
                target.min(candidates.len())
            }
            AmountPolicy::CostBudget => budget_prefix(candidates, entry.amount),
        };
        let mut batch: Vec<T> = candidates.drain(..count).collect();
        for item in &mut batch {
            item.base_mut().local = false;
        }
        batches.push((entry.target, batch));
    }
    batches
}

/// Shortest prefix whose cost reaches `budget`, or the whole list.
fn budget_prefix<T: Balanced>(items: &[T], budget: f64) -> usize {
    if budget <= 0.0 {
        return 0;
    }
    let mut spent = 0.0;
    for (i, item) in items.iter().enumerate() {
        spent += item.cost();
        if spent >= budget {
            return i + 1;
        }
    }
    items.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stiff_core::{CellState, WorkItem};
    use stiffgrid_planner::SendEntry;

    fn items(costs: &[f64]) -> Vec<WorkItem> {
        let state = CellState::new(vec![1.0], 1000.0, 1e5, 1.0, 1e-6);
        costs
            .iter()
            .enumerate()
            .map(|(cell, c)| WorkItem::from_cell(0, cell, &state, 1e-5, *c))
            .collect()
    }

    fn plan(policy: AmountPolicy, send: &[(ProcessId, f64)]) -> TransferPlan {
        TransferPlan {
            process: 0,
            policy,
            send: send
                .iter()
                .map(|(target, amount)| SendEntry {
                    target: *target,
                    amount: *amount,
                })
                .collect(),
            receive_from: Vec::new(),
        }
    }

    fn cells(batch: &[WorkItem]) -> Vec<usize> {
        batch.iter().map(|i| i.cell).collect()
    }

    #[test]
    fn fractions_cut_contiguous_prefixes() {
        let mut list = items(&[1.0; 10]);
        let batches = cells_to_send(&mut list, &plan(AmountPolicy::FractionOfCells, &[(2, 0.3), (3, 0.2)]));

        assert_eq!(batches[0].0, 2);
        assert_eq!(cells(&batches[0].1), vec![0, 1, 2]);
        assert_eq!(cells(&batches[1].1), vec![3, 4]);
        assert_eq!(cells(&list), vec![5, 6, 7, 8, 9]);
        assert!(batches.iter().flat_map(|(_, b)| b).all(|i| !i.local));
        assert!(list.iter().all(|i| i.local));
    }

    #[test]
    fn fractions_round_to_nearest_and_cap() {
        let mut list = items(&[1.0; 6]);
        let batches = cells_to_send(&mut list, &plan(AmountPolicy::FractionOfCells, &[(1, 0.75), (2, 0.75)]));

        // round(4.5) = 5, then only one item is left for the second cut.
        assert_eq!(batches[0].1.len(), 5);
        assert_eq!(batches[1].1.len(), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn budget_accumulates_cost_until_met() {
        let mut list = items(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0]);
        let batches = cells_to_send(&mut list, &plan(AmountPolicy::CostBudget, &[(1, 12.0)]));

        assert_eq!(cells(&batches[0].1), vec![0, 1, 2]);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn zero_budget_sends_nothing() {
        let mut list = items(&[0.0, 0.0]);
        let batches = cells_to_send(&mut list, &plan(AmountPolicy::CostBudget, &[(1, 0.0)]));
        assert!(batches[0].1.is_empty());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn empty_plan_keeps_everything_local() {
        let mut list = items(&[1.0, 2.0]);
        let batches = cells_to_send(&mut list, &plan(AmountPolicy::FractionOfCells, &[]));
        assert!(batches.is_empty());
        assert_eq!(list.len(), 2);
    }
}
