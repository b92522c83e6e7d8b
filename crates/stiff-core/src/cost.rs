//! Profiling phases and per-phase cost accumulation.
//!
//! Costs are wall-clock seconds. The plain variant only ever records
//! `Phase::Integrate`; the tabulation variant records every phase.

use serde::{Deserialize, Serialize};

/// A named section of the per-cell chemistry work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Searching the tabulation table for a stored result.
    Search,
    /// Computing the reduced mechanism (active species mask).
    Reduce,
    /// Integrating the stiff ODE system.
    Integrate,
    /// Growing the region of accuracy of an existing table entry.
    Grow,
    /// Adding a new leaf to the table.
    AddLeaf,
    /// Bookkeeping of inserting into the table (eviction, counters).
    AddToTable,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Search,
        Phase::Reduce,
        Phase::Integrate,
        Phase::Grow,
        Phase::AddLeaf,
        Phase::AddToTable,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Search => "search",
            Phase::Reduce => "reduce",
            Phase::Integrate => "integrate",
            Phase::Grow => "grow",
            Phase::AddLeaf => "add_leaf",
            Phase::AddToTable => "add_to_table",
        }
    }
}

/// Accumulated cost per phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub search: f64,
    pub reduce: f64,
    pub integrate: f64,
    pub grow: f64,
    pub add_leaf: f64,
    pub add_to_table: f64,
}

impl CostBreakdown {
    pub fn add(&mut self, phase: Phase, seconds: f64) {
        *self.slot_mut(phase) += seconds;
    }

    pub fn get(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Search => self.search,
            Phase::Reduce => self.reduce,
            Phase::Integrate => self.integrate,
            Phase::Grow => self.grow,
            Phase::AddLeaf => self.add_leaf,
            Phase::AddToTable => self.add_to_table,
        }
    }

    /// Sum over all phases.
    pub fn total(&self) -> f64 {
        Phase::ALL.iter().map(|p| self.get(*p)).sum()
    }

    /// Phases that always run on the owner, before work is distributed.
    pub fn pinned(&self) -> f64 {
        self.search + self.reduce
    }

    /// Add every phase of `other` into `self`.
    pub fn merge(&mut self, other: &CostBreakdown) {
        for phase in Phase::ALL {
            self.add(phase, other.get(phase));
        }
    }

    fn slot_mut(&mut self, phase: Phase) -> &mut f64 {
        match phase {
            Phase::Search => &mut self.search,
            Phase::Reduce => &mut self.reduce,
            Phase::Integrate => &mut self.integrate,
            Phase::Grow => &mut self.grow,
            Phase::AddLeaf => &mut self.add_leaf,
            Phase::AddToTable => &mut self.add_to_table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_accumulates_and_merges() {
        let mut a = CostBreakdown::default();
        a.add(Phase::Search, 0.5);
        a.add(Phase::Integrate, 2.0);
        a.add(Phase::Integrate, 1.0);

        let mut b = CostBreakdown::default();
        b.add(Phase::Grow, 0.25);
        b.merge(&a);

        assert_eq!(a.integrate, 3.0);
        assert_eq!(a.total(), 3.5);
        assert_eq!(b.total(), 3.75);
        assert_eq!(b.get(Phase::Search), 0.5);
        assert_eq!(b.pinned(), 0.5);
    }
}
