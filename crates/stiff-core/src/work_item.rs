//! Work items — the unit of migration between processes.
//!
//! A work item is a snapshot of one owned cell's chemical state plus the
//! bookkeeping needed to route its solved result home: the owning process,
//! the cell index, and whether it is currently being processed where it was
//! created. Items are rebuilt every step and never outlive one batch.
//!
//! Items cross process boundaries as JSON (`encode_items` /
//! `decode_items`). The float round trip is exact, so a decoded item is
//! field-for-field identical to the one that was sent.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cost::CostBreakdown;
use crate::types::{CellId, CellState, ChemState, ProcessId};

/// Common access to the plain item carried by every item representation.
pub trait Balanced: Serialize + DeserializeOwned + Send + 'static {
    fn base(&self) -> &WorkItem;
    fn base_mut(&mut self) -> &mut WorkItem;

    /// Accumulated cost of this item, in seconds.
    fn cost(&self) -> f64 {
        self.base().cost
    }
}

// ── Plain item ─────────────────────────────────────────────────────

/// Snapshot of one cell's chemical state in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Species mass fractions, mechanism order.
    pub y: Vec<f64>,
    /// Reaction rates, same order as `y`.
    pub rr: Vec<f64>,
    pub t: f64,
    pub p: f64,
    pub rho: f64,
    /// Macro time step to advance over.
    pub delta_t: f64,
    /// Chemical sub-step: initial guess in, characteristic time out.
    pub delta_t_chem: f64,
    /// Cost of solving this item, seconds.
    pub cost: f64,
    /// Process that owns the cell. Never changes across migration.
    pub owner: ProcessId,
    /// Cell index on the owner. Never changes across migration.
    pub cell: CellId,
    /// False once the item has been sent to another process.
    pub local: bool,
    /// Set when integration failed and the previous state was kept.
    #[serde(default)]
    pub failed: bool,
}

// Two items are never interchangeable, so list encoders must never
// collapse a batch into a single repeated value.
impl PartialEq for WorkItem {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl WorkItem {
    /// Snapshot an owned cell.
    pub fn from_cell(
        owner: ProcessId,
        cell: CellId,
        state: &CellState,
        delta_t: f64,
        carried_cost: f64,
    ) -> Self {
        Self {
            y: state.y.clone(),
            rr: vec![0.0; state.y.len()],
            t: state.t,
            p: state.p,
            rho: state.rho,
            delta_t,
            delta_t_chem: state.delta_t_chem,
            cost: carried_cost,
            owner,
            cell,
            local: true,
            failed: false,
        }
    }

    pub fn n_species(&self) -> usize {
        self.y.len()
    }

    /// Thermochemical state for the integrator.
    pub fn chem_state(&self) -> ChemState {
        ChemState {
            y: self.y.clone(),
            t: self.t,
            p: self.p,
            rho: self.rho,
        }
    }

    /// Write the solved fields back into the owned cell.
    pub fn write_back(&self, state: &mut CellState) {
        state.y.clone_from(&self.y);
        state.rr.clone_from(&self.rr);
        state.delta_t_chem = self.delta_t_chem;
    }
}

impl Balanced for WorkItem {
    fn base(&self) -> &WorkItem {
        self
    }

    fn base_mut(&mut self) -> &mut WorkItem {
        self
    }
}

// ── Tabulation-aware item ──────────────────────────────────────────

/// Work item carrying the extra state of the tabulation (TDAC) variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TdacWorkItem {
    pub base: WorkItem,
    /// Composition before solving; the tabulation key.
    #[serde(default)]
    pub phi_q: Vec<f64>,
    /// Active-species mask of the reduced mechanism. Empty until reduced.
    pub active: Vec<bool>,
    /// Process whose reducer computed `active`.
    pub reduced_on: Option<ProcessId>,
    /// True when the result came out of a table instead of integration.
    pub retrieved: bool,
    /// Per-phase cost spent on this item.
    pub breakdown: CostBreakdown,
}

impl PartialEq for TdacWorkItem {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl TdacWorkItem {
    pub fn new(base: WorkItem) -> Self {
        Self {
            phi_q: base.y.clone(),
            base,
            active: Vec::new(),
            reduced_on: None,
            retrieved: false,
            breakdown: CostBreakdown::default(),
        }
    }

    /// Number of species in the reduced mechanism.
    pub fn n_species_reduced(&self) -> usize {
        self.active.iter().filter(|a| **a).count()
    }
}

impl Balanced for TdacWorkItem {
    fn base(&self) -> &WorkItem {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WorkItem {
        &mut self.base
    }
}

// ── Stream encoding ────────────────────────────────────────────────

/// Encode a batch of items for transfer.
pub fn encode_items<T: Serialize>(items: &[T]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(items)
}

/// Decode a batch of items received from a peer.
pub fn decode_items<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<Vec<T>> {
    serde_json::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::Phase;

    fn sample_item() -> WorkItem {
        let state = CellState {
            y: vec![0.1, 0.2, 0.3000000000000001, 0.4, 1e-300],
            rr: vec![0.0; 5],
            t: 1834.123456789,
            p: 101_325.0,
            rho: 0.193_847_561_234,
            delta_t_chem: 3.3e-7,
        };
        let mut item = WorkItem::from_cell(2, 17, &state, 1e-5, 0.0421);
        item.rr = vec![-1.5e3, 2.0 / 3.0, 0.0, 7.1e-12, -0.0];
        item.local = false;
        item
    }

    #[test]
    fn work_items_are_never_equal() {
        let item = sample_item();
        let copy = item.clone();
        assert!(item != copy);
        assert!(!item.eq(&copy));
    }

    #[test]
    fn plain_item_round_trips_exactly() {
        let item = sample_item();
        let bytes = encode_items(std::slice::from_ref(&item)).unwrap();
        let decoded: Vec<WorkItem> = decode_items(&bytes).unwrap();

        assert_eq!(decoded.len(), 1);
        let d = &decoded[0];
        assert_eq!(d.y, item.y);
        assert_eq!(d.rr, item.rr);
        assert_eq!(d.t.to_bits(), item.t.to_bits());
        assert_eq!(d.rho.to_bits(), item.rho.to_bits());
        assert_eq!(d.delta_t_chem, item.delta_t_chem);
        assert_eq!(d.cost, item.cost);
        assert_eq!((d.owner, d.cell, d.local), (2, 17, false));
    }

    #[test]
    fn tdac_item_round_trips_tabulation_state() {
        let mut item = TdacWorkItem::new(sample_item());
        item.active = vec![true, false, true, true, false];
        item.reduced_on = Some(2);
        item.breakdown.add(Phase::Reduce, 1.25e-4);

        let bytes = encode_items(&[item.clone(), item.clone()]).unwrap();
        let decoded: Vec<TdacWorkItem> = decode_items(&bytes).unwrap();

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].active, item.active);
        assert_eq!(decoded[1].reduced_on, Some(2));
        assert_eq!(decoded[1].n_species_reduced(), 3);
        assert_eq!(decoded[1].breakdown, item.breakdown);
        assert_eq!(decoded[1].base.cell, 17);
        assert_eq!(decoded[1].phi_q, item.base.y);
    }
}
