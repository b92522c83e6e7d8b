//! Dynamic adaptive reduction: picks the species that matter for a cell.
//!
//! A species is active when the magnitude of its production rate, relative
//! to the largest one in the cell, reaches the tolerance. A cell with no
//! reaction at all keeps the full mechanism.

use stiff_core::{ProcessId, TdacWorkItem};

#[derive(Debug, Clone, Copy)]
pub struct Reducer {
    tolerance: f64,
}

impl Reducer {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Active-species mask for the given production rates.
    pub fn mask_from_rates(&self, rates: &[f64]) -> Vec<bool> {
        let max = rates.iter().fold(0.0_f64, |m, r| m.max(r.abs()));
        if max <= 0.0 || !max.is_finite() {
            return vec![true; rates.len()];
        }
        rates
            .iter()
            .map(|r| r.abs() / max >= self.tolerance)
            .collect()
    }

    /// Reduce `item` on `process`, recording where the mask was computed.
    pub fn reduce(&self, item: &mut TdacWorkItem, process: ProcessId, rates: &[f64]) {
        item.active = self.mask_from_rates(rates);
        item.reduced_on = Some(process);
    }
}
