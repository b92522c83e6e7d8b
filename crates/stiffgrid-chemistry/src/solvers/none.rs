//! Solver that leaves the chemistry frozen.

use stiff_core::ChemState;

use crate::error::IntegrationError;
use crate::solver::{ChemistrySolver, check_state};

#[derive(Debug, Clone)]
pub struct NoChemistry {
    n_species: usize,
    thermo: &'static str,
}

impl NoChemistry {
    pub fn new(n_species: usize, thermo: &'static str) -> Self {
        Self { n_species, thermo }
    }
}

impl ChemistrySolver for NoChemistry {
    fn name(&self) -> String {
        format!("none<{}>", self.thermo)
    }

    fn n_species(&self) -> usize {
        self.n_species
    }

    fn step(
        &self,
        state: &mut ChemState,
        delta_t: f64,
        _sub_delta_t: f64,
    ) -> Result<f64, IntegrationError> {
        check_state(state, self.n_species)?;
        Ok(delta_t)
    }

    fn production_rates(&self, _state: &ChemState) -> Vec<f64> {
        vec![0.0; self.n_species]
    }
}
