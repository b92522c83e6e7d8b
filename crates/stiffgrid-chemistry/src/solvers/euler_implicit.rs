//! Implicit Euler over the whole requested step.

use stiff_core::{ChemState, SolverConfig};

use crate::error::IntegrationError;
use crate::mechanism::{RateModel, chain_rhs, implicit_euler_chain};
use crate::solver::{ChemistrySolver, check_finite, check_state, check_step};

/// Mass fraction share below which a species does not limit the sub-step.
const SIGNIFICANT: f64 = 1e-3;

pub struct EulerImplicit<R: RateModel> {
    rates: R,
    /// Fraction of the fastest chemical time scale recommended as sub-step.
    c_tau_chem: f64,
}

impl<R: RateModel> EulerImplicit<R> {
    pub fn new(rates: R, config: &SolverConfig) -> Self {
        Self {
            rates,
            c_tau_chem: config.c_tau_chem,
        }
    }
}

impl<R: RateModel> ChemistrySolver for EulerImplicit<R> {
    fn name(&self) -> String {
        format!("euler_implicit<{}>", self.rates.label())
    }

    fn n_species(&self) -> usize {
        self.rates.n_species()
    }

    fn step(
        &self,
        state: &mut ChemState,
        delta_t: f64,
        _sub_delta_t: f64,
    ) -> Result<f64, IntegrationError> {
        let n = self.n_species();
        check_state(state, n)?;
        check_step(delta_t)?;

        let mut k = vec![0.0; n];
        self.rates.rate_constants(state.t, &mut k);

        let mut next = vec![0.0; n];
        implicit_euler_chain(&k, &state.y, delta_t, &mut next);
        check_finite(&next)?;

        // Fastest reaction among species that hold a significant share of
        // the mass; trace species sit in quasi-steady state.
        let total: f64 = next.iter().sum();
        let k_max = next
            .iter()
            .zip(&k)
            .filter(|(y, _)| **y > SIGNIFICANT * total)
            .map(|(_, k)| *k)
            .fold(0.0, f64::max);

        state.y = next;

        if k_max > 0.0 {
            Ok((self.c_tau_chem / k_max).min(2.0 * delta_t))
        } else {
            Ok(2.0 * delta_t)
        }
    }

    fn production_rates(&self, state: &ChemState) -> Vec<f64> {
        let n = self.n_species();
        let mut k = vec![0.0; n];
        self.rates.rate_constants(state.t, &mut k);
        let mut dydt = vec![0.0; n];
        chain_rhs(&k, &state.y, &mut dydt);
        dydt
    }
}
