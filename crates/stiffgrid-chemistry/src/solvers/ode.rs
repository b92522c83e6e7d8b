//! Adaptive implicit integrator with step-doubling error control.
//!
//! Each trial step is taken once over `h` and twice over `h / 2`; the
//! difference estimates the local error. Accepted steps keep the two
//! half-step result.

use stiff_core::{ChemState, SolverConfig};
use tracing::trace;

use crate::error::IntegrationError;
use crate::mechanism::{RateModel, chain_rhs, implicit_euler_chain};
use crate::solver::{ChemistrySolver, check_finite, check_state, check_step};

const MIN_STEP: f64 = 1e-30;

pub struct Ode<R: RateModel> {
    rates: R,
    abs_tol: f64,
    rel_tol: f64,
    max_steps: u32,
}

impl<R: RateModel> Ode<R> {
    pub fn new(rates: R, config: &SolverConfig) -> Self {
        Self {
            rates,
            abs_tol: config.abs_tol,
            rel_tol: config.rel_tol,
            max_steps: config.max_steps,
        }
    }

    fn error_norm(&self, coarse: &[f64], fine: &[f64]) -> f64 {
        coarse
            .iter()
            .zip(fine)
            .map(|(c, f)| (f - c).abs() / (self.abs_tol + self.rel_tol * f.abs()))
            .fold(0.0, f64::max)
    }
}

impl<R: RateModel> ChemistrySolver for Ode<R> {
    fn name(&self) -> String {
        format!("ode<{}>", self.rates.label())
    }

    fn n_species(&self) -> usize {
        self.rates.n_species()
    }

    fn step(
        &self,
        state: &mut ChemState,
        delta_t: f64,
        sub_delta_t: f64,
    ) -> Result<f64, IntegrationError> {
        let n = self.n_species();
        check_state(state, n)?;
        check_step(delta_t)?;

        let mut k = vec![0.0; n];
        self.rates.rate_constants(state.t, &mut k);

        let mut h = if sub_delta_t.is_finite() && sub_delta_t > 0.0 {
            sub_delta_t.min(delta_t)
        } else {
            delta_t
        };
        let mut last_accepted = h;
        let mut elapsed = 0.0;
        let mut steps = 0u32;

        let mut coarse = vec![0.0; n];
        let mut half = vec![0.0; n];
        let mut fine = vec![0.0; n];

        while elapsed < delta_t {
            steps += 1;
            if steps > self.max_steps {
                return Err(IntegrationError::MaxSteps {
                    steps: self.max_steps,
                });
            }
            if h < MIN_STEP {
                return Err(IntegrationError::StepUnderflow { h });
            }
            let h_try = h.min(delta_t - elapsed);

            implicit_euler_chain(&k, &state.y, h_try, &mut coarse);
            implicit_euler_chain(&k, &state.y, 0.5 * h_try, &mut half);
            implicit_euler_chain(&k, &half, 0.5 * h_try, &mut fine);
            check_finite(&fine)?;

            let err = self.error_norm(&coarse, &fine);
            let factor = if err > 0.0 { 0.9 / err.sqrt() } else { 4.0 };

            if err <= 1.0 {
                state.y.copy_from_slice(&fine);
                elapsed += h_try;
                last_accepted = h_try;
                h = h_try * factor.min(4.0);
            } else {
                h = h_try * factor.max(0.2);
            }
        }

        trace!(steps, h = last_accepted, "ode step complete");
        Ok(h.max(last_accepted))
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
