//! Solver boundary — advances one cell's chemical state.

use stiff_core::ChemState;

use crate::error::IntegrationError;

/// Integrates one cell's chemistry.
///
/// `step` advances `state` over `delta_t` starting from the sub-step guess
/// `sub_delta_t` and returns the sub-step it recommends next. The caller
/// loops until the macro step is covered. A failed step may leave `state`
/// modified; callers keep their own copy to fall back on.
pub trait ChemistrySolver: Send + Sync {
    /// Registry name, e.g. `ode<arrhenius>`.
    fn name(&self) -> String;

    fn n_species(&self) -> usize;

    fn step(
        &self,
        state: &mut ChemState,
        delta_t: f64,
        sub_delta_t: f64,
    ) -> Result<f64, IntegrationError>;

    /// Species mass-fraction rates `dY/dt` at `state`.
    fn production_rates(&self, state: &ChemState) -> Vec<f64>;
}

/// Reject states that do not match the mechanism or contain garbage.
pub(crate) fn check_state(state: &ChemState, n_species: usize) -> Result<(), IntegrationError> {
    if state.y.len() != n_species {
        return Err(IntegrationError::SpeciesMismatch {
            expected: n_species,
            found: state.y.len(),
        });
    }
    check_finite(&state.y)
}

pub(crate) fn check_finite(y: &[f64]) -> Result<(), IntegrationError> {
    match y.iter().position(|v| !v.is_finite()) {
        Some(species) => Err(IntegrationError::NonFinite { species }),
        None => Ok(()),
    }
}

pub(crate) fn check_step(delta_t: f64) -> Result<(), IntegrationError> {
    if delta_t.is_finite() && delta_t > 0.0 {
        Ok(())
    } else {
        Err(IntegrationError::InvalidStep(delta_t))
    }
}
