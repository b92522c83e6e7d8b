//! Solver registry keyed by (solver kind, thermo kind).
//!
//! Each supported combination is registered once with a factory; the
//! driver asks the registry for a solver at startup instead of matching on
//! configuration itself.

use std::collections::HashMap;

use stiff_core::{SolverConfig, SolverKind, ThermoKind};
use tracing::debug;

use crate::error::RegistryError;
use crate::mechanism::{ArrheniusRates, ConstantRates, MechanismSpec};
use crate::solver::ChemistrySolver;
use crate::solvers::{EulerImplicit, NoChemistry, Ode};

/// Builds a solver for a mechanism.
pub type SolverFactory = fn(&MechanismSpec, &SolverConfig) -> Box<dyn ChemistrySolver>;

#[derive(Default)]
pub struct SolverRegistry {
    factories: HashMap<(SolverKind, ThermoKind), SolverFactory>,
}

impl SolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in combination.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SolverKind::None, ThermoKind::Constant, |spec, _| {
            Box::new(NoChemistry::new(spec.n_species, "constant"))
        });
        registry.register(SolverKind::None, ThermoKind::Arrhenius, |spec, _| {
            Box::new(NoChemistry::new(spec.n_species, "arrhenius"))
        });
        registry.register(SolverKind::EulerImplicit, ThermoKind::Constant, |spec, cfg| {
            Box::new(EulerImplicit::new(ConstantRates::from_spec(spec), cfg))
        });
        registry.register(SolverKind::EulerImplicit, ThermoKind::Arrhenius, |spec, cfg| {
            Box::new(EulerImplicit::new(ArrheniusRates::from_spec(spec), cfg))
        });
        registry.register(SolverKind::Ode, ThermoKind::Constant, |spec, cfg| {
            Box::new(Ode::new(ConstantRates::from_spec(spec), cfg))
        });
        registry.register(SolverKind::Ode, ThermoKind::Arrhenius, |spec, cfg| {
            Box::new(Ode::new(ArrheniusRates::from_spec(spec), cfg))
        });
        registry
    }

    /// Register a factory, replacing any previous one for the same key.
    pub fn register(&mut self, solver: SolverKind, thermo: ThermoKind, factory: SolverFactory) {
        self.factories.insert((solver, thermo), factory);
    }

    pub fn contains(&self, solver: SolverKind, thermo: ThermoKind) -> bool {
        self.factories.contains_key(&(solver, thermo))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build the solver selected by `config`.
    pub fn create(
        &self,
        spec: &MechanismSpec,
        config: &SolverConfig,
    ) -> Result<Box<dyn ChemistrySolver>, RegistryError> {
        let factory = self
            .factories
            .get(&(config.kind, config.thermo))
            .ok_or(RegistryError::NotRegistered {
                solver: config.kind,
                thermo: config.thermo,
            })?;
        let solver = factory(spec, config);
        debug!(solver = %solver.name(), n_species = spec.n_species, "chemistry solver created");
        Ok(solver)
    }
}
