//! Balancing configuration, parsed from TOML.
//!
//! ```toml
//! variant = "tdac"
//! min_fraction_of_cells_to_send = 0.02
//! max_iter_update = 5
//!
//! [solver]
//! kind = "ode"
//! thermo = "arrhenius"
//!
//! [tabulation]
//! tolerance = 1e-3
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// Which item representation and solve strategy the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Integrate every cell.
    #[default]
    Plain,
    /// Tabulation with dynamic adaptive chemistry reduction.
    Tdac,
}

/// How a planned transfer amount is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountPolicy {
    /// Fraction of the donor's local cell count.
    FractionOfCells,
    /// Absolute cost budget in seconds.
    CostBudget,
}

/// Integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Leaves the state untouched.
    None,
    /// Implicit Euler sub-steps.
    #[default]
    EulerImplicit,
    /// Adaptive implicit integrator with step-doubling error control.
    Ode,
}

/// Rate-constant model of the reference mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermoKind {
    /// Temperature-independent rate constants.
    Constant,
    /// Arrhenius rate constants `A exp(-Ta / T)`.
    #[default]
    Arrhenius,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub kind: SolverKind,
    pub thermo: ThermoKind,
    /// Fraction of the fastest chemical time scale used as the next sub-step.
    pub c_tau_chem: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
    /// Upper bound on internal steps per call before giving up.
    pub max_steps: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::default(),
            thermo: ThermoKind::default(),
            c_tau_chem: 0.05,
            abs_tol: 1e-8,
            rel_tol: 1e-4,
            max_steps: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulationConfig {
    /// Radius of the region of accuracy for a new table entry.
    pub tolerance: f64,
    /// Entries may grow to this multiple of `tolerance`.
    pub max_growth: f64,
    /// Table capacity; least-used entries are evicted beyond it.
    pub max_entries: usize,
    /// Normalized rate below which a species is dropped from the reduced mechanism.
    pub reduction_tolerance: f64,
}

impl Default for TabulationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_growth: 4.0,
            max_entries: 10_000,
            reduction_tolerance: 1e-4,
        }
    }
}

/// Top-level balancing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    pub variant: Variant,
    /// Transfers smaller than this fraction of the donor's load are skipped.
    pub min_fraction_of_cells_to_send: f64,
    /// Steps between transfer-plan refreshes.
    pub max_iter_update: u32,
    /// Upper bound on a cell's chemical time scale.
    pub delta_t_chem_max: f64,
    /// Overrides the variant's default amount policy.
    pub amount_policy: Option<AmountPolicy>,
    pub solver: SolverConfig,
    pub tabulation: TabulationConfig,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Plain,
            min_fraction_of_cells_to_send: 0.02,
            max_iter_update: 1,
            delta_t_chem_max: f64::MAX,
            amount_policy: None,
            solver: SolverConfig::default(),
            tabulation: TabulationConfig::default(),
        }
    }
}

impl BalanceConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: BalanceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let f = self.min_fraction_of_cells_to_send;
        if !(0.0..=1.0).contains(&f) {
            return Err(invalid("min_fraction_of_cells_to_send", format!("{f} not in [0, 1]")));
        }
        if self.max_iter_update == 0 {
            return Err(invalid("max_iter_update", "must be at least 1".to_string()));
        }
        if !is_positive(self.delta_t_chem_max) {
            return Err(invalid("delta_t_chem_max", "must be positive".to_string()));
        }
        if !is_positive(self.solver.c_tau_chem) {
            return Err(invalid("solver.c_tau_chem", "must be positive".to_string()));
        }
        if self.solver.max_steps == 0 {
            return Err(invalid("solver.max_steps", "must be at least 1".to_string()));
        }
        if !is_positive(self.tabulation.tolerance) {
            return Err(invalid("tabulation.tolerance", "must be positive".to_string()));
        }
        if self.tabulation.max_growth < 1.0 {
            return Err(invalid("tabulation.max_growth", "must be at least 1".to_string()));
        }
        if self.tabulation.max_entries == 0 {
            return Err(invalid("tabulation.max_entries", "must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn is_positive(x: f64) -> bool {
    x > 0.0
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
