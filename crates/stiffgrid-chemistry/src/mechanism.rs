//! Reference mechanism: a first-order decay chain.
//!
//! Species `i` decays into species `i + 1` with rate constant `k_i`; the
//! last species is inert. The chain conserves total mass, and spreading
//! the pre-exponential factors over many decades makes the system stiff.
//!
//! ```text
//! dY_i/dt = -k_i Y_i + k_{i-1} Y_{i-1}
//! ```

use serde::{Deserialize, Serialize};

/// Rate parameters of the decay chain, one entry per reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanismSpec {
    pub n_species: usize,
    /// Pre-exponential factors [1/s], length `n_species - 1`.
    pub pre_exponential: Vec<f64>,
    /// Activation temperatures [K], length `n_species - 1`.
    pub activation_temperature: Vec<f64>,
    /// Temperature at which constant-rate models evaluate the Arrhenius law.
    pub reference_temperature: f64,
}

impl MechanismSpec {
    /// A stiff chain: reaction `i` is two decades faster than reaction `i - 1`.
    pub fn reference(n_species: usize) -> Self {
        let n_reactions = n_species.saturating_sub(1);
        Self {
            n_species,
            pre_exponential: (0..n_reactions).map(|i| 10f64.powi(3 + 2 * i as i32)).collect(),
            activation_temperature: (0..n_reactions).map(|i| 6000.0 + 1500.0 * i as f64).collect(),
            reference_temperature: 1500.0,
        }
    }

    pub fn n_reactions(&self) -> usize {
        self.pre_exponential.len()
    }
}

/// Evaluates the chain's rate constants at a temperature.
pub trait RateModel: Send + Sync {
    fn label(&self) -> &'static str;

    fn n_species(&self) -> usize;

    /// Fill `k` (length `n_species`) with rate constants; `k[n - 1]` is 0.
    fn rate_constants(&self, t: f64, k: &mut [f64]);
}

/// Temperature-independent rates, frozen at the reference temperature.
#[derive(Debug, Clone)]
pub struct ConstantRates {
    k: Vec<f64>,
}

impl ConstantRates {
    pub fn from_spec(spec: &MechanismSpec) -> Self {
        let t = spec.reference_temperature;
        let mut k: Vec<f64> = spec
            .pre_exponential
            .iter()
            .zip(&spec.activation_temperature)
            .map(|(a, ta)| a * (-ta / t).exp())
            .collect();
        k.resize(spec.n_species, 0.0);
        Self { k }
    }
}

impl RateModel for ConstantRates {
    fn label(&self) -> &'static str {
        "constant"
    }

    fn n_species(&self) -> usize {
        self.k.len()
    }

    fn rate_constants(&self, _t: f64, k: &mut [f64]) {
        k.copy_from_slice(&self.k);
    }
}

/// Arrhenius rates `A exp(-Ta / T)`.
#[derive(Debug, Clone)]
pub struct ArrheniusRates {
    a: Vec<f64>,
    ta: Vec<f64>,
    n_species: usize,
}

impl ArrheniusRates {
    pub fn from_spec(spec: &MechanismSpec) -> Self {
        Self {
            a: spec.pre_exponential.clone(),
            ta: spec.activation_temperature.clone(),
            n_species: spec.n_species,
        }
    }
}

impl RateModel for ArrheniusRates {
    fn label(&self) -> &'static str {
        "arrhenius"
    }

    fn n_species(&self) -> usize {
        self.n_species
    }

    fn rate_constants(&self, t: f64, k: &mut [f64]) {
        k.iter_mut().for_each(|x| *x = 0.0);
        for (i, (a, ta)) in self.a.iter().zip(&self.ta).enumerate() {
            k[i] = a * (-ta / t.max(1.0)).exp();
        }
    }
}

/// Right-hand side of the chain: `dY/dt` for rate constants `k`.
pub fn chain_rhs(k: &[f64], y: &[f64], dydt: &mut [f64]) {
    let mut inflow = 0.0;
    for i in 0..y.len() {
        let outflow = k[i] * y[i];
        dydt[i] = inflow - outflow;
        inflow = outflow;
    }
}

/// One implicit Euler step of the chain over `h`, exact for the
/// lower-bidiagonal Jacobian: forward substitution, no iteration.
pub fn implicit_euler_chain(k: &[f64], y: &[f64], h: f64, out: &mut [f64]) {
    let mut prev = 0.0;
    for i in 0..y.len() {
        let inflow = if i == 0 { 0.0 } else { h * k[i - 1] * prev };
        out[i] = (y[i] + inflow) / (1.0 + h * k[i]);
        prev = out[i];
    }
}
