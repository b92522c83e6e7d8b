//! Shared types used across stiffgrid crates.

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Rank of a worker process within the fixed SPMD group.
pub type ProcessId = usize;

/// Index of a cell within its owning process's partition.
pub type CellId = usize;

// ── Owned cell state ───────────────────────────────────────────────

/// Live chemical state of one owned cell, as held by the host simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    /// Species mass fractions.
    pub y: Vec<f64>,
    /// Reaction rates from the last solve (kg/m³/s).
    pub rr: Vec<f64>,
    /// Temperature [K].
    pub t: f64,
    /// Pressure [Pa].
    pub p: f64,
    /// Density [kg/m³].
    pub rho: f64,
    /// Chemical time scale from the last solve, also the next sub-step guess.
    pub delta_t_chem: f64,
}

impl CellState {
    /// A quiescent cell with zero reaction rates.
    pub fn new(y: Vec<f64>, t: f64, p: f64, rho: f64, delta_t_chem: f64) -> Self {
        let rr = vec![0.0; y.len()];
        Self { y, rr, t, p, rho, delta_t_chem }
    }
}

/// The partition of cells owned by one process.
///
/// The species count is fixed by the mechanism and identical for every
/// cell of the field.
#[derive(Debug, Clone, Default)]
pub struct CellField {
    n_species: usize,
    cells: Vec<CellState>,
}

impl CellField {
    /// Create an empty field for a mechanism with `n_species` species.
    pub fn new(n_species: usize) -> Self {
        Self {
            n_species,
            cells: Vec::new(),
        }
    }

    /// Build a field from existing cells, checking species lengths.
    pub fn from_cells(n_species: usize, cells: Vec<CellState>) -> Result<Self, FieldError> {
        let mut field = Self::new(n_species);
        for cell in cells {
            field.push(cell)?;
        }
        Ok(field)
    }

    /// Append a cell. Its species and rate vectors must match the mechanism.
    pub fn push(&mut self, cell: CellState) -> Result<CellId, FieldError> {
        let id = self.cells.len();
        if cell.y.len() != self.n_species || cell.rr.len() != self.n_species {
            return Err(FieldError::SpeciesMismatch {
                cell: id,
                expected: self.n_species,
                found: cell.y.len().max(cell.rr.len()),
            });
        }
        self.cells.push(cell);
        Ok(id)
    }

    pub fn n_species(&self) -> usize {
        self.n_species
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, cell: CellId) -> Option<&CellState> {
        self.cells.get(cell)
    }

    pub fn get_mut(&mut self, cell: CellId) -> Option<&mut CellState> {
        self.cells.get_mut(cell)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellState> {
        self.cells.iter()
    }

    /// Smallest chemical time scale over the field, `None` when empty.
    pub fn min_delta_t_chem(&self) -> Option<f64> {
        self.cells
            .iter()
            .map(|c| c.delta_t_chem)
            .min_by(f64::total_cmp)
    }
}

// ── Chemical state handed to the integrator ────────────────────────

/// Thermochemical state advanced by a chemistry solver.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemState {
    pub y: Vec<f64>,
    pub t: f64,
    pub p: f64,
    pub rho: f64,
}

// ── Macro time step ────────────────────────────────────────────────

/// Source of the macro time step for each cell: uniform or per cell.
pub trait DeltaTField {
    fn delta_t(&self, cell: CellId) -> f64;

    /// Number of cells the field has a value for, `None` when uniform.
    fn covered_cells(&self) -> Option<usize> {
        None
    }
}

impl DeltaTField for f64 {
    fn delta_t(&self, _cell: CellId) -> f64 {
        *self
    }
}

impl DeltaTField for [f64] {
    fn delta_t(&self, cell: CellId) -> f64 {
        self[cell]
    }

    fn covered_cells(&self) -> Option<usize> {
        Some(self.len())
    }
}

impl DeltaTField for Vec<f64> {
    fn delta_t(&self, cell: CellId) -> f64 {
        self[cell]
    }

    fn covered_cells(&self) -> Option<usize> {
        Some(self.len())
    }
}
