//! In-situ tabulation of solved chemistry.
//!
//! A table maps an input composition (plus temperature, pressure and macro
//! step) to the solved output. Each entry owns a region of accuracy: a
//! max-norm ball over the entry's active species. Lookups inside the ball
//! retrieve the stored result; inactive species keep the query values.
//!
//! On insert the nearest entry is grown to cover the new point when its
//! stored result predicts the new one within tolerance. Otherwise a new leaf
//! is added. Beyond capacity the least-used entry is evicted.
//!
//! A table is owned by one process. Masks computed on another process are
//! only accepted when the caller asks for them to be recomputed here.

use stiff_core::{ProcessId, TabulationConfig, TdacWorkItem};
use tracing::{debug, trace};

use crate::error::TableError;
use crate::reduction::Reducer;

const SAME_POINT: f64 = 1e-12;

/// Result retrieved from a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableHit {
    pub y: Vec<f64>,
    pub delta_t_chem: f64,
    /// Distance from the query to the entry's key.
    pub distance: f64,
}

impl TableHit {
    /// Write the retrieved result into `item` and mark it retrieved.
    pub fn apply(&self, item: &mut TdacWorkItem) {
        item.base.y.clone_from(&self.y);
        item.base.delta_t_chem = self.delta_t_chem;
        item.retrieved = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertKind {
    /// An existing entry's region of accuracy was enlarged.
    Grew,
    /// A new entry was stored.
    AddedLeaf,
    /// The same point was already stored; its result was replaced.
    Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub kind: InsertKind,
    pub evicted: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub lookups: u64,
    pub hits: u64,
    pub grown: u64,
    pub added: u64,
    pub refreshed: u64,
    pub evicted: u64,
    /// Inserts of results solved for another process.
    pub foreign_inserts: u64,
}

impl TableStats {
    pub fn misses(&self) -> u64 {
        self.lookups - self.hits
    }

    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Tabulation seen by the driver.
pub trait Tabulation: Send {
    fn lookup(&mut self, item: &TdacWorkItem) -> Option<TableHit>;

    /// Store the solved `item`. `is_local` tells whether the item belongs to
    /// this table's process. With `requires_recompute` the stored entry gets
    /// an active-species mask recomputed here from the item's rates; the
    /// item itself is left untouched.
    fn insert(
        &mut self,
        item: &TdacWorkItem,
        is_local: bool,
        requires_recompute: bool,
    ) -> Result<InsertOutcome, TableError>;

    fn stats(&self) -> TableStats;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── In-memory table ────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    phi: Vec<f64>,
    t: f64,
    p: f64,
    delta_t: f64,
    y_out: Vec<f64>,
    delta_t_chem: f64,
    active: Vec<bool>,
    radius: f64,
    hits: u64,
    last_used: u64,
}

impl Entry {
    /// Max-norm distance over active species, temperature and pressure.
    /// `None` when the macro step differs.
    fn distance(&self, phi: &[f64], t: f64, p: f64, delta_t: f64) -> Option<f64> {
        if (self.delta_t - delta_t).abs() > SAME_POINT * self.delta_t.abs().max(1.0) {
            return None;
        }
        let species = self
            .phi
            .iter()
            .zip(phi)
            .zip(&self.active)
            .filter(|(_, active)| **active)
            .map(|((k, q), _)| (k - q).abs())
            .fold(0.0, f64::max);
        let dt = (self.t - t).abs() / self.t.abs().max(1.0);
        let dp = (self.p - p).abs() / self.p.abs().max(1.0);
        Some(species.max(dt).max(dp))
    }

    /// Zero-order retrieval for the query composition.
    fn retrieve(&self, phi: &[f64]) -> Vec<f64> {
        self.y_out
            .iter()
            .zip(phi)
            .zip(&self.active)
            .map(|((out, q), active)| if *active { *out } else { *q })
            .collect()
    }
}

/// Linear-scan tabulation with grow-or-add insertion and least-used eviction.
pub struct IsatTable {
    owner: ProcessId,
    n_species: usize,
    tolerance: f64,
    max_growth: f64,
    max_entries: usize,
    reducer: Reducer,
    entries: Vec<Entry>,
    tick: u64,
    stats: TableStats,
}

impl IsatTable {
    pub fn new(owner: ProcessId, n_species: usize, config: &TabulationConfig) -> Self {
        Self {
            owner,
            n_species,
            tolerance: config.tolerance,
            max_growth: config.max_growth,
            max_entries: config.max_entries.max(1),
            reducer: Reducer::new(config.reduction_tolerance),
            entries: Vec::new(),
            tick: 0,
            stats: TableStats::default(),
        }
    }

    fn query_key(item: &TdacWorkItem) -> &[f64] {
        if item.phi_q.is_empty() {
            &item.base.y
        } else {
            &item.phi_q
        }
    }

    fn nearest(&self, item: &TdacWorkItem) -> Option<(usize, f64)> {
        let phi = Self::query_key(item);
        let b = &item.base;
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.distance(phi, b.t, b.p, b.delta_t).map(|d| (i, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.entries.len() > self.max_entries {
            let victim = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| (e.hits, e.last_used))
                .map(|(i, _)| i);
            match victim {
                Some(i) => {
                    self.entries.swap_remove(i);
                    evicted += 1;
                }
                None => break,
            }
        }
        if evicted > 0 {
            self.stats.evicted += evicted as u64;
            debug!(owner = self.owner, evicted, "tabulation entries evicted");
        }
        evicted
    }
}

impl Tabulation for IsatTable {
    fn lookup(&mut self, item: &TdacWorkItem) -> Option<TableHit> {
        self.tick += 1;
        self.stats.lookups += 1;

        let (index, distance) = self.nearest(item)?;
        let tick = self.tick;
        let entry = &mut self.entries[index];
        if distance > entry.radius {
            return None;
        }

        entry.hits += 1;
        entry.last_used = tick;
        self.stats.hits += 1;
        trace!(owner = self.owner, cell = item.base.cell, distance, "table hit");

        Some(TableHit {
            y: entry.retrieve(Self::query_key(item)),
            delta_t_chem: entry.delta_t_chem,
            distance,
        })
    }

    fn insert(
        &mut self,
        item: &TdacWorkItem,
        is_local: bool,
        requires_recompute: bool,
    ) -> Result<InsertOutcome, TableError> {
        let (owner, cell) = (item.base.owner, item.base.cell);
        if item.base.failed {
            return Err(TableError::FailedItem { owner, cell });
        }
        if item.base.y.len() != self.n_species {
            return Err(TableError::SpeciesMismatch {
                expected: self.n_species,
                found: item.base.y.len(),
            });
        }

        let mut active = if requires_recompute {
            self.reducer.mask_from_rates(&item.base.rr)
        } else if item.reduced_on == Some(self.owner) {
            item.active.clone()
        } else {
            return Err(TableError::StaleReducedMechanism {
                owner,
                cell,
                reduced_on: item.reduced_on,
                table_owner: self.owner,
            });
        };
        if active.len() != self.n_species {
            active = vec![true; self.n_species];
        }

        self.tick += 1;
        if !is_local {
            self.stats.foreign_inserts += 1;
        }

        let phi = Self::query_key(item).to_vec();
        let tick = self.tick;
        let tolerance = self.tolerance;
        let growth_limit = self.tolerance * self.max_growth;

        let kind = match self.nearest(item) {
            Some((i, d)) if d <= SAME_POINT => {
                let entry = &mut self.entries[i];
                entry.y_out.clone_from(&item.base.y);
                entry.delta_t_chem = item.base.delta_t_chem;
                entry.active = active;
                entry.last_used = tick;
                InsertKind::Refreshed
            }
            Some((i, d)) if d <= growth_limit && {
                let predicted = self.entries[i].retrieve(&phi);
                let error = predicted
                    .iter()
                    .zip(&item.base.y)
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, f64::max);
                error <= tolerance
            } =>
            {
                let entry = &mut self.entries[i];
                entry.radius = entry.radius.max(d);
                entry.last_used = tick;
                InsertKind::Grew
            }
            _ => {
                self.entries.push(Entry {
                    phi,
                    t: item.base.t,
                    p: item.base.p,
                    delta_t: item.base.delta_t,
                    y_out: item.base.y.clone(),
                    delta_t_chem: item.base.delta_t_chem,
                    active,
                    radius: tolerance,
                    hits: 0,
                    last_used: tick,
                });
                InsertKind::AddedLeaf
            }
        };

        match kind {
            InsertKind::Grew => self.stats.grown += 1,
            InsertKind::AddedLeaf => self.stats.added += 1,
            InsertKind::Refreshed => self.stats.refreshed += 1,
        }
        let evicted = self.evict();
        trace!(owner = self.owner, cell, ?kind, is_local, "table insert");

        Ok(InsertOutcome { kind, evicted })
    }

    fn stats(&self) -> TableStats {
        self.stats
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
