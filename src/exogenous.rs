//! Sets on FADs replayed from observed data.
//!
//! Each observed set is matched greedily against the simulated FADs near where
//! it happened. Matched FADs are fished out; the distance between observed and
//! simulated catch is accumulated as a calibration error.

use crate::biology::Species;
use crate::fad::FadId;
use crate::fad_map::{FadMap, FadRemoval};
use crate::gear::AbundanceGear;
use crate::ocean::{Cell, NauticalMap};
use crate::stats::Counter;
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Error charged for an observation that falls outside the map.
pub const OUT_OF_BOUNDS_FAD_ERROR: f64 = 0.0;

/// Default error charged for an observation no simulated FAD could match.
pub const DEFAULT_MISSING_FAD_ERROR: f64 = 10_000.0;

pub const ERROR: &str = "Error";
pub const FAILED_MATCHES: &str = "Failed Matches";
pub const MATCHES: &str = "Matches";
pub const OUT_OF_BOUNDS: &str = "Out of Bounds";

/// One set on a FAD found in the data.
#[derive(Debug, Clone, PartialEq)]
pub struct FadSetObservation {
    pub day: u32,
    pub lon: f64,
    pub lat: f64,
    /// Biomass caught, per species.
    pub biomass: Vec<f64>,
}

/// How often the counters go back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetInterval {
    EveryStep,
    EveryYear,
}

#[derive(Debug, Clone)]
pub struct ExogenousFadSetter {
    observations: BTreeMap<u32, Vec<FadSetObservation>>,
    counter: Counter,
    missing_fad_error: f64,
    neighborhood: usize,
    simulated_to_data_scale: f64,
    reset_interval: ResetInterval,
    log: Option<String>,
}

impl ExogenousFadSetter {
    pub fn new(observations: Vec<FadSetObservation>) -> Self {
        let mut by_day: BTreeMap<u32, Vec<FadSetObservation>> = BTreeMap::new();
        for observation in observations {
            by_day.entry(observation.day).or_default().push(observation);
        }
        let mut counter = Counter::new();
        for column in [ERROR, FAILED_MATCHES, MATCHES, OUT_OF_BOUNDS] {
            counter.add_column(column);
        }
        Self {
            observations: by_day,
            counter,
            missing_fad_error: DEFAULT_MISSING_FAD_ERROR,
            neighborhood: 0,
            simulated_to_data_scale: 1.0,
            reset_interval: ResetInterval::EveryYear,
            log: None,
        }
    }

    pub fn with_missing_fad_error(mut self, error: f64) -> Result<Self> {
        if !(error >= 0.0 && error.is_finite()) {
            bail!("missing FAD error must be finite and non-negative, but is {error}");
        }
        self.missing_fad_error = error;
        Ok(self)
    }

    /// Search radius, in cells, around the observed cell. Zero means the cell only.
    pub fn with_neighborhood(mut self, radius: usize) -> Self {
        self.neighborhood = radius;
        self
    }

    /// Multiplier turning simulated biomass into the units of the data.
    pub fn with_simulated_to_data_scale(mut self, scale: f64) -> Result<Self> {
        if !(scale >= 0.0 && scale.is_finite()) {
            bail!("simulated to data scale must be finite and non-negative, but is {scale}");
        }
        self.simulated_to_data_scale = scale;
        Ok(self)
    }

    pub fn with_reset_interval(mut self, interval: ResetInterval) -> Self {
        self.reset_interval = interval;
        self
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    pub fn missing_fad_error(&self) -> f64 {
        self.missing_fad_error
    }

    pub fn neighborhood(&self) -> usize {
        self.neighborhood
    }

    pub fn n_observations(&self) -> usize {
        self.observations.values().map(Vec::len).sum()
    }

    /// Zero the counters if a new interval starts at `step`.
    pub fn react_to_step(&mut self, step: u32, steps_per_year: u32) {
        let due = match self.reset_interval {
            ResetInterval::EveryStep => true,
            ResetInterval::EveryYear => steps_per_year > 0 && step % steps_per_year == 0,
        };
        if due {
            self.counter.reset();
        }
    }

    /// Start logging every match attempt as CSV, dropping any previous log.
    pub fn start_or_reset_log(&mut self, species: &[Species]) {
        let mut log = String::from("day,x,y,result,error");
        for s in species {
            let _ = write!(log, ",{0},{0}_simulated", s.name());
        }
        log.push('\n');
        self.log = Some(log);
    }

    /// Log contents, empty when logging was never started.
    pub fn log(&self) -> &str {
        self.log.as_deref().unwrap_or("")
    }

    /// Euclidean distance between observed and scaled simulated catch.
    pub fn compute_error(&self, observation: &FadSetObservation, simulated: &[f64]) -> f64 {
        observation
            .biomass
            .iter()
            .zip(simulated)
            .map(|(&data, &sim)| (self.simulated_to_data_scale * sim - data).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Match today's observations with simulated FADs and update the counters.
    ///
    /// Observations are grouped by the cell they fall in. For every group the
    /// candidates are the FADs in that cell and its neighborhood, biggest
    /// first; each observation takes the candidate with the smallest error
    /// and no FAD is matched twice.
    pub fn choose_fads_to_set(
        &mut self,
        day: u32,
        fad_map: &FadMap,
        ocean: &NauticalMap,
        species: &[Species],
    ) -> Result<Vec<FadId>> {
        let Some(today) = self.observations.get(&day) else {
            return Ok(Vec::new());
        };
        if let Some(bad) = today.iter().find(|obs| obs.biomass.len() != species.len()) {
            bail!(
                "observation at ({}, {}) on day {day} has {} species, expected {}",
                bad.lon,
                bad.lat,
                bad.biomass.len(),
                species.len()
            );
        }

        let mut n_out_of_bounds = 0;
        let mut by_cell: Vec<(Cell, Vec<&FadSetObservation>)> = Vec::new();
        for observation in today {
            match ocean.cell_at_coordinates(observation.lon, observation.lat) {
                None => n_out_of_bounds += 1,
                Some(cell) => match by_cell.iter_mut().find(|(c, _)| *c == cell) {
                    Some((_, group)) => group.push(observation),
                    None => by_cell.push((cell, vec![observation])),
                },
            }
        }

        let mut matched: Vec<FadId> = Vec::new();
        let mut taken = BTreeSet::new();
        let mut n_failed = 0;
        let mut error_sum = 0.0;
        let mut log_rows = String::new();

        for (cell, observations) in by_cell {
            let mut cells = vec![cell];
            if self.neighborhood > 0 {
                cells.extend(ocean.moore_neighbors(cell, self.neighborhood));
            }
            let mut candidates: Vec<(FadId, Vec<f64>)> = cells
                .iter()
                .flat_map(|&c| fad_map.fad_ids_at(c).iter().copied())
                .filter(|id| !taken.contains(id))
                .filter_map(|id| Some((id, fad_map.fad(id)?.biology().biomass_vec(species))))
                .collect();
            candidates.sort_by(|a, b| {
                let total_a: f64 = a.1.iter().sum();
                let total_b: f64 = b.1.iter().sum();
                total_b.total_cmp(&total_a)
            });

            for observation in observations {
                let mut best: Option<(usize, f64)> = None;
                for (i, (_, simulated)) in candidates.iter().enumerate() {
                    let error = self.compute_error(observation, simulated);
                    if best.is_none_or(|(_, best_error)| error < best_error) {
                        best = Some((i, error));
                    }
                }

                match best {
                    Some((i, error)) => {
                        let (id, simulated) = candidates.remove(i);
                        error_sum += error;
                        if self.log.is_some() {
                            let _ = write!(log_rows, "{day},{},{},MATCH,{error}", cell.x, cell.y);
                            for (data, sim) in observation.biomass.iter().zip(&simulated) {
                                let scaled = self.simulated_to_data_scale * sim;
                                let _ = write!(log_rows, ",{data},{scaled}");
                            }
                            log_rows.push('\n');
                        }
                        log::debug!(
                            "matched set on day {day} at {cell:?} with {id:?}, error {error}"
                        );
                        taken.insert(id);
                        matched.push(id);
                    }
                    None => {
                        n_failed += 1;
                        if self.log.is_some() {
                            let _ = writeln!(log_rows, "{day},{},{},FAILED,NaN", cell.x, cell.y);
                        }
                        log::debug!("no FAD to match set on day {day} at {cell:?}");
                    }
                }
            }
        }

        if let Some(log) = self.log.as_mut() {
            log.push_str(&log_rows);
        }
        self.counter.count(MATCHES, matched.len() as f64)?;
        self.counter.count(FAILED_MATCHES, n_failed as f64)?;
        self.counter
            .count(ERROR, error_sum + n_failed as f64 * self.missing_fad_error)?;
        self.counter.count(OUT_OF_BOUNDS, n_out_of_bounds as f64)?;
        self.counter
            .count(ERROR, n_out_of_bounds as f64 * OUT_OF_BOUNDS_FAD_ERROR)?;

        Ok(matched)
    }

    /// Match today's observations and set on every matched FAD.
    pub fn step(
        &mut self,
        day: u32,
        fad_map: &mut FadMap,
        ocean: &mut NauticalMap,
        species: &[Species],
        gear: Option<&AbundanceGear>,
    ) -> Result<Vec<FadRemoval>> {
        let chosen = self
            .choose_fads_to_set(day, fad_map, ocean, species)
            .context("failed to match observed sets")?;
        let mut removals = Vec::with_capacity(chosen.len());
        for id in chosen {
            if let Some(removal) = fad_map
                .set_on(id, gear, species, ocean)
                .with_context(|| format!("failed to set on {id:?}"))?
            {
                removals.push(removal);
            }
        }
        Ok(removals)
    }
}
