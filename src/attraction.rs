//! Per-step transfer of fish from the ocean tile under a FAD into the FAD.
//!
//! Attractors only compute the amount to move. The caller debits the tile and
//! credits the FAD by that exact amount.

use crate::biology::{LocalBiology, Species};
use crate::fad::{CarryingCapacity, Fad};
use crate::filters::AbundanceFilter;
use crate::ocean::NauticalMap;
use anyhow::{Context, Result, bail};
use ndarray::{Array2, Zip};
use rand::prelude::*;

/// Logistic attraction of aggregate biomass.
///
/// For species `i` with tile biomass `B`, FAD biomass `F`, attractable biomass
/// coefficient `a`, interaction coefficient `c` and compression exponent `e`,
/// the FAD attracts with probability `1 / (1 + exp(-(a B^(1/e) - c F^(1/e))))`.
/// When it does, it takes `rate * B`, bounded by the room left under its
/// carrying capacity.
#[derive(Debug, Clone)]
pub struct LogisticAttractor {
    attractable_biomass_coefficients: Vec<f64>,
    interaction_coefficients: Vec<f64>,
    compression_exponents: Vec<f64>,
    attraction_rates: Vec<f64>,
}

impl LogisticAttractor {
    pub fn new(
        attractable_biomass_coefficients: Vec<f64>,
        interaction_coefficients: Vec<f64>,
        compression_exponents: Vec<f64>,
        attraction_rates: Vec<f64>,
    ) -> Result<Self> {
        let n_species = attractable_biomass_coefficients.len();
        if interaction_coefficients.len() != n_species
            || compression_exponents.len() != n_species
            || attraction_rates.len() != n_species
        {
            bail!("all coefficient vectors must have one entry per species ({n_species})");
        }
        if compression_exponents.iter().any(|&e| !(e > 0.0)) {
            bail!("compression exponents must be positive");
        }
        if attraction_rates.iter().any(|r| !(0.0..=1.0).contains(r)) {
            bail!("attraction rates must be in [0, 1]");
        }
        Ok(Self {
            attractable_biomass_coefficients,
            interaction_coefficients,
            compression_exponents,
            attraction_rates,
        })
    }

    /// Probability that species `i` is attracted today.
    pub fn probability(&self, i: usize, tile_biomass: f64, fad_biomass: f64) -> f64 {
        let exponent = 1.0 / self.compression_exponents[i];
        let x = self.attractable_biomass_coefficients[i] * tile_biomass.max(0.0).powf(exponent)
            - self.interaction_coefficients[i] * fad_biomass.max(0.0).powf(exponent);
        1.0 / (1.0 + (-x).exp())
    }

    fn attract<R: Rng + ?Sized>(
        &self,
        fad: &Fad,
        tile: &LocalBiology,
        rng: &mut R,
    ) -> Result<Option<LocalBiology>> {
        let (LocalBiology::Biomass(tile_biomass), LocalBiology::Biomass(fad_biomass)) =
            (tile, fad.biology())
        else {
            bail!("logistic attraction needs biomass biologies");
        };
        if tile_biomass.len() != self.attraction_rates.len() {
            bail!(
                "attractor is set up for {} species, but the tile holds {}",
                self.attraction_rates.len(),
                tile_biomass.len()
            );
        }
        if !fad.can_attract() {
            return Ok(None);
        }

        let mut total_room = match fad.carrying_capacity() {
            CarryingCapacity::Total(cap) => cap - fad_biomass.iter().sum::<f64>(),
            CarryingCapacity::PerSpecies(_) => f64::INFINITY,
        };
        let mut attracted = vec![0.0; tile_biomass.len()];
        for (i, (&b, &f)) in tile_biomass.iter().zip(fad_biomass).enumerate() {
            let hit = rng.random::<f64>() < self.probability(i, b, f);
            if !hit || b <= 0.0 {
                continue;
            }
            let species_room = match fad.carrying_capacity() {
                CarryingCapacity::Total(_) => total_room,
                CarryingCapacity::PerSpecies(caps) => caps.get(i).copied().unwrap_or(0.0) - f,
            };
            let amount = (self.attraction_rates[i] * b).min(species_room).min(b);
            if amount > 0.0 {
                attracted[i] = amount;
                total_room -= amount;
            }
        }

        if attracted.iter().all(|&a| a <= 0.0) {
            return Ok(None);
        }
        Ok(Some(LocalBiology::Biomass(attracted)))
    }
}

/// Fixed-rate attraction of structured abundance.
///
/// A FAD starts attracting after `days_in_water_before_attraction` and then
/// takes `capacity / days_to_fill` kg per species per day until full. The kg
/// are turned into fish per `(subdivision, bin)` using a global selectivity
/// curve applied to the whole ocean, refreshed by [`Attractor::refresh`].
#[derive(Debug, Clone)]
pub struct LinearIntervalAttractor {
    days_in_water_before_attraction: u32,
    days_to_fill: u32,
    min_abundance_threshold: f64,
    global_selectivity: Vec<AbundanceFilter>,
    abundance_per_kg: Option<Vec<Array2<f64>>>,
}

impl LinearIntervalAttractor {
    pub fn new(
        days_in_water_before_attraction: u32,
        days_to_fill: u32,
        min_abundance_threshold: f64,
        global_selectivity: Vec<AbundanceFilter>,
    ) -> Result<Self> {
        if days_to_fill == 0 {
            bail!("days to fill must be positive");
        }
        if !(min_abundance_threshold >= 1.0) {
            bail!(
                "minimum abundance threshold must be at least 1, but is {min_abundance_threshold}"
            );
        }
        Ok(Self {
            days_in_water_before_attraction,
            days_to_fill,
            min_abundance_threshold,
            global_selectivity,
            abundance_per_kg: None,
        })
    }

    /// Fish per bin making up 1 kg of catch, per species.
    pub fn abundance_per_kg(&self) -> Option<&[Array2<f64>]> {
        self.abundance_per_kg.as_deref()
    }

    /// Recompute the kg-to-abundance converters from the ocean-wide abundance.
    pub fn refresh_with_totals(
        &mut self,
        species: &[Species],
        totals: &[Array2<f64>],
    ) -> Result<()> {
        if self.global_selectivity.len() != species.len() || totals.len() != species.len() {
            bail!(
                "need one selectivity curve and one total per species ({})",
                species.len()
            );
        }
        let mut converters = Vec::with_capacity(species.len());
        for ((s, filter), total) in species.iter().zip(&self.global_selectivity).zip(totals) {
            let selected = filter
                .filter(s, total)
                .with_context(|| format!("failed to select {:?} abundance", s.name()))?;
            let selected_weight = &selected * s.weights();
            let total_weight = selected_weight.sum();
            let mut converter = Array2::zeros(s.shape());
            if total_weight > 0.0 {
                Zip::from(&mut converter)
                    .and(&selected_weight)
                    .and(s.weights())
                    .for_each(|c, &sw, &w| {
                        if w > 0.0 {
                            *c = (sw / total_weight / w).max(0.0);
                        }
                    });
            }
            converters.push(converter);
        }
        self.abundance_per_kg = Some(converters);
        Ok(())
    }

    fn attract(
        &self,
        fad: &Fad,
        tile: &LocalBiology,
        species: &[Species],
        step: u32,
    ) -> Result<Option<LocalBiology>> {
        let CarryingCapacity::PerSpecies(capacities) = fad.carrying_capacity() else {
            bail!("linear interval attraction only works with per-species carrying capacities");
        };
        let (LocalBiology::Abundance(tile_abundance), LocalBiology::Abundance(_)) =
            (tile, fad.biology())
        else {
            bail!("linear interval attraction needs abundance biologies");
        };
        if !fad.can_attract() || fad.days_in_water(step) < self.days_in_water_before_attraction {
            return Ok(None);
        }
        let converters = self
            .abundance_per_kg
            .as_ref()
            .context("attractor must be refreshed before attracting")?;
        if capacities.len() != species.len()
            || tile_abundance.len() != species.len()
            || converters.len() != species.len()
        {
            bail!("attraction inputs must have one entry per species ({})", species.len());
        }

        // If one species is full, they all are.
        let fad_biomass = fad.biology().biomass_vec(species);
        for (&cap, &held) in capacities.iter().zip(&fad_biomass) {
            if cap > 0.0 && held >= cap {
                return Ok(None);
            }
        }

        let mut attracted = Vec::with_capacity(species.len());
        for (i, s) in species.iter().enumerate() {
            let daily_kg = capacities[i] / self.days_to_fill as f64;
            let mut daily_step = &converters[i] * daily_kg;
            let tile_mat = &tile_abundance[i];
            s.check_shape(tile_mat).context("tile abundance does not match species")?;

            let threshold = self.min_abundance_threshold;
            let too_scarce = Zip::from(&daily_step)
                .and(tile_mat)
                .fold(false, |acc, &step_n, &tile_n| acc || step_n * threshold > tile_n);
            if too_scarce {
                return Ok(None);
            }

            // Never overfill.
            let step_kg = s.weigh(&daily_step);
            let room = capacities[i] - fad_biomass[i];
            if step_kg > room && step_kg > 0.0 {
                let factor = (room / step_kg).max(0.0);
                daily_step.mapv_inplace(|n| n * factor);
            }
            Zip::from(&mut daily_step)
                .and(tile_mat)
                .for_each(|n, &available| *n = n.min(available).max(0.0));
            attracted.push(daily_step);
        }

        let attracted = LocalBiology::Abundance(attracted);
        if attracted.is_empty() {
            return Ok(None);
        }
        Ok(Some(attracted))
    }
}

/// Attraction process run for every FAD each step.
#[derive(Debug, Clone)]
pub enum Attractor {
    Logistic(LogisticAttractor),
    LinearInterval(LinearIntervalAttractor),
}

impl Attractor {
    /// Update state that depends on the whole ocean. Run once per step.
    pub fn refresh(&mut self, species: &[Species], ocean: &NauticalMap) -> Result<()> {
        match self {
            Attractor::Logistic(_) => Ok(()),
            Attractor::LinearInterval(attractor) => {
                let totals: Vec<_> = species.iter().map(|s| ocean.total_abundance(s)).collect();
                attractor.refresh_with_totals(species, &totals)
            }
        }
    }

    /// Amount `fad` attracts from `tile` this step, `None` when it attracts nothing.
    pub fn attract<R: Rng + ?Sized>(
        &self,
        fad: &Fad,
        tile: &LocalBiology,
        species: &[Species],
        step: u32,
        rng: &mut R,
    ) -> Result<Option<LocalBiology>> {
        match self {
            Attractor::Logistic(attractor) => attractor.attract(fad, tile, rng),
            Attractor::LinearInterval(attractor) => attractor.attract(fad, tile, species, step),
        }
    }
}
