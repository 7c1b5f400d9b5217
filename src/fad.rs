//! Fish aggregating devices and their initializer.

use crate::biology::LocalBiology;
use crate::ocean::Cell;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::{Bernoulli, Normal, Uniform};

/// Identifier of a FAD, unique within one [`crate::fad_map::FadMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FadId(pub u64);

/// Index of the [`crate::fad_manager::FadManager`] owning a FAD.
pub type OwnerId = usize;

/// Maximum amount of fish a FAD can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CarryingCapacity {
    /// Cap on the summed biomass of all species.
    Total(f64),
    /// Separate cap for each species.
    PerSpecies(Vec<f64>),
}

impl CarryingCapacity {
    /// A dud can never hold any fish.
    pub fn is_dud(&self) -> bool {
        match self {
            CarryingCapacity::Total(cap) => *cap <= 0.0,
            CarryingCapacity::PerSpecies(caps) => caps.iter().all(|&cap| cap <= 0.0),
        }
    }

    pub fn total(&self) -> f64 {
        match self {
            CarryingCapacity::Total(cap) => *cap,
            CarryingCapacity::PerSpecies(caps) => caps.iter().sum(),
        }
    }
}

/// Distribution a nominal capacity is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CapacityDistribution {
    Fixed(f64),
    Uniform { min: f64, max: f64 },
    /// Normal draw, negative values clamped to 0.
    Normal { mean: f64, std_dev: f64 },
}

#[derive(Debug, Clone)]
enum Sampler {
    Fixed(f64),
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
}

impl Sampler {
    fn new(dist: CapacityDistribution) -> Result<Self> {
        let sampler = match dist {
            CapacityDistribution::Fixed(value) => {
                if !(value >= 0.0 && value.is_finite()) {
                    bail!("fixed capacity must be finite and non-negative, but is {value}");
                }
                Sampler::Fixed(value)
            }
            CapacityDistribution::Uniform { min, max } => {
                if min < 0.0 {
                    bail!("uniform capacity minimum must be non-negative, but is {min}");
                }
                if min == max {
                    Sampler::Fixed(min)
                } else {
                    Sampler::Uniform(Uniform::new(min, max).context("invalid uniform capacity")?)
                }
            }
            CapacityDistribution::Normal { mean, std_dev } => {
                Sampler::Normal(Normal::new(mean, std_dev).context("invalid normal capacity")?)
            }
        };
        Ok(sampler)
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Fixed(value) => *value,
            Sampler::Uniform(dist) => dist.sample(rng),
            Sampler::Normal(dist) => dist.sample(rng).max(0.0),
        }
    }
}

#[derive(Debug, Clone)]
enum CapacityModel {
    Total(Sampler),
    PerSpecies(Vec<Sampler>),
}

/// Template every new FAD is created from.
#[derive(Debug, Clone)]
pub struct FadInitializer {
    capacity: CapacityModel,
    dud_dist: Bernoulli,
    release_probabilities: Vec<f64>,
    days_before_turning_off: Option<u32>,
    empty_biology: LocalBiology,
}

impl FadInitializer {
    /// Initializer with one capacity on the total biomass.
    pub fn with_total_capacity(
        capacity: CapacityDistribution,
        dud_probability: f64,
        empty_biology: LocalBiology,
    ) -> Result<Self> {
        let capacity = CapacityModel::Total(Sampler::new(capacity)?);
        Self::new(capacity, dud_probability, empty_biology)
    }

    /// Initializer with one capacity per species.
    pub fn with_per_species_capacity(
        capacities: &[CapacityDistribution],
        dud_probability: f64,
        empty_biology: LocalBiology,
    ) -> Result<Self> {
        if capacities.len() != empty_biology.n_species() {
            bail!(
                "need one capacity per species ({}), but got {}",
                empty_biology.n_species(),
                capacities.len()
            );
        }
        let samplers = capacities
            .iter()
            .enumerate()
            .map(|(i, &dist)| {
                Sampler::new(dist).with_context(|| format!("invalid capacity of species {i}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(CapacityModel::PerSpecies(samplers), dud_probability, empty_biology)
    }

    fn new(
        capacity: CapacityModel,
        dud_probability: f64,
        empty_biology: LocalBiology,
    ) -> Result<Self> {
        let dud_dist = Bernoulli::new(dud_probability)
            .with_context(|| format!("invalid dud probability {dud_probability}"))?;
        let n_species = empty_biology.n_species();
        Ok(Self {
            capacity,
            dud_dist,
            release_probabilities: vec![0.0; n_species],
            days_before_turning_off: None,
            empty_biology: empty_biology.empty_like(),
        })
    }

    /// Per-species probability of releasing all fish each step.
    pub fn with_release_probabilities(mut self, probabilities: Vec<f64>) -> Result<Self> {
        if probabilities.len() != self.empty_biology.n_species() {
            bail!(
                "need one release probability per species ({}), but got {}",
                self.empty_biology.n_species(),
                probabilities.len()
            );
        }
        if probabilities.iter().any(|p| !(0.0..=1.0).contains(p)) {
            bail!("release probabilities must be in [0, 1]");
        }
        self.release_probabilities = probabilities;
        Ok(self)
    }

    pub fn with_days_before_turning_off(mut self, days: Option<u32>) -> Self {
        self.days_before_turning_off = days;
        self
    }

    /// Draw the carrying capacity of a new FAD.
    ///
    /// With the dud probability the FAD gets a zero capacity, otherwise the
    /// nominal capacity is drawn from the configured distribution.
    pub fn generate_carrying_capacity<R: Rng + ?Sized>(&self, rng: &mut R) -> CarryingCapacity {
        let is_dud = self.dud_dist.sample(rng);
        match &self.capacity {
            CapacityModel::Total(sampler) if !is_dud => {
                CarryingCapacity::Total(sampler.sample(rng))
            }
            CapacityModel::PerSpecies(samplers) if !is_dud => {
                CarryingCapacity::PerSpecies(samplers.iter().map(|s| s.sample(rng)).collect())
            }
            CapacityModel::Total(_) => CarryingCapacity::Total(0.0),
            CapacityModel::PerSpecies(samplers) => {
                CarryingCapacity::PerSpecies(vec![0.0; samplers.len()])
            }
        }
    }

    /// Create an empty FAD.
    pub fn init_fad<R: Rng + ?Sized>(
        &self,
        id: FadId,
        owner: Option<OwnerId>,
        step: u32,
        cell: Cell,
        rng: &mut R,
    ) -> Fad {
        let carrying_capacity = self.generate_carrying_capacity(rng);
        Fad {
            id,
            owner,
            biology: self.empty_biology.clone(),
            carrying_capacity,
            step_deployed: step,
            location_deployed: cell,
            release_probabilities: self.release_probabilities.clone(),
            days_before_turning_off: self.days_before_turning_off,
            active: true,
            lost: false,
            step_of_first_attraction: None,
        }
    }

    pub fn empty_biology(&self) -> &LocalBiology {
        &self.empty_biology
    }
}

/// Drifting object that aggregates fish.
///
/// Its position lives in the [`crate::fad_map::FadMap`] that holds it.
#[derive(Debug, Clone)]
pub struct Fad {
    id: FadId,
    owner: Option<OwnerId>,
    biology: LocalBiology,
    carrying_capacity: CarryingCapacity,
    step_deployed: u32,
    location_deployed: Cell,
    release_probabilities: Vec<f64>,
    days_before_turning_off: Option<u32>,
    active: bool,
    lost: bool,
    step_of_first_attraction: Option<u32>,
}

impl Fad {
    pub fn id(&self) -> FadId {
        self.id
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    pub fn biology(&self) -> &LocalBiology {
        &self.biology
    }

    pub fn biology_mut(&mut self) -> &mut LocalBiology {
        &mut self.biology
    }

    pub fn carrying_capacity(&self) -> &CarryingCapacity {
        &self.carrying_capacity
    }

    pub fn is_dud(&self) -> bool {
        self.carrying_capacity.is_dud()
    }

    pub fn step_deployed(&self) -> u32 {
        self.step_deployed
    }

    pub fn location_deployed(&self) -> Cell {
        self.location_deployed
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Active and not a dud. Says nothing about whether it is full.
    pub fn can_attract(&self) -> bool {
        self.active && !self.is_dud()
    }

    pub fn is_lost(&self) -> bool {
        self.lost
    }

    pub fn lose(&mut self) {
        self.lost = true;
        self.active = false;
    }

    /// Turn off once the FAD has spent more than its allotted days in the water.
    pub fn react_to_step(&mut self, step: u32) {
        if let Some(days) = self.days_before_turning_off {
            if self.active && days > 0 && step.saturating_sub(self.step_deployed) > days {
                self.active = false;
            }
        }
    }

    pub fn days_in_water(&self, step: u32) -> u32 {
        step.saturating_sub(self.step_deployed)
    }

    pub fn release_probabilities(&self) -> &[f64] {
        &self.release_probabilities
    }

    /// Species whose fish leave the FAD this step.
    pub fn species_to_release<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        self.release_probabilities
            .iter()
            .enumerate()
            .filter(|&(_, &p)| rng.random::<f64>() < p)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn record_attraction(&mut self, step: u32) {
        if self.step_of_first_attraction.is_none() {
            self.step_of_first_attraction = Some(step);
        }
    }

    pub fn steps_before_first_attraction(&self) -> Option<u32> {
        self.step_of_first_attraction
            .map(|step| step.saturating_sub(self.step_deployed))
    }
}
