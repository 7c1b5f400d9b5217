use crate::biology::{LocalBiology, Species};
use crate::exogenous::{ExogenousFadSetter, FadSetObservation, ResetInterval};
use crate::fad::{CapacityDistribution, FadInitializer};
use crate::filters::{AbundanceFilter, Selectivity};
use crate::ocean::{Extent, Vector2};
use anyhow::{Context, Result, bail};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seed of the simulation random number generator.
    pub seed: u64,
    /// Number of steps (days) to simulate.
    pub n_steps: u32,
    #[serde(default = "default_steps_per_year")]
    pub steps_per_year: u32,
    /// Order in which the phases run every step.
    #[serde(default = "default_schedule")]
    pub schedule: Vec<Phase>,

    pub map: MapConfig,
    pub species: Vec<SpeciesConfig>,
    pub biology: BiologyConfig,
    pub fads: FadsConfig,
    pub attractor: AttractorConfig,
    pub currents: CurrentsConfig,
    #[serde(default)]
    pub exogenous: Option<ExogenousConfig>,
    /// Filters applied to a FAD's fish when it is set on.
    #[serde(default)]
    pub gear: Option<Vec<FilterConfig>>,
}

fn default_steps_per_year() -> u32 {
    365
}

fn default_schedule() -> Vec<Phase> {
    vec![Phase::AttractorRefresh, Phase::FadDrift, Phase::ExogenousSets]
}

/// Unit of work run once per step.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AttractorRefresh,
    FadDrift,
    ExogenousSets,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Altitude rows, `altitude[y][x]`. Negative is water.
    pub altitude: Vec<Vec<f64>>,
    #[serde(default)]
    pub min_lon: f64,
    #[serde(default)]
    pub min_lat: f64,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
}

fn default_cell_size() -> f64 {
    1.0
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SpeciesConfig {
    pub name: String,
    /// Length of one fish per `[subdivision][bin]`.
    pub lengths: Vec<Vec<f64>>,
    /// Weight of one fish per `[subdivision][bin]`.
    pub weights: Vec<Vec<f64>>,
}

/// Initial content of every water tile.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BiologyConfig {
    Biomass { tile_biomass: Vec<f64> },
    Abundance { tile_abundance: Vec<Vec<Vec<f64>>> },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionConfig {
    Fixed { value: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl DistributionConfig {
    fn build(&self) -> CapacityDistribution {
        match *self {
            DistributionConfig::Fixed { value } => CapacityDistribution::Fixed(value),
            DistributionConfig::Uniform { min, max } => CapacityDistribution::Uniform { min, max },
            DistributionConfig::Normal { mean, std_dev } => {
                CapacityDistribution::Normal { mean, std_dev }
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityConfig {
    Total { distribution: DistributionConfig },
    PerSpecies { distributions: Vec<DistributionConfig> },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OwnerConfig {
    /// FADs the owner starts with.
    pub stock: usize,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub step: u32,
    pub owner: usize,
    /// Grid position, in cell units.
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FadsConfig {
    pub capacity: CapacityConfig,
    #[serde(default)]
    pub dud_probability: f64,
    #[serde(default)]
    pub release_probabilities: Option<Vec<f64>>,
    #[serde(default)]
    pub days_before_turning_off: Option<u32>,
    #[serde(default)]
    pub owners: Vec<OwnerConfig>,
    #[serde(default)]
    pub deployments: Vec<DeploymentConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttractorConfig {
    Logistic {
        attractable_biomass_coefficients: Vec<f64>,
        interaction_coefficients: Vec<f64>,
        compression_exponents: Vec<f64>,
        attraction_rates: Vec<f64>,
    },
    LinearInterval {
        #[serde(default)]
        days_in_water_before_attraction: u32,
        days_to_fill: u32,
        #[serde(default = "default_min_abundance_threshold")]
        min_abundance_threshold: f64,
        /// One selectivity filter per species.
        selectivity: Vec<FilterConfig>,
    },
}

fn default_min_abundance_threshold() -> f64 {
    1.0
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldConfig {
    Uniform { dx: f64, dy: f64 },
    /// Fields cycled over steps, each stored `[y][x] = [dx, dy]`.
    Gridded { fields: Vec<Vec<Vec<[f64; 2]>>> },
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct CurrentsConfig {
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    pub field: FieldConfig,
}

fn default_speed_multiplier() -> f64 {
    1.0
}

impl FieldConfig {
    pub fn vector_fields(fields: &[Vec<Vec<[f64; 2]>>]) -> Vec<Vec<Vec<Vector2>>> {
        fields
            .iter()
            .map(|field| {
                field
                    .iter()
                    .map(|row| row.iter().map(|&[dx, dy]| Vector2::new(dx, dy)).collect())
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ObservationConfig {
    pub day: u32,
    pub lon: f64,
    pub lat: f64,
    pub biomass: Vec<f64>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetConfig {
    EveryStep,
    EveryYear,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ExogenousConfig {
    #[serde(default)]
    pub neighborhood: usize,
    #[serde(default = "default_missing_fad_error")]
    pub missing_fad_error: f64,
    #[serde(default = "default_scale")]
    pub simulated_to_data_scale: f64,
    #[serde(default = "default_reset")]
    pub reset: ResetConfig,
    /// Write every match attempt to `exogenous_sets.csv`.
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub observations: Vec<ObservationConfig>,
}

fn default_missing_fad_error() -> f64 {
    crate::exogenous::DEFAULT_MISSING_FAD_ERROR
}

fn default_scale() -> f64 {
    1.0
}

fn default_reset() -> ResetConfig {
    ResetConfig::EveryYear
}

impl ExogenousConfig {
    pub fn build(&self, species: &[Species]) -> Result<ExogenousFadSetter> {
        let observations = self
            .observations
            .iter()
            .map(|obs| FadSetObservation {
                day: obs.day,
                lon: obs.lon,
                lat: obs.lat,
                biomass: obs.biomass.clone(),
            })
            .collect();
        let reset = match self.reset {
            ResetConfig::EveryStep => ResetInterval::EveryStep,
            ResetConfig::EveryYear => ResetInterval::EveryYear,
        };
        let mut setter = ExogenousFadSetter::new(observations)
            .with_neighborhood(self.neighborhood)
            .with_reset_interval(reset)
            .with_missing_fad_error(self.missing_fad_error)?
            .with_simulated_to_data_scale(self.simulated_to_data_scale)?;
        if self.log {
            setter.start_or_reset_log(species);
        }
        Ok(setter)
    }
}

/// Serialized form of an [`AbundanceFilter`].
///
/// Formula filters built from configuration always memoize their selectivity.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    Cutoff {
        cutoff: f64,
        #[serde(default = "default_true")]
        select_higher: bool,
        #[serde(default)]
        rounding: bool,
    },
    DoubleNormal {
        peak: f64,
        top: f64,
        asc_width: f64,
        dsc_width: f64,
        #[serde(default)]
        initial_scaling: Option<f64>,
        #[serde(default)]
        final_scaling: Option<f64>,
        bin_min: f64,
        bin_max: f64,
        bin_width: f64,
        #[serde(default)]
        rounding: bool,
    },
    SimplifiedDoubleNormal {
        full_selectivity_length: f64,
        slope_left: f64,
        slope_right: f64,
        #[serde(default)]
        rounding: bool,
    },
    Logistic {
        inflection: f64,
        width: f64,
        #[serde(default)]
        rounding: bool,
    },
    Retention {
        inflection: f64,
        slope: f64,
        asymptote: f64,
        #[serde(default)]
        rounding: bool,
    },
    Array {
        values: Vec<Vec<f64>>,
        #[serde(default)]
        rounding: bool,
    },
    ExponentialMortality {
        mortality: f64,
    },
    Proportion {
        proportion: f64,
    },
    MaximumOf {
        filters: Vec<FilterConfig>,
    },
}

fn default_true() -> bool {
    true
}

impl FilterConfig {
    pub fn build(&self) -> Result<AbundanceFilter> {
        let (selectivity, rounding) = match *self {
            FilterConfig::Cutoff {
                cutoff,
                select_higher,
                rounding,
            } => (
                Selectivity::Cutoff {
                    cutoff,
                    select_higher,
                },
                rounding,
            ),
            FilterConfig::DoubleNormal {
                peak,
                top,
                asc_width,
                dsc_width,
                initial_scaling,
                final_scaling,
                bin_min,
                bin_max,
                bin_width,
                rounding,
            } => (
                Selectivity::DoubleNormal {
                    peak,
                    top,
                    asc_width,
                    dsc_width,
                    initial_scaling,
                    final_scaling,
                    bin_min,
                    bin_max,
                    bin_width,
                },
                rounding,
            ),
            FilterConfig::SimplifiedDoubleNormal {
                full_selectivity_length,
                slope_left,
                slope_right,
                rounding,
            } => (
                Selectivity::SimplifiedDoubleNormal {
                    full_selectivity_length,
                    slope_left,
                    slope_right,
                },
                rounding,
            ),
            FilterConfig::Logistic {
                inflection,
                width,
                rounding,
            } => (Selectivity::Logistic { inflection, width }, rounding),
            FilterConfig::Retention {
                inflection,
                slope,
                asymptote,
                rounding,
            } => (
                Selectivity::Retention {
                    inflection,
                    slope,
                    asymptote,
                },
                rounding,
            ),
            FilterConfig::Array {
                ref values,
                rounding,
            } => {
                let values = to_array2(values).context("invalid array filter values")?;
                return AbundanceFilter::array(values, rounding);
            }
            FilterConfig::ExponentialMortality { mortality } => {
                return AbundanceFilter::exponential_mortality(mortality);
            }
            FilterConfig::Proportion { proportion } => {
                return AbundanceFilter::proportion(proportion);
            }
            FilterConfig::MaximumOf { ref filters } => {
                let filters = filters
                    .iter()
                    .enumerate()
                    .map(|(i, f)| f.build().with_context(|| format!("invalid component {i}")))
                    .collect::<Result<Vec<_>>>()?;
                return AbundanceFilter::maximum_of(filters);
            }
        };
        AbundanceFilter::formula(selectivity, true, rounding)
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let string = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&string)
    }

    pub fn from_toml(string: &str) -> Result<Self> {
        let config: Config = toml::from_str(string).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.n_steps, 1..10_000_000).context("invalid number of steps")?;
        check_num(self.steps_per_year, 1..=10_000).context("invalid number of steps per year")?;
        check_schedule(&self.schedule).context("invalid schedule")?;

        let n_rows = self.map.altitude.len();
        let n_cols = self.map.altitude.first().map_or(0, Vec::len);
        check_num(n_rows, 1..10_000).context("invalid number of map rows")?;
        check_num(n_cols, 1..10_000).context("invalid number of map columns")?;
        check_mat(&self.map.altitude, (n_rows, n_cols)).context("invalid altitude")?;
        if !(self.map.cell_size > 0.0) {
            bail!("cell size must be positive, but is {}", self.map.cell_size);
        }

        let n_species = self.species.len();
        check_num(n_species, 1..1_000).context("invalid number of species")?;
        for (i, s) in self.species.iter().enumerate() {
            let shape = (s.lengths.len(), s.lengths.first().map_or(0, Vec::len));
            check_mat(&s.lengths, shape)
                .with_context(|| format!("invalid lengths of species {i}"))?;
            check_mat(&s.weights, shape)
                .with_context(|| format!("invalid weights of species {i}"))?;
        }

        match &self.biology {
            BiologyConfig::Biomass { tile_biomass } => {
                check_vec(tile_biomass, n_species).context("invalid tile biomass")?;
            }
            BiologyConfig::Abundance { tile_abundance } => {
                if tile_abundance.len() != n_species {
                    bail!("tile abundance must have one matrix per species ({n_species})");
                }
                for (i, (mat, s)) in tile_abundance.iter().zip(&self.species).enumerate() {
                    let shape = (s.lengths.len(), s.lengths.first().map_or(0, Vec::len));
                    check_mat(mat, shape)
                        .with_context(|| format!("invalid tile abundance of species {i}"))?;
                }
            }
        }

        check_num(self.fads.dud_probability, 0.0..=1.0).context("invalid dud probability")?;
        if let CapacityConfig::PerSpecies { distributions } = &self.fads.capacity {
            if distributions.len() != n_species {
                bail!("per-species capacity needs one distribution per species ({n_species})");
            }
        }
        if let Some(probs) = &self.fads.release_probabilities {
            check_vec(probs, n_species).context("invalid release probabilities")?;
        }
        for (i, deployment) in self.fads.deployments.iter().enumerate() {
            check_num(deployment.owner, 0..self.fads.owners.len())
                .with_context(|| format!("invalid owner of deployment {i}"))?;
        }

        match &self.attractor {
            AttractorConfig::Logistic {
                attractable_biomass_coefficients,
                interaction_coefficients,
                compression_exponents,
                attraction_rates,
            } => {
                check_vec(attractable_biomass_coefficients, n_species)
                    .context("invalid attractable biomass coefficients")?;
                check_vec(interaction_coefficients, n_species)
                    .context("invalid interaction coefficients")?;
                check_vec(compression_exponents, n_species)
                    .context("invalid compression exponents")?;
                check_vec(attraction_rates, n_species).context("invalid attraction rates")?;
            }
            AttractorConfig::LinearInterval {
                days_to_fill,
                selectivity,
                ..
            } => {
                check_num(*days_to_fill, 1..).context("invalid days to fill")?;
                if selectivity.len() != n_species {
                    bail!(
                        "linear interval attractor needs one selectivity per species ({n_species})"
                    );
                }
            }
        }

        check_kinds(&self.attractor, &self.biology, &self.fads.capacity)
            .context("invalid attractor")?;

        if let FieldConfig::Gridded { fields } = &self.currents.field {
            for (i, field) in fields.iter().enumerate() {
                if field.len() != n_rows || field.iter().any(|row| row.len() != n_cols) {
                    bail!("current field {i} must match the map ({n_rows} x {n_cols})");
                }
            }
        }

        if let Some(exogenous) = &self.exogenous {
            for (i, obs) in exogenous.observations.iter().enumerate() {
                check_vec(&obs.biomass, n_species)
                    .with_context(|| format!("invalid biomass of observation {i}"))?;
            }
        }

        Ok(())
    }

    pub fn extent(&self) -> Extent {
        Extent {
            min_lon: self.map.min_lon,
            min_lat: self.map.min_lat,
            cell_size: self.map.cell_size,
        }
    }

    pub fn build_species(&self) -> Result<Vec<Species>> {
        self.species
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let lengths = to_array2(&s.lengths).context("invalid lengths")?;
                let weights = to_array2(&s.weights).context("invalid weights")?;
                Species::new(s.name.clone(), i, lengths, weights)
            })
            .collect()
    }

    /// Biology every water tile starts with.
    pub fn build_tile_biology(&self) -> Result<LocalBiology> {
        match &self.biology {
            BiologyConfig::Biomass { tile_biomass } => {
                Ok(LocalBiology::Biomass(tile_biomass.clone()))
            }
            BiologyConfig::Abundance { tile_abundance } => {
                let mats = tile_abundance
                    .iter()
                    .map(|mat| to_array2(mat))
                    .collect::<Result<Vec<_>>>()?;
                Ok(LocalBiology::Abundance(mats))
            }
        }
    }

    pub fn build_initializer(&self, empty_biology: LocalBiology) -> Result<FadInitializer> {
        let fads = &self.fads;
        let initializer = match &fads.capacity {
            CapacityConfig::Total { distribution } => {
                FadInitializer::with_total_capacity(
                    distribution.build(),
                    fads.dud_probability,
                    empty_biology,
                )?
            }
            CapacityConfig::PerSpecies { distributions } => {
                let distributions: Vec<_> =
                    distributions.iter().map(DistributionConfig::build).collect();
                FadInitializer::with_per_species_capacity(
                    &distributions,
                    fads.dud_probability,
                    empty_biology,
                )?
            }
        };
        let initializer = match &fads.release_probabilities {
            Some(probs) => initializer.with_release_probabilities(probs.clone())?,
            None => initializer,
        };
        Ok(initializer.with_days_before_turning_off(fads.days_before_turning_off))
    }
}

/// Convert nested rows into a matrix, requiring equal row lengths.
pub fn to_array2(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    check_mat(rows, (n_rows, n_cols))?;
    let flat = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).context("failed to build matrix")
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_vec(vec: &[f64], exp_len: usize) -> Result<()> {
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    if vec.iter().any(|ele| !ele.is_finite()) {
        bail!("vector must have only finite elements");
    }
    Ok(())
}

fn check_mat(mat: &[Vec<f64>], exp_dim: (usize, usize)) -> Result<()> {
    let (exp_n_rows, exp_n_cols) = exp_dim;
    let n_rows = mat.len();
    if n_rows != exp_n_rows {
        bail!("matrix must have {exp_n_rows} rows, but has {n_rows}");
    }
    if mat.iter().any(|row| row.len() != exp_n_cols) {
        bail!("matrix must have {exp_n_cols} columns");
    }
    if mat.iter().flatten().any(|ele| !ele.is_finite()) {
        bail!("matrix must have only finite elements");
    }
    Ok(())
}

fn check_kinds(
    attractor: &AttractorConfig,
    biology: &BiologyConfig,
    capacity: &CapacityConfig,
) -> Result<()> {
    match (attractor, biology, capacity) {
        (AttractorConfig::Logistic { .. }, BiologyConfig::Abundance { .. }, _) => {
            bail!("logistic attractor needs a biomass biology")
        }
        (AttractorConfig::LinearInterval { .. }, BiologyConfig::Biomass { .. }, _) => {
            bail!("linear interval attractor needs an abundance biology")
        }
        (AttractorConfig::LinearInterval { .. }, _, CapacityConfig::Total { .. }) => {
            bail!("linear interval attractor needs per-species capacities")
        }
        _ => Ok(()),
    }
}

fn check_schedule(schedule: &[Phase]) -> Result<()> {
    for phase in [Phase::AttractorRefresh, Phase::FadDrift, Phase::ExogenousSets] {
        let count = schedule.iter().filter(|&&p| p == phase).count();
        if count != 1 {
            bail!("phase {phase:?} must appear exactly once, but appears {count} times");
        }
    }
    Ok(())
}
