use crate::attraction::{Attractor, LinearIntervalAttractor, LogisticAttractor};
use crate::biology::Species;
use crate::config::{AttractorConfig, Config, FieldConfig, Phase, to_array2};
use crate::currents::{CurrentVectors, GriddedCurrents, UniformCurrent};
use crate::exogenous::ExogenousFadSetter;
use crate::fad::{FadId, FadInitializer, OwnerId};
use crate::fad_manager::FadManager;
use crate::fad_map::{FadMap, FadRemoval, RemovalReason};
use crate::gear::AbundanceGear;
use crate::ocean::{NauticalMap, Vector2};
use crate::stats::{Accumulator, AccumulatorReport};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Owns the ocean, the FADs, their owners and the random number generator,
/// and runs the scheduled phases once per step.
pub struct Engine {
    cfg: Config,
    species: Vec<Species>,
    ocean: NauticalMap,
    fad_map: FadMap,
    initializer: FadInitializer,
    managers: Vec<FadManager>,
    attractor: Attractor,
    currents: Box<dyn CurrentVectors>,
    setter: Option<ExogenousFadSetter>,
    gear: Option<AbundanceGear>,
    rng: ChaCha12Rng,
    step: u32,
    landings: Vec<f64>,
    removals: BTreeMap<String, usize>,
    fad_biomass: Vec<Accumulator>,
}

/// End-of-run figures written to `summary.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Summary {
    pub n_steps: u32,
    pub n_live_fads: usize,
    /// FADs removed, by reason.
    pub removals: BTreeMap<String, usize>,
    /// Biomass caught by sets, per species.
    pub landings: BTreeMap<String, f64>,
    /// Total biomass aggregated under FADs at the end of each step, per species.
    pub fad_biomass: BTreeMap<String, AccumulatorReport>,
    /// Exogenous set counters at the end of the run.
    pub exogenous: Option<BTreeMap<String, f64>>,
}

impl Engine {
    /// Build every component from a validated configuration.
    pub fn new(cfg: Config) -> Result<Self> {
        let species = cfg.build_species().context("failed to build species")?;

        let tile_biology = cfg
            .build_tile_biology()
            .context("failed to build tile biology")?;
        for s in &species {
            if let Some(mat) = tile_biology.abundance(s.index()) {
                s.check_shape(mat)
                    .with_context(|| format!("invalid tile abundance of {:?}", s.name()))?;
            }
        }
        let altitude = to_array2(&cfg.map.altitude).context("invalid altitude")?;
        let ocean = NauticalMap::new(altitude, cfg.extent(), &tile_biology)
            .context("failed to build map")?;

        let initializer = cfg
            .build_initializer(tile_biology.empty_like())
            .context("failed to build FAD initializer")?;

        let mut attractor = match &cfg.attractor {
            AttractorConfig::Logistic {
                attractable_biomass_coefficients,
                interaction_coefficients,
                compression_exponents,
                attraction_rates,
            } => Attractor::Logistic(LogisticAttractor::new(
                attractable_biomass_coefficients.clone(),
                interaction_coefficients.clone(),
                compression_exponents.clone(),
                attraction_rates.clone(),
            )?),
            AttractorConfig::LinearInterval {
                days_in_water_before_attraction,
                days_to_fill,
                min_abundance_threshold,
                selectivity,
            } => {
                let selectivity = selectivity
                    .iter()
                    .map(|f| f.build())
                    .collect::<Result<Vec<_>>>()
                    .context("invalid attractor selectivity")?;
                Attractor::LinearInterval(LinearIntervalAttractor::new(
                    *days_in_water_before_attraction,
                    *days_to_fill,
                    *min_abundance_threshold,
                    selectivity,
                )?)
            }
        };
        // Ready for any phase order on the first step.
        attractor.refresh(&species, &ocean).context("failed to refresh attractor")?;

        let currents: Box<dyn CurrentVectors> = match &cfg.currents.field {
            FieldConfig::Uniform { dx, dy } => Box::new(UniformCurrent(Vector2::new(*dx, *dy))),
            FieldConfig::Gridded { fields } => Box::new(GriddedCurrents::new(
                ocean.width(),
                ocean.height(),
                FieldConfig::vector_fields(fields),
            )?),
        };
        let fad_map = FadMap::new(cfg.currents.speed_multiplier)?;

        let managers = cfg
            .fads
            .owners
            .iter()
            .enumerate()
            .map(|(owner, o)| FadManager::new(owner, o.stock))
            .collect();

        let setter = cfg
            .exogenous
            .as_ref()
            .map(|e| e.build(&species))
            .transpose()
            .context("failed to build exogenous setter")?;

        let gear = cfg
            .gear
            .as_ref()
            .map(|filters| -> Result<AbundanceGear> {
                let filters = filters
                    .iter()
                    .map(|f| f.build())
                    .collect::<Result<Vec<_>>>()?;
                AbundanceGear::new(filters)
            })
            .transpose()
            .context("failed to build gear")?;

        let rng = ChaCha12Rng::seed_from_u64(cfg.seed);
        let landings = vec![0.0; species.len()];
        let fad_biomass = vec![Accumulator::new(); species.len()];

        Ok(Self {
            cfg,
            species,
            ocean,
            fad_map,
            initializer,
            managers,
            attractor,
            currents,
            setter,
            gear,
            rng,
            step: 0,
            landings,
            removals: BTreeMap::new(),
            fad_biomass,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn ocean(&self) -> &NauticalMap {
        &self.ocean
    }

    /// Mutable access for biology processes that run between steps.
    pub fn ocean_mut(&mut self) -> &mut NauticalMap {
        &mut self.ocean
    }

    pub fn fad_map(&self) -> &FadMap {
        &self.fad_map
    }

    pub fn managers(&self) -> &[FadManager] {
        &self.managers
    }

    pub fn setter(&self) -> Option<&ExogenousFadSetter> {
        self.setter.as_ref()
    }

    /// Next step to run.
    pub fn current_step(&self) -> u32 {
        self.step
    }

    pub fn landings(&self) -> &[f64] {
        &self.landings
    }

    /// Deploy one of `owner`'s FADs at a grid position, at the current step.
    pub fn deploy(&mut self, owner: OwnerId, position: Vector2) -> Result<FadId> {
        let manager = self
            .managers
            .get_mut(owner)
            .with_context(|| format!("no owner {owner}"))?;
        manager.deploy(
            &mut self.fad_map,
            &self.initializer,
            position,
            self.step,
            &self.ocean,
            &mut self.rng,
        )
    }

    /// Run every step and write the outputs into `out_dir`.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, out_dir: P) -> Result<Summary> {
        let out_dir = out_dir.as_ref();
        let file = out_dir.join("fad_biomass.csv");
        let file = File::create(&file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let mut header = String::from("step,fad,x,y");
        for s in &self.species {
            header.push(',');
            header.push_str(s.name());
        }
        writeln!(writer, "{header}").context("failed to write header")?;

        let n_steps = self.cfg.n_steps;
        let report_every = (n_steps / 10).max(1);
        for _ in 0..n_steps {
            let step = self.step;
            self.perform_step()
                .with_context(|| format!("failed to perform step {step}"))?;
            self.write_fads(&mut writer, step)
                .context("failed to write FAD biomass")?;

            if (step + 1) % report_every == 0 || step + 1 == n_steps {
                let progress = 100.0 * (step + 1) as f64 / n_steps as f64;
                log::info!("completed {progress:06.2}% ({} FADs)", self.fad_map.len());
            }
        }

        writer.flush().context("failed to flush writer stream")?;

        if let Some(setter) = &self.setter {
            if !setter.log().is_empty() {
                let file = out_dir.join("exogenous_sets.csv");
                fs::write(&file, setter.log())
                    .with_context(|| format!("failed to write {file:?}"))?;
            }
        }

        Ok(self.summary())
    }

    /// Run one step: scheduled deployments, then every phase in order.
    pub fn perform_step(&mut self) -> Result<()> {
        self.deploy_scheduled().context("failed to deploy FADs")?;

        if let Some(setter) = self.setter.as_mut() {
            setter.react_to_step(self.step, self.cfg.steps_per_year);
        }

        let schedule = self.cfg.schedule.clone();
        for phase in schedule {
            match phase {
                Phase::AttractorRefresh => {
                    self.attractor
                        .refresh(&self.species, &self.ocean)
                        .context("failed to refresh attractor")?;
                }
                Phase::FadDrift => {
                    let report = self
                        .fad_map
                        .step(
                            self.step,
                            &mut self.ocean,
                            self.currents.as_ref(),
                            &self.attractor,
                            &self.species,
                            &mut self.rng,
                        )
                        .context("failed to move FADs")?;
                    log::debug!(
                        "step {}: {} attracting, {} releasing, {} removed",
                        self.step,
                        report.n_attracting,
                        report.n_releasing,
                        report.removals.len()
                    );
                    self.handle_removals(report.removals)?;
                }
                Phase::ExogenousSets => {
                    if let Some(setter) = self.setter.as_mut() {
                        let removals = setter
                            .step(
                                self.step,
                                &mut self.fad_map,
                                &mut self.ocean,
                                &self.species,
                                self.gear.as_ref(),
                            )
                            .context("failed to run exogenous sets")?;
                        self.handle_removals(removals)?;
                    }
                }
            }
        }

        for (acc, s) in self.fad_biomass.iter_mut().zip(&self.species) {
            acc.add(self.fad_map.total_biomass(s));
        }

        self.step += 1;
        Ok(())
    }

    fn deploy_scheduled(&mut self) -> Result<()> {
        let step = self.step;
        let deployments: Vec<_> = self
            .cfg
            .fads
            .deployments
            .iter()
            .filter(|d| d.step == step)
            .cloned()
            .collect();
        for deployment in deployments {
            let owner = deployment.owner;
            let in_stock = self
                .managers
                .get(owner)
                .with_context(|| format!("no owner {owner}"))?
                .n_in_stock();
            if in_stock == 0 {
                log::warn!("owner {owner} has no FADs left, skipping deployment at step {step}");
                continue;
            }
            self.deploy(owner, Vector2::new(deployment.x, deployment.y))
                .with_context(|| format!("failed to deploy for owner {owner}"))?;
        }
        Ok(())
    }

    fn handle_removals(&mut self, removals: Vec<FadRemoval>) -> Result<()> {
        for mut removal in removals {
            if let Some(owner) = removal.fad.owner() {
                self.managers
                    .get_mut(owner)
                    .with_context(|| format!("no owner {owner}"))?
                    .react_to_removal(&mut removal)?;
            }
            if let Some(catch) = &removal.catch {
                let caught = catch.biomass_vec(&self.species);
                for (landed, caught) in self.landings.iter_mut().zip(caught) {
                    *landed += caught;
                }
            }
            let reason = match removal.reason {
                RemovalReason::Beached => "beached",
                RemovalReason::ExitedMap => "exited_map",
                RemovalReason::Set => "set",
                RemovalReason::PickedUp => "picked_up",
            };
            *self.removals.entry(reason.to_string()).or_default() += 1;
        }
        Ok(())
    }

    fn write_fads<W: Write>(&self, writer: &mut W, step: u32) -> Result<()> {
        for id in self.fad_map.ids() {
            let (Some(fad), Some(cell)) = (self.fad_map.fad(id), self.fad_map.fad_tile(id)) else {
                continue;
            };
            write!(writer, "{step},{},{},{}", id.0, cell.x, cell.y)?;
            for biomass in fad.biology().biomass_vec(&self.species) {
                write!(writer, ",{biomass}")?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        let names = self.species.iter().map(|s| s.name().to_string());
        Summary {
            n_steps: self.step,
            n_live_fads: self.fad_map.len(),
            removals: self.removals.clone(),
            landings: names.clone().zip(self.landings.iter().copied()).collect(),
            fad_biomass: names
                .zip(self.fad_biomass.iter().map(Accumulator::report))
                .collect(),
            exogenous: self.setter.as_ref().map(|setter| setter.counter().columns().clone()),
        }
    }
}
