//! Drifting FADs: positions, spatial index and lifecycle.

use crate::attraction::Attractor;
use crate::biology::{LocalBiology, Species};
use crate::currents::CurrentVectors;
use crate::fad::{Fad, FadId, FadInitializer, OwnerId};
use crate::gear::AbundanceGear;
use crate::ocean::{Cell, NauticalMap, Vector2};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Why a FAD left the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Drifted onto land.
    Beached,
    /// Drifted off the edge of the grid.
    ExitedMap,
    /// Fished out by a set.
    Set,
    /// Recovered by its owner.
    PickedUp,
}

/// A FAD taken out of play, with what happened to its fish.
#[derive(Debug, Clone)]
pub struct FadRemoval {
    pub fad: Fad,
    pub reason: RemovalReason,
    /// Water tile that received the fish the FAD still held.
    pub released_into: Option<Cell>,
    /// Fish that left the system, for sets.
    pub catch: Option<LocalBiology>,
}

/// What happened during one [`FadMap::step`].
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub removals: Vec<FadRemoval>,
    pub n_attracting: usize,
    pub n_releasing: usize,
}

#[derive(Debug, Clone)]
struct DriftingFad {
    fad: Fad,
    position: Vector2,
    cell: Cell,
}

/// Every live FAD, indexed by the grid cell it floats over.
///
/// Each live FAD sits in exactly one index bucket, the one matching its
/// stored cell. FADs only ever float over water tiles.
#[derive(Debug, Clone)]
pub struct FadMap {
    fads: BTreeMap<FadId, DriftingFad>,
    index: HashMap<Cell, Vec<FadId>>,
    next_id: u64,
    speed_multiplier: f64,
}

impl FadMap {
    pub fn new(speed_multiplier: f64) -> Result<Self> {
        if !speed_multiplier.is_finite() {
            bail!("current speed multiplier must be finite, but is {speed_multiplier}");
        }
        Ok(Self {
            fads: BTreeMap::new(),
            index: HashMap::new(),
            next_id: 0,
            speed_multiplier,
        })
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    /// Create a new FAD at `position` and start tracking it.
    ///
    /// # Errors
    /// Returns an error if `position` is off the map or over land.
    pub fn deploy<R: Rng + ?Sized>(
        &mut self,
        initializer: &FadInitializer,
        owner: Option<OwnerId>,
        position: Vector2,
        step: u32,
        ocean: &NauticalMap,
        rng: &mut R,
    ) -> Result<FadId> {
        let cell = ocean
            .cell_at(position)
            .with_context(|| format!("cannot deploy at {position:?}, off the map"))?;
        if !ocean.is_water(cell) {
            bail!("cannot deploy at {cell:?}, not a water tile");
        }
        let id = FadId(self.next_id);
        self.next_id += 1;
        let fad = initializer.init_fad(id, owner, step, cell, rng);
        log::debug!(
            "deployed {id:?} at {cell:?} with capacity {:?}",
            fad.carrying_capacity()
        );
        self.fads.insert(id, DriftingFad { fad, position, cell });
        self.index.entry(cell).or_default().push(id);
        Ok(id)
    }

    /// Deploy in the middle of `cell`.
    pub fn deploy_at_cell<R: Rng + ?Sized>(
        &mut self,
        initializer: &FadInitializer,
        owner: Option<OwnerId>,
        cell: Cell,
        step: u32,
        ocean: &NauticalMap,
        rng: &mut R,
    ) -> Result<FadId> {
        self.deploy(initializer, owner, cell.center(), step, ocean, rng)
    }

    pub fn len(&self) -> usize {
        self.fads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fads.is_empty()
    }

    pub fn contains(&self, id: FadId) -> bool {
        self.fads.contains_key(&id)
    }

    pub fn fad(&self, id: FadId) -> Option<&Fad> {
        self.fads.get(&id).map(|d| &d.fad)
    }

    pub fn fad_mut(&mut self, id: FadId) -> Option<&mut Fad> {
        self.fads.get_mut(&id).map(|d| &mut d.fad)
    }

    /// Cell under a live FAD, `None` once it has left play.
    pub fn fad_tile(&self, id: FadId) -> Option<Cell> {
        self.fads.get(&id).map(|d| d.cell)
    }

    pub fn fad_position(&self, id: FadId) -> Option<Vector2> {
        self.fads.get(&id).map(|d| d.position)
    }

    /// Ids of the FADs over `cell`, in deployment-or-arrival order.
    pub fn fad_ids_at(&self, cell: Cell) -> &[FadId] {
        self.index.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fads_at(&self, cell: Cell) -> Vec<&Fad> {
        self.fad_ids_at(cell)
            .iter()
            .filter_map(|id| self.fad(*id))
            .collect()
    }

    /// Every live FAD, by id.
    pub fn all_fads(&self) -> impl Iterator<Item = &Fad> + '_ {
        self.fads.values().map(|d| &d.fad)
    }

    pub fn ids(&self) -> Vec<FadId> {
        self.fads.keys().copied().collect()
    }

    pub fn total_biomass(&self, species: &Species) -> f64 {
        self.all_fads().map(|fad| fad.biology().biomass(species)).sum()
    }

    /// Stop tracking a FAD without touching its fish.
    ///
    /// Returns `None` if the FAD is not live, so a FAD is never removed twice.
    pub fn remove(&mut self, id: FadId) -> Option<Fad> {
        let drifting = self.fads.remove(&id)?;
        self.unindex(id, drifting.cell);
        Some(drifting.fad)
    }

    /// Release a FAD's fish into the tile under it and stop tracking it.
    pub fn release_and_remove(
        &mut self,
        id: FadId,
        ocean: &mut NauticalMap,
        reason: RemovalReason,
    ) -> Result<Option<FadRemoval>> {
        let Some(cell) = self.fad_tile(id) else {
            return Ok(None);
        };
        let Some(mut fad) = self.remove(id) else {
            return Ok(None);
        };
        release_all(&mut fad, cell, ocean)?;
        log::debug!("removed {id:?} at {cell:?} ({reason:?})");
        Ok(Some(FadRemoval {
            fad,
            reason,
            released_into: Some(cell),
            catch: None,
        }))
    }

    /// Set on a FAD: the gear catch leaves the system, the rest goes back into
    /// the tile and the FAD is removed.
    ///
    /// Without a gear everything aggregated is caught.
    pub fn set_on(
        &mut self,
        id: FadId,
        gear: Option<&AbundanceGear>,
        species: &[Species],
        ocean: &mut NauticalMap,
    ) -> Result<Option<FadRemoval>> {
        let Some(cell) = self.fad_tile(id) else {
            return Ok(None);
        };
        let Some(mut fad) = self.remove(id) else {
            return Ok(None);
        };
        let catch = match gear {
            Some(gear) => gear
                .catch(species, fad.biology())
                .context("failed to compute set catch")?,
            None => fad.biology().clone(),
        };
        fad.biology_mut()
            .subtract(&catch)
            .context("failed to take catch out of the FAD")?;
        release_all(&mut fad, cell, ocean)?;
        log::debug!("set on {id:?} at {cell:?}");
        Ok(Some(FadRemoval {
            fad,
            reason: RemovalReason::Set,
            released_into: Some(cell),
            catch: Some(catch),
        }))
    }

    /// Drift every FAD under the currents, then let each one attract and
    /// release fish at its new tile.
    ///
    /// A FAD that drifts onto land or off the map releases all its fish into
    /// the last water tile it occupied and is removed.
    pub fn step<R: Rng + ?Sized>(
        &mut self,
        step: u32,
        ocean: &mut NauticalMap,
        currents: &dyn CurrentVectors,
        attractor: &Attractor,
        species: &[Species],
        rng: &mut R,
    ) -> Result<StepReport> {
        let mut report = StepReport::default();
        let ids = self.ids();

        for &id in &ids {
            if let Some(removal) = self.drift(id, step, ocean, currents)? {
                report.removals.push(removal);
            }
        }

        for &id in &ids {
            let Some(drifting) = self.fads.get_mut(&id) else {
                continue;
            };
            let fad = &mut drifting.fad;
            fad.react_to_step(step);
            let tile = ocean
                .biology_mut(drifting.cell)
                .with_context(|| format!("{id:?} floats over {:?}, not water", drifting.cell))?;

            let attracted = attractor
                .attract(fad, tile, species, step, rng)
                .with_context(|| format!("failed to attract fish into {id:?}"))?;
            if let Some(amount) = attracted {
                LocalBiology::transfer(tile, fad.biology_mut(), &amount)
                    .with_context(|| format!("failed to move fish into {id:?}"))?;
                fad.record_attraction(step);
                report.n_attracting += 1;
            }

            let to_release = fad.species_to_release(rng);
            if !to_release.is_empty() {
                for i_species in to_release {
                    let released = fad.biology_mut().take_species(i_species);
                    tile.add(&released)
                        .with_context(|| format!("failed to release fish from {id:?}"))?;
                }
                report.n_releasing += 1;
            }
        }

        Ok(report)
    }

    fn drift(
        &mut self,
        id: FadId,
        step: u32,
        ocean: &mut NauticalMap,
        currents: &dyn CurrentVectors,
    ) -> Result<Option<FadRemoval>> {
        let Some(drifting) = self.fads.get_mut(&id) else {
            return Ok(None);
        };
        let old_cell = drifting.cell;
        let displacement = currents.vector(step, old_cell).scale(self.speed_multiplier);
        let new_position = drifting.position + displacement;

        let reason = match ocean.cell_at(new_position) {
            None => RemovalReason::ExitedMap,
            Some(cell) if !ocean.is_water(cell) => RemovalReason::Beached,
            Some(cell) => {
                drifting.position = new_position;
                if cell != old_cell {
                    drifting.cell = cell;
                    self.unindex(id, old_cell);
                    self.index.entry(cell).or_default().push(id);
                }
                return Ok(None);
            }
        };
        self.release_and_remove(id, ocean, reason)
    }

    fn unindex(&mut self, id: FadId, cell: Cell) {
        if let Some(bucket) = self.index.get_mut(&cell) {
            bucket.retain(|&other| other != id);
            if bucket.is_empty() {
                self.index.remove(&cell);
            }
        }
    }
}

fn release_all(fad: &mut Fad, cell: Cell, ocean: &mut NauticalMap) -> Result<()> {
    let content = fad.biology_mut().take();
    ocean
        .biology_mut(cell)
        .with_context(|| format!("{cell:?} is not a water tile"))?
        .add(&content)
        .context("failed to release FAD content")
}
