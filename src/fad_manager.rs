use crate::fad::{FadId, FadInitializer, OwnerId};
use crate::fad_map::{FadMap, FadRemoval, RemovalReason};
use crate::ocean::{NauticalMap, Vector2};
use anyhow::{Result, bail};
use rand::prelude::*;
use std::collections::BTreeSet;

/// FAD inventory of one owner (a vessel).
#[derive(Debug, Clone)]
pub struct FadManager {
    owner: OwnerId,
    n_in_stock: usize,
    deployed: BTreeSet<FadId>,
}

impl FadManager {
    pub fn new(owner: OwnerId, n_in_stock: usize) -> Self {
        Self {
            owner,
            n_in_stock,
            deployed: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn n_in_stock(&self) -> usize {
        self.n_in_stock
    }

    pub fn n_deployed(&self) -> usize {
        self.deployed.len()
    }

    pub fn deployed(&self) -> impl Iterator<Item = FadId> + '_ {
        self.deployed.iter().copied()
    }

    /// Take a FAD out of stock and put it in the water at `position`.
    pub fn deploy<R: Rng + ?Sized>(
        &mut self,
        fad_map: &mut FadMap,
        initializer: &FadInitializer,
        position: Vector2,
        step: u32,
        ocean: &NauticalMap,
        rng: &mut R,
    ) -> Result<FadId> {
        if self.n_in_stock == 0 {
            bail!("owner {} has no FADs left in stock", self.owner);
        }
        let id = fad_map.deploy(initializer, Some(self.owner), position, step, ocean, rng)?;
        self.n_in_stock -= 1;
        self.deployed.insert(id);
        Ok(id)
    }

    /// Forget a FAD that left play without being picked up.
    pub fn lose_fad(&mut self, id: FadId) -> Result<()> {
        if !self.deployed.remove(&id) {
            bail!("{id:?} is not deployed by owner {}", self.owner);
        }
        Ok(())
    }

    /// Recover a deployed FAD, releasing its fish, and put it back in stock.
    pub fn pick_up(
        &mut self,
        fad_map: &mut FadMap,
        id: FadId,
        ocean: &mut NauticalMap,
    ) -> Result<Option<FadRemoval>> {
        if !self.deployed.contains(&id) {
            bail!("{id:?} is not deployed by owner {}", self.owner);
        }
        let removal = fad_map.release_and_remove(id, ocean, RemovalReason::PickedUp)?;
        self.deployed.remove(&id);
        self.n_in_stock += 1;
        Ok(removal)
    }

    /// Update the inventory after the map removed one of our FADs.
    pub fn react_to_removal(&mut self, removal: &mut FadRemoval) -> Result<()> {
        if removal.reason == RemovalReason::PickedUp {
            return Ok(());
        }
        removal.fad.lose();
        self.lose_fad(removal.fad.id())
    }
}
