//! Species meristics and the biology held by sea tiles and FADs.

use anyhow::{Context, Result, bail};
use ndarray::{Array2, Zip};

/// Species of the simulation.
///
/// Holds the length and weight of one fish in each `(subdivision, bin)` cell.
/// Subdivisions are cohorts such as sex, bins are age or length classes.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    name: String,
    index: usize,
    lengths: Array2<f64>,
    weights: Array2<f64>,
}

impl Species {
    /// Create a new species from its length and weight tables.
    ///
    /// # Errors
    /// Returns an error if the tables are empty, differ in shape,
    /// or contain negative or non-finite values.
    pub fn new(
        name: impl Into<String>,
        index: usize,
        lengths: Array2<f64>,
        weights: Array2<f64>,
    ) -> Result<Self> {
        let name = name.into();
        if lengths.is_empty() {
            bail!("species {name:?} must have at least one subdivision and one bin");
        }
        if lengths.dim() != weights.dim() {
            bail!(
                "species {name:?} length table has shape {:?}, but weight table has shape {:?}",
                lengths.dim(),
                weights.dim()
            );
        }
        if weights.iter().any(|&w| !w.is_finite() || w < 0.0) {
            bail!("species {name:?} weights must be finite and non-negative");
        }
        if lengths.iter().any(|&l| !l.is_finite()) {
            bail!("species {name:?} lengths must be finite");
        }
        Ok(Self {
            name,
            index,
            lengths,
            weights,
        })
    }

    /// Create a species with a single subdivision from per-bin lists.
    pub fn from_bins(
        name: impl Into<String>,
        index: usize,
        lengths: &[f64],
        weights: &[f64],
    ) -> Result<Self> {
        let lengths = Array2::from_shape_vec((1, lengths.len()), lengths.to_vec())
            .context("failed to build length table")?;
        let weights = Array2::from_shape_vec((1, weights.len()), weights.to_vec())
            .context("failed to build weight table")?;
        Self::new(name, index, lengths, weights)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of the species in every per-species vector of the simulation.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn n_subdivisions(&self) -> usize {
        self.lengths.nrows()
    }

    pub fn n_bins(&self) -> usize {
        self.lengths.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.lengths.dim()
    }

    pub fn length(&self, subdivision: usize, bin: usize) -> f64 {
        self.lengths[[subdivision, bin]]
    }

    pub fn weight(&self, subdivision: usize, bin: usize) -> f64 {
        self.weights[[subdivision, bin]]
    }

    pub fn lengths(&self) -> &Array2<f64> {
        &self.lengths
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Total weight of an abundance matrix of this species.
    pub fn weigh(&self, abundance: &Array2<f64>) -> f64 {
        Zip::from(abundance)
            .and(&self.weights)
            .fold(0.0, |acc, &n, &w| acc + n * w)
    }

    /// Fail unless `matrix` has the shape of this species' meristics.
    pub fn check_shape(&self, matrix: &Array2<f64>) -> Result<()> {
        if matrix.dim() != self.shape() {
            bail!(
                "matrix shape must be {:?} for species {:?}, but is {:?}",
                self.shape(),
                self.name,
                matrix.dim()
            );
        }
        Ok(())
    }
}

/// Fish held by a sea tile or a FAD.
///
/// A `LocalBiology` is owned by exactly one holder. Fish move between holders
/// only through [`LocalBiology::transfer`] and [`LocalBiology::take`], so the
/// amount debited from one side is the amount credited to the other.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalBiology {
    /// Aggregate biomass (kg) per species.
    Biomass(Vec<f64>),
    /// Number of fish per `(subdivision, bin)` per species.
    Abundance(Vec<Array2<f64>>),
}

impl LocalBiology {
    pub fn empty_biomass(n_species: usize) -> Self {
        LocalBiology::Biomass(vec![0.0; n_species])
    }

    pub fn empty_abundance(species: &[Species]) -> Self {
        LocalBiology::Abundance(species.iter().map(|s| Array2::zeros(s.shape())).collect())
    }

    /// An empty biology of the same kind and shape as `self`.
    pub fn empty_like(&self) -> Self {
        match self {
            LocalBiology::Biomass(vec) => LocalBiology::Biomass(vec![0.0; vec.len()]),
            LocalBiology::Abundance(mats) => {
                LocalBiology::Abundance(mats.iter().map(|m| Array2::zeros(m.dim())).collect())
            }
        }
    }

    pub fn n_species(&self) -> usize {
        match self {
            LocalBiology::Biomass(vec) => vec.len(),
            LocalBiology::Abundance(mats) => mats.len(),
        }
    }

    /// Biomass of one species, weighing abundance with the species meristics.
    pub fn biomass(&self, species: &Species) -> f64 {
        match self {
            LocalBiology::Biomass(vec) => vec.get(species.index()).copied().unwrap_or(0.0),
            LocalBiology::Abundance(mats) => mats
                .get(species.index())
                .map_or(0.0, |mat| species.weigh(mat)),
        }
    }

    pub fn biomass_vec(&self, species: &[Species]) -> Vec<f64> {
        species.iter().map(|s| self.biomass(s)).collect()
    }

    pub fn total_biomass(&self, species: &[Species]) -> f64 {
        species.iter().map(|s| self.biomass(s)).sum()
    }

    pub fn abundance(&self, species_index: usize) -> Option<&Array2<f64>> {
        match self {
            LocalBiology::Biomass(_) => None,
            LocalBiology::Abundance(mats) => mats.get(species_index),
        }
    }

    /// True when no species holds any fish.
    pub fn is_empty(&self) -> bool {
        match self {
            LocalBiology::Biomass(vec) => vec.iter().all(|&b| b <= 0.0),
            LocalBiology::Abundance(mats) => mats.iter().all(|m| m.iter().all(|&n| n <= 0.0)),
        }
    }

    /// Add the content of `other` to `self`.
    pub fn add(&mut self, other: &LocalBiology) -> Result<()> {
        self.combine(other, |own, amount| *own += amount)
    }

    /// Remove the content of `other` from `self`.
    pub fn subtract(&mut self, other: &LocalBiology) -> Result<()> {
        self.combine(other, |own, amount| *own -= amount)
    }

    /// Move `amount` from `from` into `to`.
    ///
    /// Both sides are updated with the same values, so the sum over the two
    /// holders is unchanged.
    pub fn transfer(
        from: &mut LocalBiology,
        to: &mut LocalBiology,
        amount: &LocalBiology,
    ) -> Result<()> {
        from.subtract(amount).context("failed to debit source biology")?;
        to.add(amount).context("failed to credit destination biology")?;
        Ok(())
    }

    /// Take everything, leaving `self` empty.
    pub fn take(&mut self) -> LocalBiology {
        let empty = self.empty_like();
        std::mem::replace(self, empty)
    }

    /// Take every fish of one species, leaving the other species untouched.
    pub fn take_species(&mut self, species_index: usize) -> LocalBiology {
        let mut taken = self.empty_like();
        match (self, &mut taken) {
            (LocalBiology::Biomass(own), LocalBiology::Biomass(out)) => {
                if let (Some(src), Some(dst)) =
                    (own.get_mut(species_index), out.get_mut(species_index))
                {
                    *dst = std::mem::take(src);
                }
            }
            (LocalBiology::Abundance(own), LocalBiology::Abundance(out)) => {
                if let (Some(src), Some(dst)) =
                    (own.get_mut(species_index), out.get_mut(species_index))
                {
                    std::mem::swap(src, dst);
                }
            }
            _ => {}
        }
        taken
    }

    fn combine(&mut self, other: &LocalBiology, op: impl Fn(&mut f64, f64)) -> Result<()> {
        match (self, other) {
            (LocalBiology::Biomass(own), LocalBiology::Biomass(amount)) => {
                if own.len() != amount.len() {
                    bail!(
                        "biomass vector length must be {}, but is {}",
                        own.len(),
                        amount.len()
                    );
                }
                own.iter_mut().zip(amount).for_each(|(o, &a)| op(o, a));
            }
            (LocalBiology::Abundance(own), LocalBiology::Abundance(amount)) => {
                if own.len() != amount.len() {
                    bail!(
                        "abundance must hold {} species, but holds {}",
                        own.len(),
                        amount.len()
                    );
                }
                for (i_species, (o, a)) in own.iter_mut().zip(amount).enumerate() {
                    if o.dim() != a.dim() {
                        bail!(
                            "abundance of species {i_species} must have shape {:?}, but has {:?}",
                            o.dim(),
                            a.dim()
                        );
                    }
                    Zip::from(o).and(a).for_each(|o, &a| op(o, a));
                }
            }
            _ => bail!("cannot combine biomass and abundance biologies"),
        }
        Ok(())
    }
}
