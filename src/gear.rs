use crate::biology::{LocalBiology, Species};
use crate::filters::AbundanceFilter;
use anyhow::{Context, Result, bail};
use ndarray::{Array2, Zip};

/// Gear that applies the same chain of filters to every species.
#[derive(Debug, Clone)]
pub struct AbundanceGear {
    filters: Vec<AbundanceFilter>,
}

impl AbundanceGear {
    pub fn new(filters: Vec<AbundanceFilter>) -> Result<Self> {
        if filters.is_empty() {
            bail!("gear needs at least one filter");
        }
        Ok(Self { filters })
    }

    pub fn filters(&self) -> &[AbundanceFilter] {
        &self.filters
    }

    /// Run every filter in order on a copy of `abundance`.
    ///
    /// Each cell of the catch lies between 0 and what `abundance` holds, even
    /// when a filter rounds up.
    pub fn catch_abundance(
        &self,
        species: &Species,
        abundance: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let mut catch = abundance.clone();
        // Nothing to catch, skip the filters.
        if catch.iter().all(|&n| n <= 0.0) {
            return Ok(catch);
        }
        for (i_filter, filter) in self.filters.iter().enumerate() {
            filter
                .filter_in_place(species, &mut catch)
                .with_context(|| {
                    format!("failed to apply filter {i_filter} to {:?}", species.name())
                })?;
        }
        Zip::from(&mut catch)
            .and(abundance)
            .for_each(|c, &held| *c = c.min(held).max(0.0));
        Ok(catch)
    }

    /// What a set on `biology` would catch.
    ///
    /// Biomass biologies carry no size structure, so the whole biomass is caught.
    pub fn catch(&self, species: &[Species], biology: &LocalBiology) -> Result<LocalBiology> {
        match biology {
            LocalBiology::Biomass(vec) => Ok(LocalBiology::Biomass(vec.clone())),
            LocalBiology::Abundance(mats) => {
                if mats.len() != species.len() {
                    bail!(
                        "biology holds {} species, but {} are defined",
                        mats.len(),
                        species.len()
                    );
                }
                let catches = species
                    .iter()
                    .zip(mats)
                    .map(|(s, mat)| self.catch_abundance(s, mat))
                    .collect::<Result<Vec<_>>>()?;
                Ok(LocalBiology::Abundance(catches))
            }
        }
    }
}
