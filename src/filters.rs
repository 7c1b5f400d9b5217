//! Selectivity curves and abundance filters.
//!
//! A filter maps the abundance matrix of a species to a matrix of the same
//! shape. [`AbundanceFilter::filter`] always returns a freshly owned matrix and
//! leaves its input untouched; callers that want the result written back use
//! [`AbundanceFilter::filter_in_place`].

use crate::biology::Species;
use anyhow::{Context, Result, bail};
use ndarray::{Array2, Zip};
use std::{cell::RefCell, collections::HashMap};

/// Round to the nearest integer, ties going up.
pub fn quick_round(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Length-based selectivity formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Selectivity {
    /// 1 on one side of `cutoff`, 0 on the other.
    Cutoff { cutoff: f64, select_higher: bool },
    /// Stock-assessment double normal curve.
    ///
    /// `initial_scaling` and `final_scaling` are the optional fifth and sixth
    /// parameters of the nine-parameter form.
    DoubleNormal {
        peak: f64,
        top: f64,
        asc_width: f64,
        dsc_width: f64,
        initial_scaling: Option<f64>,
        final_scaling: Option<f64>,
        bin_min: f64,
        bin_max: f64,
        bin_width: f64,
    },
    /// Base-2 decay on each side of the fully selected length.
    SimplifiedDoubleNormal {
        full_selectivity_length: f64,
        slope_left: f64,
        slope_right: f64,
    },
    /// Logistic curve reaching 0.5 at `inflection` and 0.95 at `inflection + width`.
    Logistic { inflection: f64, width: f64 },
    /// Logistic retention curve with an asymptote below 1.
    Retention {
        inflection: f64,
        slope: f64,
        asymptote: f64,
    },
}

impl Selectivity {
    fn validate(&self) -> Result<()> {
        match *self {
            Selectivity::Cutoff { cutoff, .. } => {
                if !cutoff.is_finite() {
                    bail!("cutoff must be finite");
                }
            }
            Selectivity::DoubleNormal {
                bin_width, bin_min, bin_max, ..
            } => {
                if !(bin_width > 0.0) {
                    bail!("bin width must be positive, but is {bin_width}");
                }
                if bin_max < bin_min {
                    bail!("bin max ({bin_max}) must not be below bin min ({bin_min})");
                }
            }
            Selectivity::SimplifiedDoubleNormal {
                slope_left,
                slope_right,
                ..
            } => {
                if slope_left == 0.0 || slope_right == 0.0 {
                    bail!("slopes must be non-zero");
                }
            }
            Selectivity::Logistic { width, .. } => {
                if width == 0.0 {
                    bail!("logistic width must be non-zero");
                }
            }
            Selectivity::Retention {
                slope, asymptote, ..
            } => {
                if slope == 0.0 {
                    bail!("retention slope must be non-zero");
                }
                if !(0.0..=1.0).contains(&asymptote) {
                    bail!("retention asymptote must be in [0, 1], but is {asymptote}");
                }
            }
        }
        Ok(())
    }

    /// Selectivity of every `(subdivision, bin)` cell of `species`.
    pub fn compute(&self, species: &Species) -> Array2<f64> {
        match *self {
            Selectivity::Cutoff {
                cutoff,
                select_higher,
            } => species.lengths().mapv(|length| {
                if (length >= cutoff) == select_higher {
                    1.0
                } else {
                    0.0
                }
            }),
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
            } => double_normal(
                species,
                peak,
                top,
                asc_width,
                dsc_width,
                initial_scaling,
                final_scaling,
                bin_min,
                bin_max,
                bin_width,
            ),
            Selectivity::SimplifiedDoubleNormal {
                full_selectivity_length,
                slope_left,
                slope_right,
            } => species.lengths().mapv(|length| {
                let slope = if length < full_selectivity_length {
                    slope_left
                } else {
                    slope_right
                };
                2f64.powf(-((length - full_selectivity_length) / slope).powi(2))
            }),
            Selectivity::Logistic { inflection, width } => species.lengths().mapv(|length| {
                1.0 / (1.0 + (-(19f64.ln()) * (length - inflection) / width).exp())
            }),
            Selectivity::Retention {
                inflection,
                slope,
                asymptote,
            } => species
                .lengths()
                .mapv(|length| asymptote / (1.0 + (-(length - inflection) / slope).exp())),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn double_normal(
    species: &Species,
    peak: f64,
    top: f64,
    asc_width: f64,
    dsc_width: f64,
    initial_scaling: Option<f64>,
    final_scaling: Option<f64>,
    bin_min: f64,
    bin_max: f64,
    bin_width: f64,
) -> Array2<f64> {
    let (n_sub, n_bins) = species.shape();
    let exp_width = asc_width.exp();
    let exp_dsc = dsc_width.exp();
    let exp_top = peak
        + bin_width
        + (0.99 * (bin_max + bin_width / 2.0) - peak - bin_width) / (1.0 + (-top).exp());

    let join = |bin: f64, center: f64| {
        1.0 / (1.0 + (-(20.0 * (bin - center) / (1.0 + (bin - center).abs()))).exp())
    };

    let mut asc = Array2::zeros((n_sub, n_bins));
    let mut desc = Array2::zeros((n_sub, n_bins));
    let mut join1 = Array2::zeros((n_sub, n_bins));
    let mut join2 = Array2::zeros((n_sub, n_bins));
    for sub in 0..n_sub {
        for bin_idx in 0..n_bins {
            let bin = bin_width / 2.0 + (species.length(sub, bin_idx) - bin_min) / bin_width;
            asc[[sub, bin_idx]] = (-((bin - peak).powi(2) / exp_width)).exp();
            desc[[sub, bin_idx]] = (-((bin - exp_top).powi(2) / exp_dsc)).exp();
            join1[[sub, bin_idx]] = join(bin, peak);
            join2[[sub, bin_idx]] = join(bin, exp_top);
        }
    }

    // The last bin is never rescaled.
    let last = n_bins.saturating_sub(1);
    if let Some(scaling) = initial_scaling.filter(|s| s.is_finite()) {
        let scaling = 1.0 / (1.0 + (-scaling).exp());
        let min_scaling = (-((bin_min + bin_width / 2.0 - peak).powi(2) / exp_width)).exp();
        for sub in 0..n_sub {
            for bin_idx in 0..last {
                asc[[sub, bin_idx]] = scaling
                    + (1.0 - scaling) * (asc[[sub, bin_idx]] - min_scaling) / (1.0 - min_scaling);
            }
        }
    }
    if let Some(scaling) = final_scaling.filter(|s| s.is_finite()) {
        let scaling = 1.0 / (1.0 + (-scaling).exp());
        let max_scaling = (-((bin_max + bin_width / 2.0 - exp_top).powi(2) / exp_dsc)).exp();
        for sub in 0..n_sub {
            for bin_idx in 0..last {
                desc[[sub, bin_idx]] =
                    1.0 + (scaling - 1.0) * (desc[[sub, bin_idx]] - 1.0) / (max_scaling - 1.0);
            }
        }
    }

    let mut selex = Array2::zeros((n_sub, n_bins));
    for sub in 0..n_sub {
        for bin_idx in 0..n_bins {
            let selected = match initial_scaling {
                None => true,
                Some(s) => legacy_threshold_selects(sub, species.length(sub, bin_idx), s),
            };
            if selected {
                let j1 = join1[[sub, bin_idx]];
                let j2 = join2[[sub, bin_idx]];
                selex[[sub, bin_idx]] = asc[[sub, bin_idx]] * (1.0 - j1)
                    + j1 * ((1.0 - j2) + desc[[sub, bin_idx]] * j2);
            }
        }
    }
    selex
}

/// Legacy length threshold of the double normal curve.
///
/// Subdivision 1 (females) uses the reversed comparison, so with any finite
/// initial scaling realistic lengths in that row get zero selectivity.
fn legacy_threshold_selects(subdivision: usize, length: f64, initial_scaling: f64) -> bool {
    let threshold = -1000.0 - initial_scaling;
    if subdivision == 1 {
        threshold > length
    } else {
        length > threshold
    }
}

/// Filter that multiplies abundance by a selectivity formula.
///
/// With memoization on, the selectivity matrix of each species is computed
/// once and reused. Entries are keyed by species index and name.
#[derive(Debug)]
pub struct FormulaFilter {
    selectivity: Selectivity,
    memoize: bool,
    rounding: bool,
    cache: RefCell<HashMap<(usize, String), Array2<f64>>>,
}

impl FormulaFilter {
    pub fn new(selectivity: Selectivity, memoize: bool, rounding: bool) -> Result<Self> {
        selectivity
            .validate()
            .context("invalid selectivity parameters")?;
        Ok(Self {
            selectivity,
            memoize,
            rounding,
            cache: RefCell::new(HashMap::new()),
        })
    }

    pub fn formula(&self) -> &Selectivity {
        &self.selectivity
    }

    /// Selectivity matrix for `species`, cached when memoizing.
    pub fn selectivity(&self, species: &Species) -> Array2<f64> {
        if !self.memoize {
            return self.selectivity.compute(species);
        }
        let key = (species.index(), species.name().to_string());
        let mut cache = self.cache.borrow_mut();
        if let Some(selex) = cache
            .get(&key)
            .filter(|selex| selex.dim() == species.shape())
        {
            return selex.clone();
        }
        let selex = self.selectivity.compute(species);
        cache.insert(key, selex.clone());
        selex
    }

    fn apply(&self, species: &Species, abundance: &mut Array2<f64>) {
        let selex = self.selectivity(species);
        let rounding = self.rounding;
        Zip::from(abundance).and(&selex).for_each(|n, &s| {
            *n *= s;
            if rounding {
                *n = quick_round(*n);
            }
        });
    }
}

impl Clone for FormulaFilter {
    fn clone(&self) -> Self {
        Self {
            selectivity: self.selectivity.clone(),
            memoize: self.memoize,
            rounding: self.rounding,
            cache: RefCell::new(self.cache.borrow().clone()),
        }
    }
}

/// Abundance filter.
#[derive(Debug, Clone)]
pub enum AbundanceFilter {
    /// Selectivity curve computed from the species' lengths.
    Formula(FormulaFilter),
    /// Fraction supplied directly for each `(subdivision, bin)`.
    Array { values: Array2<f64>, rounding: bool },
    /// Fraction `1 - exp(-mortality)` of every cell.
    ExponentialMortality { mortality: f64 },
    /// Fixed fraction of every cell.
    Proportion(f64),
    /// Element-wise maximum of the component filters.
    MaximumOf(Vec<AbundanceFilter>),
}

impl AbundanceFilter {
    pub fn formula(selectivity: Selectivity, memoize: bool, rounding: bool) -> Result<Self> {
        Ok(AbundanceFilter::Formula(FormulaFilter::new(
            selectivity,
            memoize,
            rounding,
        )?))
    }

    pub fn array(values: Array2<f64>, rounding: bool) -> Result<Self> {
        if values.iter().any(|v| !v.is_finite()) {
            bail!("array filter values must be finite");
        }
        Ok(AbundanceFilter::Array { values, rounding })
    }

    pub fn exponential_mortality(mortality: f64) -> Result<Self> {
        if !(mortality >= 0.0 && mortality.is_finite()) {
            bail!("mortality must be finite and non-negative, but is {mortality}");
        }
        Ok(AbundanceFilter::ExponentialMortality { mortality })
    }

    pub fn proportion(proportion: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&proportion) {
            bail!("proportion must be in [0, 1], but is {proportion}");
        }
        Ok(AbundanceFilter::Proportion(proportion))
    }

    pub fn maximum_of(filters: Vec<AbundanceFilter>) -> Result<Self> {
        if filters.is_empty() {
            bail!("maximum of filters needs at least one component");
        }
        Ok(AbundanceFilter::MaximumOf(filters))
    }

    /// Filter a copy of `abundance`, returning the result.
    ///
    /// # Errors
    /// Returns an error if the matrix or a lookup table does not match the
    /// shape of the species meristics.
    pub fn filter(&self, species: &Species, abundance: &Array2<f64>) -> Result<Array2<f64>> {
        let mut filtered = abundance.clone();
        self.filter_in_place(species, &mut filtered)?;
        Ok(filtered)
    }

    /// Filter `abundance`, overwriting it with the result.
    pub fn filter_in_place(&self, species: &Species, abundance: &mut Array2<f64>) -> Result<()> {
        species
            .check_shape(abundance)
            .context("abundance does not match species")?;
        match self {
            AbundanceFilter::Formula(formula) => formula.apply(species, abundance),
            AbundanceFilter::Array { values, rounding } => {
                species
                    .check_shape(values)
                    .context("array filter does not match species")?;
                Zip::from(abundance).and(values).for_each(|n, &v| {
                    *n *= v;
                    if *rounding {
                        *n = quick_round(*n);
                    }
                });
            }
            AbundanceFilter::ExponentialMortality { mortality } => {
                let fraction = 1.0 - (-mortality).exp();
                abundance.mapv_inplace(|n| n * fraction);
            }
            AbundanceFilter::Proportion(proportion) => {
                abundance.mapv_inplace(|n| n * proportion);
            }
            AbundanceFilter::MaximumOf(filters) => {
                let mut maximum: Option<Array2<f64>> = None;
                for (i_filter, filter) in filters.iter().enumerate() {
                    let filtered = filter
                        .filter(species, abundance)
                        .with_context(|| format!("failed to apply component filter {i_filter}"))?;
                    maximum = Some(match maximum {
                        None => filtered,
                        Some(mut max) => {
                            Zip::from(&mut max)
                                .and(&filtered)
                                .for_each(|m, &f| *m = m.max(f));
                            max
                        }
                    });
                }
                if let Some(max) = maximum {
                    abundance.assign(&max);
                }
            }
        }
        Ok(())
    }
}
