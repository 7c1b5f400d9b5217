#![allow(dead_code)]

use fadsim::biology::{LocalBiology, Species};
use fadsim::ocean::{Extent, NauticalMap};
use ndarray::Array2;

pub const TOL: f64 = 1e-9;

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tolerance {tol})"
    );
}

pub fn assert_all_close(actual: &Array2<f64>, expected: &Array2<f64>, tol: f64) {
    assert_eq!(actual.dim(), expected.dim(), "shapes differ");
    for (a, e) in actual.iter().zip(expected) {
        assert_close(*a, *e, tol);
    }
}

/// Two subdivisions of five length bins.
pub fn two_by_five_species(index: usize) -> Species {
    let lengths = Array2::from_shape_fn((2, 5), |(sub, bin)| 20.0 + 20.0 * bin as f64 + sub as f64);
    let weights = Array2::from_shape_fn((2, 5), |(_, bin)| 0.5 + bin as f64);
    Species::new(format!("species {index}"), index, lengths, weights)
        .expect("failed to build species")
}

/// All-water map with the given biology in every tile.
pub fn open_ocean(width: usize, height: usize, biology: &LocalBiology) -> NauticalMap {
    NauticalMap::new(
        Array2::from_elem((height, width), -100.0),
        Extent::default(),
        biology,
    )
    .expect("failed to build map")
}

/// Sum over every tile of the map and every FAD, per species.
pub fn system_biomass(
    ocean: &NauticalMap,
    fad_map: &fadsim::fad_map::FadMap,
    species: &[Species],
) -> Vec<f64> {
    species
        .iter()
        .map(|s| ocean.total_biomass(s) + fad_map.total_biomass(s))
        .collect()
}

/// Small but complete simulation: a 4x3 ocean with a land tile, two species,
/// one owner deploying three FADs and one observed set.
pub const SMALL_CONFIG: &str = r#"
seed = 17
n_steps = 12
steps_per_year = 365

[map]
altitude = [
    [-50.0, -50.0, -50.0, -50.0],
    [-50.0, -50.0, 20.0, -50.0],
    [-50.0, -50.0, -50.0, -50.0],
]
min_lon = -10.0
min_lat = 0.0
cell_size = 1.0

[[species]]
name = "skipjack"
lengths = [[50.0]]
weights = [[1.0]]

[[species]]
name = "yellowfin"
lengths = [[80.0]]
weights = [[1.0]]

[biology]
kind = "biomass"
tile_biomass = [200.0, 100.0]

[fads]
dud_probability = 0.0
release_probabilities = [0.05, 0.05]

[fads.capacity]
kind = "total"
distribution = { type = "uniform", min = 40.0, max = 60.0 }

[[fads.owners]]
stock = 3

[[fads.deployments]]
step = 0
owner = 0
x = 0.5
y = 0.5

[[fads.deployments]]
step = 0
owner = 0
x = 3.5
y = 2.5

[[fads.deployments]]
step = 2
owner = 0
x = 1.5
y = 2.5

[[fads.deployments]]
step = 3
owner = 0
x = 0.5
y = 2.5

[attractor]
kind = "logistic"
attractable_biomass_coefficients = [0.5, 0.5]
interaction_coefficients = [0.1, 0.1]
compression_exponents = [2.0, 2.0]
attraction_rates = [0.2, 0.2]

[currents]
speed_multiplier = 1.0

[currents.field]
kind = "uniform"
dx = 0.1
dy = 0.0

[exogenous]
neighborhood = 1
log = true

[[exogenous.observations]]
day = 6
lon = -9.5
lat = 0.5
biomass = [20.0, 10.0]

[[gear]]
type = "proportion"
proportion = 0.5
"#;

/// Abundance-structured run with a linear-interval attractor, drifting FADs
/// before the attractor is refreshed.
pub const ABUNDANCE_CONFIG: &str = r#"
seed = 3
n_steps = 8
schedule = ["fad_drift", "attractor_refresh", "exogenous_sets"]

[map]
altitude = [
    [-50.0, -50.0],
    [-50.0, -50.0],
]

[[species]]
name = "bigeye"
lengths = [[30.0, 60.0]]
weights = [[1.0, 2.0]]

[biology]
kind = "abundance"
tile_abundance = [[[1000.0, 1000.0]]]

[fads.capacity]
kind = "per_species"
distributions = [{ type = "fixed", value = 120.0 }]

[[fads.owners]]
stock = 2

[[fads.deployments]]
step = 0
owner = 0
x = 0.5
y = 0.5

[[fads.deployments]]
step = 1
owner = 0
x = 1.5
y = 1.5

[attractor]
kind = "linear_interval"
days_to_fill = 10

[[attractor.selectivity]]
type = "array"
values = [[0.1, 0.5]]

[currents.field]
kind = "uniform"
dx = 0.3
dy = 0.2
"#;
