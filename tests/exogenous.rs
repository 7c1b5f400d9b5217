mod common;

use common::{TOL, assert_close, open_ocean};
use fadsim::biology::{LocalBiology, Species};
use fadsim::exogenous::{
    DEFAULT_MISSING_FAD_ERROR, ERROR, ExogenousFadSetter, FAILED_MATCHES, FadSetObservation,
    MATCHES, OUT_OF_BOUNDS, ResetInterval,
};
use fadsim::fad::{CapacityDistribution, FadId, FadInitializer};
use fadsim::fad_map::{FadMap, RemovalReason};
use fadsim::ocean::{Cell, NauticalMap};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;

const DAY: u32 = 123;

fn two_species() -> Vec<Species> {
    vec![
        Species::from_bins("a", 0, &[1.0], &[1.0]).expect("failed to build species"),
        Species::from_bins("b", 1, &[1.0], &[1.0]).expect("failed to build species"),
    ]
}

fn observation(lon: f64, lat: f64, biomass: f64) -> FadSetObservation {
    FadSetObservation {
        day: DAY,
        lon,
        lat,
        biomass: vec![biomass, biomass],
    }
}

/// FADs holding `biomass[i]` of both species, all in `cell`.
fn fads_holding(ocean: &NauticalMap, cell: Cell, biomass: &[f64]) -> (FadMap, Vec<FadId>) {
    let initializer = FadInitializer::with_total_capacity(
        CapacityDistribution::Fixed(1000.0),
        0.0,
        LocalBiology::empty_biomass(2),
    )
    .expect("failed to build initializer");
    let mut fad_map = FadMap::new(1.0).expect("failed to build FAD map");
    let mut rng = ChaCha12Rng::seed_from_u64(0);
    let mut ids = Vec::new();
    for &b in biomass {
        let id = fad_map
            .deploy_at_cell(&initializer, None, cell, 0, ocean, &mut rng)
            .expect("failed to deploy");
        *fad_map.fad_mut(id).expect("missing FAD").biology_mut() =
            LocalBiology::Biomass(vec![b, b]);
        ids.push(id);
    }
    (fad_map, ids)
}

fn column(setter: &ExogenousFadSetter, name: &str) -> f64 {
    setter.counter().column(name).expect("missing column")
}

#[test]
fn chooses_the_closest_fads() {
    let species = two_species();
    let ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (fad_map, ids) = fads_holding(&ocean, Cell::new(0, 0), &[10.0, 20.0, 30.0, 40.0]);
    let mut setter = ExogenousFadSetter::new(vec![
        observation(0.5, 0.5, 100.0),
        observation(0.5, 0.5, 10.0),
    ]);

    let chosen = setter
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");

    assert_eq!(chosen, vec![ids[3], ids[0]]);
    assert_close(column(&setter, MATCHES), 2.0, TOL);
    assert_close(column(&setter, FAILED_MATCHES), 0.0, TOL);
    assert_close(column(&setter, OUT_OF_BOUNDS), 0.0, TOL);
    assert_close(column(&setter, ERROR), (2.0 * 60f64.powi(2)).sqrt(), TOL);
}

#[test]
fn unmatched_observation_pays_the_penalty_and_is_logged() {
    let species = two_species();
    let ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (fad_map, _) = fads_holding(&ocean, Cell::new(0, 0), &[40.0]);
    let mut setter = ExogenousFadSetter::new(vec![
        observation(0.5, 0.5, 100.0),
        observation(0.5, 0.5, 10.0),
    ]);
    setter.start_or_reset_log(&species);

    setter
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");

    let error = (2.0 * 60f64.powi(2)).sqrt();
    assert_close(column(&setter, MATCHES), 1.0, TOL);
    assert_close(column(&setter, FAILED_MATCHES), 1.0, TOL);
    assert_close(column(&setter, OUT_OF_BOUNDS), 0.0, TOL);
    assert_close(column(&setter, ERROR), error + DEFAULT_MISSING_FAD_ERROR, TOL);

    let expected = format!(
        "day,x,y,result,error,a,a_simulated,b,b_simulated\n\
         123,0,0,MATCH,{error},100,40,100,40\n\
         123,0,0,FAILED,NaN\n"
    );
    assert_eq!(setter.log(), expected);
}

#[test]
fn out_of_bounds_observations_are_counted_separately() {
    let species = two_species();
    let ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (fad_map, _) = fads_holding(&ocean, Cell::new(0, 0), &[40.0]);
    let mut setter = ExogenousFadSetter::new(vec![
        observation(-5.0, 0.5, 100.0),
        observation(0.5, 7.0, 10.0),
    ]);

    let chosen = setter
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");

    assert!(chosen.is_empty());
    assert_close(column(&setter, MATCHES), 0.0, TOL);
    assert_close(column(&setter, FAILED_MATCHES), 0.0, TOL);
    assert_close(column(&setter, OUT_OF_BOUNDS), 2.0, TOL);
    assert_close(column(&setter, ERROR), 0.0, TOL);
}

#[test]
fn neighborhood_widens_the_search() {
    let species = two_species();
    let ocean = open_ocean(3, 3, &LocalBiology::empty_biomass(2));
    let (fad_map, ids) = fads_holding(&ocean, Cell::new(1, 1), &[40.0]);

    let mut narrow = ExogenousFadSetter::new(vec![observation(0.5, 0.5, 40.0)]);
    let chosen = narrow
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");
    assert!(chosen.is_empty());
    assert_close(column(&narrow, FAILED_MATCHES), 1.0, TOL);

    let mut wide = ExogenousFadSetter::new(vec![observation(0.5, 0.5, 40.0)]).with_neighborhood(1);
    let chosen = wide
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");
    assert_eq!(chosen, ids);
    assert_close(column(&wide, ERROR), 0.0, TOL);
}

#[test]
fn scale_applies_to_simulated_biomass() {
    let setter = ExogenousFadSetter::new(Vec::new())
        .with_simulated_to_data_scale(2.0)
        .expect("invalid scale");
    let error = setter.compute_error(&observation(0.0, 0.0, 100.0), &[40.0, 50.0]);
    assert_close(error, 20.0, TOL);
}

#[test]
fn step_sets_on_matched_fads() {
    let species = two_species();
    let mut ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (mut fad_map, ids) = fads_holding(&ocean, Cell::new(0, 0), &[10.0, 40.0]);
    let mut setter = ExogenousFadSetter::new(vec![observation(0.5, 0.5, 35.0)]);

    let nothing = setter
        .step(DAY - 1, &mut fad_map, &mut ocean, &species, None)
        .expect("failed to step");
    assert!(nothing.is_empty());

    let removals = setter
        .step(DAY, &mut fad_map, &mut ocean, &species, None)
        .expect("failed to step");
    assert_eq!(removals.len(), 1);
    let removal = &removals[0];
    assert_eq!(removal.fad.id(), ids[1]);
    assert_eq!(removal.reason, RemovalReason::Set);
    assert_eq!(removal.catch, Some(LocalBiology::Biomass(vec![40.0, 40.0])));
    assert!(!fad_map.contains(ids[1]));
    assert!(fad_map.contains(ids[0]));
    assert_eq!(ocean.biology(Cell::new(0, 0)), Some(&LocalBiology::empty_biomass(2)));
}

#[test]
fn counters_reset_on_schedule() {
    let species = two_species();
    let ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (fad_map, _) = fads_holding(&ocean, Cell::new(0, 0), &[]);
    let mut setter = ExogenousFadSetter::new(vec![observation(0.5, 0.5, 1.0)]);
    setter
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");
    assert_close(column(&setter, FAILED_MATCHES), 1.0, TOL);

    setter.react_to_step(DAY + 1, 365);
    assert_close(column(&setter, FAILED_MATCHES), 1.0, TOL);
    setter.react_to_step(365, 365);
    assert_close(column(&setter, FAILED_MATCHES), 0.0, TOL);
    assert_close(column(&setter, ERROR), 0.0, TOL);

    let mut daily = ExogenousFadSetter::new(vec![observation(0.5, 0.5, 1.0)])
        .with_reset_interval(ResetInterval::EveryStep);
    daily
        .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
        .expect("failed to match");
    daily.react_to_step(DAY + 1, 365);
    assert_close(column(&daily, MATCHES), 0.0, TOL);
    assert_close(column(&daily, FAILED_MATCHES), 0.0, TOL);
}

#[test]
fn observations_must_cover_every_species() {
    let species = two_species();
    let ocean = open_ocean(2, 2, &LocalBiology::empty_biomass(2));
    let (fad_map, _) = fads_holding(&ocean, Cell::new(0, 0), &[1.0]);
    let mut setter = ExogenousFadSetter::new(vec![FadSetObservation {
        day: DAY,
        lon: 0.5,
        lat: 0.5,
        biomass: vec![1.0],
    }]);
    assert!(
        setter
            .choose_fads_to_set(DAY, &fad_map, &ocean, &species)
            .is_err()
    );
}
