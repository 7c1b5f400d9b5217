mod common;

use common::{TOL, assert_all_close, assert_close, two_by_five_species};
use fadsim::biology::Species;
use fadsim::filters::{AbundanceFilter, Selectivity, quick_round};
use ndarray::{Array2, array};

fn selectivity_filters() -> Vec<AbundanceFilter> {
    let formulas = vec![
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: true,
        },
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: false,
        },
        Selectivity::DoubleNormal {
            peak: 8.0,
            top: -1.0,
            asc_width: 3.0,
            dsc_width: 4.0,
            initial_scaling: None,
            final_scaling: None,
            bin_min: 0.0,
            bin_max: 120.0,
            bin_width: 5.0,
        },
        Selectivity::SimplifiedDoubleNormal {
            full_selectivity_length: 60.0,
            slope_left: 15.0,
            slope_right: 30.0,
        },
        Selectivity::Logistic {
            inflection: 55.0,
            width: 10.0,
        },
        Selectivity::Retention {
            inflection: 45.0,
            slope: 5.0,
            asymptote: 0.8,
        },
    ];
    formulas
        .into_iter()
        .map(|f| AbundanceFilter::formula(f, false, false).expect("invalid formula"))
        .collect()
}

fn abundance() -> Array2<f64> {
    Array2::from_shape_fn((2, 5), |(sub, bin)| 100.0 * (bin + 1) as f64 + 7.0 * sub as f64)
}

#[test]
fn every_filter_keeps_the_shape() {
    let species = two_by_five_species(0);
    let mut filters = selectivity_filters();
    filters.push(AbundanceFilter::exponential_mortality(0.3).expect("invalid mortality"));
    filters.push(AbundanceFilter::proportion(0.25).expect("invalid proportion"));
    filters.push(
        AbundanceFilter::array(Array2::from_elem((2, 5), 0.5), true).expect("invalid array"),
    );
    filters.push(AbundanceFilter::maximum_of(selectivity_filters()).expect("invalid maximum"));

    for filter in &filters {
        let filtered = filter
            .filter(&species, &abundance())
            .expect("failed to filter");
        assert_eq!(filtered.dim(), (2, 5), "{filter:?}");
    }
}

#[test]
fn selectivity_never_exceeds_input() {
    let species = two_by_five_species(0);
    let input = abundance();
    for filter in selectivity_filters() {
        let filtered = filter.filter(&species, &input).expect("failed to filter");
        for (&out, &n) in filtered.iter().zip(&input) {
            assert!(out >= 0.0 && out <= n + TOL, "{filter:?} gave {out} from {n}");
        }
    }
}

#[test]
fn cutoff_direction_flips() {
    let species = Species::from_bins("s", 0, &[10.0, 50.0, 90.0], &[1.0, 1.0, 1.0])
        .expect("failed to build species");
    let input = array![[10.0, 10.0, 10.0]];

    let higher = AbundanceFilter::formula(
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: true,
        },
        false,
        false,
    )
    .expect("invalid cutoff");
    let lower = AbundanceFilter::formula(
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: false,
        },
        false,
        false,
    )
    .expect("invalid cutoff");

    assert_eq!(
        higher.filter(&species, &input).expect("failed to filter"),
        array![[0.0, 10.0, 10.0]]
    );
    assert_eq!(
        lower.filter(&species, &input).expect("failed to filter"),
        array![[10.0, 0.0, 0.0]]
    );
}

#[test]
fn logistic_and_simplified_double_normal_reference_points() {
    let species = Species::from_bins("s", 0, &[40.0, 50.0, 60.0, 90.0], &[1.0; 4])
        .expect("failed to build species");
    let ones = Array2::ones((1, 4));

    let logistic = AbundanceFilter::formula(
        Selectivity::Logistic {
            inflection: 50.0,
            width: 10.0,
        },
        false,
        false,
    )
    .expect("invalid logistic");
    let out = logistic.filter(&species, &ones).expect("failed to filter");
    assert_close(out[[0, 1]], 0.5, TOL);
    assert_close(out[[0, 2]], 0.95, TOL);
    assert_close(out[[0, 0]], 0.05, TOL);

    let simplified = AbundanceFilter::formula(
        Selectivity::SimplifiedDoubleNormal {
            full_selectivity_length: 60.0,
            slope_left: 20.0,
            slope_right: 30.0,
        },
        false,
        false,
    )
    .expect("invalid simplified double normal");
    let out = simplified.filter(&species, &ones).expect("failed to filter");
    assert_close(out[[0, 2]], 1.0, TOL);
    assert_close(out[[0, 0]], 0.5, TOL);
    assert_close(out[[0, 3]], 0.5, TOL);
}

#[test]
fn double_normal_zeroes_lengths_below_legacy_threshold() {
    let species = Species::from_bins("s", 0, &[50.0, 150.0], &[1.0, 1.0])
        .expect("failed to build species");
    let ones = Array2::ones((1, 2));
    let curve = |initial_scaling| {
        AbundanceFilter::formula(
            Selectivity::DoubleNormal {
                peak: 20.0,
                top: 0.0,
                asc_width: 5.0,
                dsc_width: 5.0,
                initial_scaling,
                final_scaling: None,
                bin_min: 0.0,
                bin_max: 200.0,
                bin_width: 10.0,
            },
            false,
            false,
        )
        .expect("invalid double normal")
    };

    let plain = curve(None).filter(&species, &ones).expect("failed to filter");
    assert!(plain[[0, 0]] > 0.0);

    // Threshold is -1000 - (-1100) = 100.
    let scaled = curve(Some(-1100.0))
        .filter(&species, &ones)
        .expect("failed to filter");
    assert_eq!(scaled[[0, 0]], 0.0);
    assert!(scaled[[0, 1]] > 0.0);
}

#[test]
fn double_normal_reverses_threshold_for_second_subdivision() {
    let lengths = array![[50.0, 150.0], [50.0, 150.0]];
    let species = Species::new("s", 0, lengths, Array2::ones((2, 2)))
        .expect("failed to build species");
    let ones = Array2::ones((2, 2));
    let curve = |initial_scaling| {
        AbundanceFilter::formula(
            Selectivity::DoubleNormal {
                peak: 20.0,
                top: 0.0,
                asc_width: 5.0,
                dsc_width: 5.0,
                initial_scaling: Some(initial_scaling),
                final_scaling: None,
                bin_min: 0.0,
                bin_max: 200.0,
                bin_width: 10.0,
            },
            false,
            false,
        )
        .expect("invalid double normal")
    };

    // Threshold 100: first row keeps lengths above it, second row below it.
    let scaled = curve(-1100.0).filter(&species, &ones).expect("failed to filter");
    assert_eq!(scaled[[0, 0]], 0.0);
    assert!(scaled[[0, 1]] > 0.0);
    assert!(scaled[[1, 0]] > 0.0);
    assert_eq!(scaled[[1, 1]], 0.0);

    // Threshold -1000 selects every first-row length and no second-row length.
    let usual = curve(0.0).filter(&species, &ones).expect("failed to filter");
    assert!(usual.row(0).iter().all(|&s| s > 0.0));
    assert!(usual.row(1).iter().all(|&s| s == 0.0));
}

#[test]
fn maximum_of_takes_elementwise_max_without_mutating() {
    let species = two_by_five_species(0);
    let a = Array2::from_shape_fn((2, 5), |(sub, bin)| {
        if (sub + bin) % 2 == 0 { 0.9 } else { 0.1 }
    });
    let b = Array2::from_shape_fn((2, 5), |(_, bin)| 0.2 * bin as f64);
    let filter_a = AbundanceFilter::array(a.clone(), false).expect("invalid array");
    let filter_b = AbundanceFilter::array(b.clone(), false).expect("invalid array");
    let maximum = AbundanceFilter::maximum_of(vec![filter_a.clone(), filter_b.clone()])
        .expect("invalid maximum");

    let input = abundance();
    let out_a = filter_a.filter(&species, &input).expect("failed to filter");
    let out_b = filter_b.filter(&species, &input).expect("failed to filter");
    let expected = Array2::from_shape_fn((2, 5), |idx| out_a[idx].max(out_b[idx]));

    let out = maximum.filter(&species, &input).expect("failed to filter");
    assert_all_close(&out, &expected, TOL);
    assert_eq!(input, abundance());
}

#[test]
fn filter_leaves_input_and_in_place_overwrites() {
    let species = two_by_five_species(0);
    let filter = AbundanceFilter::proportion(0.5).expect("invalid proportion");

    let input = abundance();
    let out = filter.filter(&species, &input).expect("failed to filter");
    assert_eq!(input, abundance());
    assert_all_close(&out, &abundance().mapv(|n| n * 0.5), TOL);

    let mut in_place = abundance();
    filter
        .filter_in_place(&species, &mut in_place)
        .expect("failed to filter");
    assert_eq!(in_place, out);
}

#[test]
fn exponential_mortality_removes_fraction() {
    let species = two_by_five_species(0);
    let filter = AbundanceFilter::exponential_mortality(0.2).expect("invalid mortality");
    let out = filter.filter(&species, &abundance()).expect("failed to filter");
    let fraction = 1.0 - (-0.2f64).exp();
    assert_all_close(&out, &abundance().mapv(|n| n * fraction), TOL);
}

#[test]
fn array_filter_rounds_half_up() {
    let species =
        Species::from_bins("s", 0, &[1.0, 2.0, 3.0], &[1.0; 3]).expect("failed to build species");
    let filter = AbundanceFilter::array(array![[0.5, 0.5, 0.25]], true).expect("invalid array");
    let out = filter
        .filter(&species, &array![[5.0, 3.0, 5.0]])
        .expect("failed to filter");
    assert_eq!(out, array![[3.0, 2.0, 1.0]]);

    assert_eq!(quick_round(2.5), 3.0);
    assert_eq!(quick_round(2.49), 2.0);
    assert_eq!(quick_round(-2.5), -2.0);
}

#[test]
fn mismatched_shapes_are_rejected() {
    let species = two_by_five_species(0);
    let filter = AbundanceFilter::array(Array2::ones((2, 4)), false).expect("invalid array");
    assert!(filter.filter(&species, &abundance()).is_err());

    let proportion = AbundanceFilter::proportion(0.5).expect("invalid proportion");
    assert!(proportion.filter(&species, &Array2::ones((3, 5))).is_err());
}

#[test]
fn invalid_parameters_are_rejected() {
    assert!(AbundanceFilter::proportion(1.5).is_err());
    assert!(AbundanceFilter::exponential_mortality(-1.0).is_err());
    assert!(AbundanceFilter::maximum_of(Vec::new()).is_err());
    assert!(
        AbundanceFilter::formula(
            Selectivity::Logistic {
                inflection: 1.0,
                width: 0.0
            },
            false,
            false
        )
        .is_err()
    );
}

#[test]
fn memoized_selectivity_is_per_species() {
    let first = two_by_five_species(0);
    let second = Species::from_bins("other", 1, &[10.0, 100.0], &[1.0, 1.0])
        .expect("failed to build species");
    let filter = AbundanceFilter::formula(
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: true,
        },
        true,
        false,
    )
    .expect("invalid cutoff");

    let once = filter.filter(&first, &abundance()).expect("failed to filter");
    let twice = filter.filter(&first, &abundance()).expect("failed to filter");
    assert_eq!(once, twice);

    let other = filter
        .filter(&second, &array![[4.0, 4.0]])
        .expect("failed to filter");
    assert_eq!(other, array![[0.0, 4.0]]);
}

#[test]
fn memoized_selectivity_tells_apart_species_sharing_an_index() {
    let short_first = Species::from_bins("albacore", 0, &[10.0, 100.0], &[1.0, 1.0])
        .expect("failed to build species");
    let long_first = Species::from_bins("bigeye", 0, &[100.0, 10.0], &[1.0, 1.0])
        .expect("failed to build species");
    let filter = AbundanceFilter::formula(
        Selectivity::Cutoff {
            cutoff: 50.0,
            select_higher: true,
        },
        true,
        false,
    )
    .expect("invalid cutoff");

    let held = array![[4.0, 4.0]];
    let a = filter.filter(&short_first, &held).expect("failed to filter");
    let b = filter.filter(&long_first, &held).expect("failed to filter");
    assert_eq!(a, array![[0.0, 4.0]]);
    assert_eq!(b, array![[4.0, 0.0]]);
}
