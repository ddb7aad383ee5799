//! End-to-end tests of the migration model: binning, matrix construction,
//! fallback and queries, exercised only through the public API.

#![allow(clippy::unwrap_used, clippy::float_cmp, clippy::indexing_slicing)]

use radmix_model::{
    BinEdges, MigrationModel, MigrationSource, ModelConfig, QueryError, ZoneSampler, bin_of,
    build, build_parallel, normalize,
};
use radmix_types::{ParticleTrack, Stratum, TimeBinIndex, ZoneIndex};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

fn stratum(zone: usize, bin: usize) -> Stratum {
    Stratum::new(ZoneIndex::new(zone), TimeBinIndex::new(bin))
}

fn three_zones() -> BinEdges {
    BinEdges::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap()
}

fn one_time_bin() -> BinEdges {
    BinEdges::new(vec![0.0, 10.0]).unwrap()
}

/// Ten tracks formed in zone 0 during time bin 0: eight stay, two move out
/// to zone 1.
fn ten_zone_zero_tracks() -> Vec<ParticleTrack> {
    let mut tracks = vec![ParticleTrack::new(2.0, 0.4, 13.8, 0.6); 8];
    tracks.extend(vec![ParticleTrack::new(2.0, 0.4, 13.8, 1.6); 2]);
    tracks
}

/// A deterministic pseudo-catalogue spread over a 10 x 5 grid, with a few
/// tracks deliberately outside it.
fn synthetic_catalogue(n: u32) -> Vec<ParticleTrack> {
    let mut rng = StdRng::seed_from_u64(2024);
    (0..n)
        .map(|_| {
            use rand::Rng;
            let formation_time = rng.random_range(0.0..10.5);
            let formation_radius = rng.random_range(0.0..10.0);
            let final_radius = (formation_radius + rng.random_range(-3.0..3.0_f64)).abs();
            ParticleTrack::new(formation_time, formation_radius, 13.8, final_radius)
        })
        .collect()
}

#[test]
fn bin_lookup_scenarios() {
    let edges = [0.0, 1.0, 2.0, 3.0];
    assert_eq!(bin_of(&edges, 1.5), Some(1));
    assert_eq!(bin_of(&edges, 1.0), Some(0));
    assert_eq!(bin_of(&edges, 3.5), None);
}

#[test]
fn observed_row_is_kept_as_raw_counts() {
    let raw = build(&ten_zone_zero_tracks(), &three_zones(), &one_time_bin()).unwrap();
    assert_eq!(raw.matrix.row(stratum(0, 0)), Some(&[8, 2, 0][..]));

    let normalized = normalize(raw.matrix);
    assert_eq!(normalized.row(stratum(0, 0)), Some(&[8, 2, 0][..]));
    assert_eq!(normalized.row_sum(stratum(0, 0)), Some(10));
}

#[test]
fn unobserved_row_becomes_identity() {
    let raw = build(&ten_zone_zero_tracks(), &three_zones(), &one_time_bin()).unwrap();
    assert_eq!(raw.matrix.row(stratum(1, 0)), Some(&[0, 0, 0][..]));

    let normalized = normalize(raw.matrix);
    assert_eq!(normalized.row(stratum(1, 0)), Some(&[0, 1, 0][..]));
}

#[test]
fn query_of_unobserved_stratum_returns_identity_weights() {
    let model =
        MigrationModel::build(&ten_zone_zero_tracks(), three_zones(), one_time_bin()).unwrap();
    let weight_fn = model.query(ZoneIndex::new(1), 4.2).unwrap();
    assert_eq!(weight_fn.weight(ZoneIndex::new(0)), 0.0);
    assert_eq!(weight_fn.weight(ZoneIndex::new(1)), 1.0);
    assert_eq!(weight_fn.weight(ZoneIndex::new(2)), 0.0);
}

#[test]
fn empty_catalogue_gives_identity_everywhere() {
    let time = BinEdges::new(vec![0.0, 5.0, 10.0]).unwrap();
    let raw = build(&[], &three_zones(), &time).unwrap();
    assert_eq!(raw.matrix.total(), 0);

    let normalized = normalize(raw.matrix);
    for s in normalized.strata() {
        let row = normalized.row(s).unwrap();
        for (final_zone, &weight) in row.iter().enumerate() {
            assert_eq!(weight, u32::from(final_zone == s.zone.get()), "{s}");
        }
        assert!(normalized.is_fallback(s));
    }
}

#[test]
fn raw_total_equals_classified_tracks() {
    let radius = BinEdges::linspace(0.0, 10.0, 11).unwrap();
    let time = BinEdges::linspace(0.0, 10.0, 6).unwrap();
    let tracks = synthetic_catalogue(2_000);
    let raw = build(&tracks, &radius, &time).unwrap();

    let expected = tracks
        .iter()
        .filter(|t| radius.contains(t.formation_radius))
        .filter(|t| time.contains(t.formation_time))
        .filter(|t| radius.contains(t.final_radius))
        .count();
    assert!(raw.report.rejected > 0);
    assert_eq!(raw.matrix.total(), raw.report.classified);
    assert_eq!(raw.report.classified, u64::try_from(expected).unwrap());
    assert_eq!(raw.report.seen(), 2_000);
}

#[test]
fn permuting_tracks_does_not_change_matrix() {
    let radius = BinEdges::linspace(0.0, 10.0, 11).unwrap();
    let time = BinEdges::linspace(0.0, 10.0, 6).unwrap();
    let tracks = synthetic_catalogue(1_000);
    let reference = build(&tracks, &radius, &time).unwrap().matrix;

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5 {
        let mut shuffled = tracks.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(build(&shuffled, &radius, &time).unwrap().matrix, reference);
    }
}

#[test]
fn parallel_and_sequential_builds_agree() {
    let radius = BinEdges::linspace(0.0, 10.0, 11).unwrap();
    let time = BinEdges::linspace(0.0, 10.0, 6).unwrap();
    let tracks = synthetic_catalogue(5_000);
    let sequential = build(&tracks, &radius, &time).unwrap();
    let parallel = build_parallel(&tracks, &radius, &time, 4).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn normalize_is_idempotent_and_rows_are_positive() {
    let radius = BinEdges::linspace(0.0, 10.0, 11).unwrap();
    let time = BinEdges::linspace(0.0, 10.0, 6).unwrap();
    let raw = build(&synthetic_catalogue(300), &radius, &time).unwrap();

    let once = normalize(raw.matrix);
    let twice = normalize(once.clone());
    assert_eq!(once, twice);
    for s in once.strata() {
        assert!(once.row_sum(s).unwrap() > 0, "{s}");
    }
}

#[test]
fn every_in_range_query_succeeds_and_out_of_range_fails() {
    let radius = BinEdges::linspace(0.0, 10.0, 11).unwrap();
    let time = BinEdges::linspace(0.0, 10.0, 6).unwrap();
    let model = MigrationModel::build(&synthetic_catalogue(1_000), radius, time).unwrap();

    for zone in 0..model.n_zones() {
        for step in 0..=100_u32 {
            let t = f64::from(step) / 10.0;
            let dist = model.distribution(ZoneIndex::new(zone), t).unwrap();
            assert!(dist.total() > 0);
            assert_eq!(dist.n_zones(), 10);
        }
    }

    assert!(matches!(
        model.query(ZoneIndex::new(10), 1.0),
        Err(QueryError::ZoneOutOfRange { n_zones: 10, .. })
    ));
    assert!(matches!(
        model.query(ZoneIndex::new(0), 10.01),
        Err(QueryError::TimeOutOfRange { .. })
    ));
    assert!(matches!(
        model.query(ZoneIndex::new(0), -0.01),
        Err(QueryError::TimeOutOfRange { .. })
    ));
}

#[test]
fn engine_style_stepping_keeps_tracers_in_observed_zones() {
    let model =
        MigrationModel::build(&ten_zone_zero_tracks(), three_zones(), one_time_bin()).unwrap();
    let mut sampler = ZoneSampler::seeded(5);
    for _ in 0..200 {
        let zone = sampler.assign(&model, ZoneIndex::new(0), 2.0).unwrap();
        assert!(zone == ZoneIndex::new(0) || zone == ZoneIndex::new(1));
        let stay = sampler.assign(&model, ZoneIndex::new(2), 9.0).unwrap();
        assert_eq!(stay, ZoneIndex::new(2));
    }
}

#[test]
fn model_round_trips_through_json() {
    let model =
        MigrationModel::build(&ten_zone_zero_tracks(), three_zones(), one_time_bin()).unwrap();
    let json = serde_json::to_string(&model).unwrap();
    let back: MigrationModel = serde_json::from_str(&json).unwrap();
    assert_eq!(back, model);
    assert!(back.matrix().is_fallback(stratum(1, 0)));
}

#[test]
fn default_grid_model_round_trips_bit_for_bit() {
    let tracks: Vec<ParticleTrack> = synthetic_catalogue(500)
        .into_iter()
        .map(|t| {
            ParticleTrack::new(
                t.formation_time * 1.3,
                t.formation_radius * 3.0,
                13.8,
                t.final_radius * 3.0,
            )
        })
        .collect();
    let model = MigrationModel::build_with(&tracks, &ModelConfig::default()).unwrap();
    let json = serde_json::to_string(&model).unwrap();
    let back: MigrationModel = serde_json::from_str(&json).unwrap();

    for (original, reloaded) in [
        (model.time_edges(), back.time_edges()),
        (model.radius_edges(), back.radius_edges()),
    ] {
        let original: Vec<u64> = original.as_slice().iter().map(|e| e.to_bits()).collect();
        let reloaded: Vec<u64> = reloaded.as_slice().iter().map(|e| e.to_bits()).collect();
        assert_eq!(original, reloaded);
    }
    assert_eq!(back, model);

    // A formation time exactly on an inexact edge still lands in the same bin.
    let edge = model.time_edges().as_slice()[2];
    assert_eq!(
        back.query(ZoneIndex::new(3), edge).unwrap().time_bin(),
        model.query(ZoneIndex::new(3), edge).unwrap().time_bin()
    );
}
